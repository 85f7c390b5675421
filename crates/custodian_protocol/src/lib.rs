//! Connector protocol client interface.
//!
//! A connector is an isolated process that knows how to reach one kind of
//! data store. The orchestration engine talks to it through
//! [`ConnectorSession`]: fetch the schema catalog, start query or delete
//! operations, replay handles to re-check status, and extract results.
//!
//! Two implementations ship with the crate: [`CommandConnectorFactory`]
//! runs a local executable, and [`ScriptedConnector`] answers from an
//! in-memory script.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod identifier;
mod mock;
mod process;
mod stream;
mod traits;
mod wire;

pub use identifier::{
    DataSourceMatcher, build_identifier, find_schema, index_schemas, key_fragment,
};
pub use mock::{ConnectorCall, EntityScript, Script, ScriptedConnector, ScriptedFactory};
pub use process::{CommandConnectorFactory, CommandSession};
pub use stream::ProtocolStream;
pub use traits::{ConnectorFactory, ConnectorSession};
pub use wire::{
    ConnectorMessage, DataType, LogMessage, MessageType, Phase, Query, QueryIdentifier, Record,
    RecordType, RequestHandle, RequestResult, RequestStatusMessage, RequestType,
    RequestsMessage, Schema, SchemasMessage,
};
