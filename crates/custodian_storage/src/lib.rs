//! Status/result storage for Custodian.
//!
//! [`StatusStore`] is the durable record the orchestration engine reads and
//! writes; [`AdminStore`] is how the administration layer seeds it.
//! [`LogStore`] allocates the per-job log artifact.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod json_file;
mod log_store;
mod memory;
mod state;
mod store;

pub use json_file::JsonFileStore;
pub use log_store::{FileSystemLogStore, LogStore, MemoryLogStore};
pub use memory::MemoryStore;
pub use store::{AdminStore, StatusStore};
