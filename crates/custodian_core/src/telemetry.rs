//! Tracing subscriber initialisation.

use custodian_error::{ConfigError, ConfigErrorKind, CustodianResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Target used for job lifecycle telemetry events.
pub const TELEMETRY_TARGET: &str = "custodian::telemetry";

const DEFAULT_FILTER: &str = "info,custodian=debug";
const VERBOSE_FILTER: &str = "debug";

/// Output format of the log layer.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    #[display("pretty")]
    Pretty,
    /// One JSON object per event
    #[display("json")]
    Json,
}

/// Install the global tracing subscriber.
///
/// The filter defaults to `info,custodian=debug` (`debug` everywhere when
/// `verbose`) and is overridden by `RUST_LOG`.
///
/// # Errors
///
/// Returns a configuration error if a global subscriber is already set.
pub fn init_telemetry(format: LogFormat, verbose: bool) -> CustodianResult<()> {
    let default_filter = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
    };

    result.map_err(|e| ConfigError::new(ConfigErrorKind::Telemetry(e.to_string())))?;
    Ok(())
}
