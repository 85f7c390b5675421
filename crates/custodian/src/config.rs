//! Top-level configuration of the `custodian` binary.

use config::{Config, Environment, File};
use custodian_core::LogFormat;
use custodian_error::{ConfigError, ConfigErrorKind, CustodianResult};
use custodian_workflow::WorkflowConfig;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

const ENV_PREFIX: &str = "CUSTODIAN";
const FILE_STEM: &str = "custodian";

/// Settings of the local-process connector adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct ConnectorConfig {
    /// Parent of the per-session working directories; the system temporary
    /// directory when unset.
    #[serde(default)]
    work_dir: Option<PathBuf>,
}

/// Configuration of a custodian process.
///
/// Every key is optional. Values come from, in increasing precedence:
/// built-in defaults, `~/.config/custodian/custodian.toml`,
/// `./custodian.toml` (or the single file passed with `--config`), and
/// `CUSTODIAN_*` environment variables, with `__` separating nested keys
/// (`CUSTODIAN_WORKFLOW__POLL_INTERVAL_SECS=60`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct CustodianConfig {
    /// JSON snapshot holding jobs, requests, statuses and results
    #[serde(default = "default_store_path")]
    store_path: PathBuf,

    /// Base directory of job log artifacts
    #[serde(default = "default_log_dir")]
    log_dir: PathBuf,

    /// Log output format
    #[serde(default)]
    log_format: LogFormat,

    /// Connector adapter settings
    #[serde(default)]
    connector: ConnectorConfig,

    /// Orchestration timing and retry
    #[serde(default)]
    workflow: WorkflowConfig,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(FILE_STEM)
}

fn default_store_path() -> PathBuf {
    data_dir().join("store.json")
}

fn default_log_dir() -> PathBuf {
    data_dir().join("logs")
}

impl Default for CustodianConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            log_dir: default_log_dir(),
            log_format: LogFormat::default(),
            connector: ConnectorConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl CustodianConfig {
    /// Environment source for `CUSTODIAN_*` overrides.
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Load configuration, reading `path` instead of the default file
    /// locations when given.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, a file cannot be
    /// parsed, or the result fails validation.
    pub fn load(path: Option<&Path>) -> CustodianResult<Self> {
        Self::load_with(path, Self::environment())
    }

    /// Load configuration with a caller-supplied environment source.
    ///
    /// # Errors
    ///
    /// See [`CustodianConfig::load`].
    #[instrument(skip(env), fields(path = ?path))]
    pub fn load_with(path: Option<&Path>, env: Environment) -> CustodianResult<Self> {
        let mut builder = Config::builder();
        match path {
            Some(path) => {
                debug!("Loading configuration from explicit file");
                builder = builder.add_source(File::from(path));
            }
            None => {
                debug!("Loading configuration from default locations");
                if let Some(config_dir) = dirs::config_dir() {
                    let user = config_dir.join(FILE_STEM).join("custodian.toml");
                    builder = builder.add_source(File::from(user).required(false));
                }
                builder = builder.add_source(File::with_name(FILE_STEM).required(false));
            }
        }

        let config: CustodianConfig = builder
            .add_source(env)
            .build()
            .map_err(|e| {
                ConfigError::new(ConfigErrorKind::Load {
                    origin: path.map_or_else(
                        || "default configuration sources".to_string(),
                        |p| p.display().to_string(),
                    ),
                    reason: e.to_string(),
                })
            })?
            .try_deserialize()
            .map_err(|e| ConfigError::new(ConfigErrorKind::Parse(e.to_string())))?;

        config.workflow.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if a value has no TOML representation.
    pub fn to_toml(&self) -> CustodianResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::new(ConfigErrorKind::Render(e.to_string())).into())
    }
}
