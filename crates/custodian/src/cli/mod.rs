//! Command-line interface module.

mod commands;
mod run;

pub use commands::{Cli, Commands};
pub use run::{check_config, run_discover, run_execute, run_worker};
