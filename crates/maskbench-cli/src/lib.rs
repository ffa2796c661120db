//! maskbench CLI library
//!
//! Command-line interface for the maskbench harness: argument parsing,
//! logging setup, progress output and the subcommand handlers.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    Cli, ColorArg, Commands, CompareArgs, EvalArgs, LogFormatArg, RunArgs, StatsArgs,
};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{init_tracing, render_summary, ProgressReporter};
