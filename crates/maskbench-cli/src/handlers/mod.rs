//! Command handlers - extracted from main.rs for testability
//!
//! Each handler module contains the execution logic for one subcommand,
//! its pure helpers, and tests.

pub mod compare;
pub mod eval;
pub mod run;
pub mod stats;

pub use compare::execute_compare;
pub use eval::{evaluate_file, execute_eval};
pub use run::{apply_overrides, execute_run, execute_supervised, resolve_config, run_command};
pub use stats::{collect_stats, execute_stats};
