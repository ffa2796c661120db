//! maskbench CLI: benchmark grammar-constrained decoding engines
//!
//! ## Usage
//!
//! ```bash
//! maskbench run -e interpreter -o tmp/interpreter corpus/   # run a corpus
//! maskbench eval -e guide corpus/case.json                  # one file
//! maskbench stats tmp/interpreter                           # summary + CSVs
//! maskbench compare tmp/interpreter tmp/guide               # markdown table
//! ```

use clap::Parser;
use maskbench_cli::{
    handlers, init_tracing, Cli, CliConfig, CliResult, ColorChoice, Commands, LogFormat, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    init_tracing(&config)?;

    match cli.command {
        Commands::Run(args) => handlers::run_command(&config, &args),
        Commands::Eval(args) => handlers::execute_eval(&args),
        Commands::Stats(args) => handlers::execute_stats(&args),
        Commands::Compare(args) => handlers::execute_compare(&args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    let color: ColorChoice = cli.color.into();
    let log_format: LogFormat = cli.log_format.into();
    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_log_format(log_format)
}
