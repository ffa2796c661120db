//! Handler for `maskbench stats`.

use crate::error::{CliError, CliResult};
use crate::StatsArgs;
use maskbench::stats::report;
use maskbench::{aggregate_dir, Aggregate};
use std::path::{Path, PathBuf};

/// Default CSV directory for an output directory
#[must_use]
pub fn default_csv_dir(dir: &Path) -> PathBuf {
    dir.join("stats")
}

/// Aggregate `args.dir` and write its CSV files
pub fn collect_stats(args: &StatsArgs) -> CliResult<(Aggregate, Vec<PathBuf>)> {
    if !args.dir.is_dir() {
        return Err(CliError::invalid_argument(format!(
            "{} is not a directory",
            args.dir.display()
        )));
    }
    let aggregate = aggregate_dir(&args.dir)?;
    let csv_dir = args
        .csv_dir
        .clone()
        .unwrap_or_else(|| default_csv_dir(&args.dir));
    let written = aggregate.write_csvs(&csv_dir)?;
    tracing::info!(
        engine = %aggregate.stats.engine,
        files = aggregate.stats.num_files,
        csv_dir = %csv_dir.display(),
        "stats written"
    );
    Ok((aggregate, written))
}

/// Print the summary JSON; CSV files go to `--csv-dir`
pub fn execute_stats(args: &StatsArgs) -> CliResult<()> {
    let (aggregate, _) = collect_stats(args)?;
    println!("{}", report::summary_json(&aggregate.stats)?);
    Ok(())
}
