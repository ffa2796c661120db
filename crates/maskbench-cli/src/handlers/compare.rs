//! Handler for `maskbench compare`.

use crate::error::{CliError, CliResult};
use crate::CompareArgs;
use maskbench::stats::report;
use maskbench::{aggregate_dir, AggregateStats};

/// Aggregate every directory, in argument order
pub fn collect(args: &CompareArgs) -> CliResult<Vec<AggregateStats>> {
    args.dirs
        .iter()
        .map(|dir| {
            if !dir.is_dir() {
                return Err(CliError::invalid_argument(format!(
                    "{} is not a directory",
                    dir.display()
                )));
            }
            Ok(aggregate_dir(dir)?.stats)
        })
        .collect()
}

/// Print the Markdown comparison table
pub fn execute_compare(args: &CompareArgs) -> CliResult<()> {
    let engines = collect(args)?;
    print!("{}", report::comparison_table(&engines));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_in_argument_order() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("unconstrained");
        let b = root.path().join("interpreter");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();
        let engines = collect(&CompareArgs {
            dirs: vec![a, b],
        })
        .unwrap();
        let names: Vec<&str> = engines.iter().map(|s| s.engine.as_str()).collect();
        assert_eq!(names, vec!["unconstrained", "interpreter"]);
    }

    #[test]
    fn test_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let err = collect(&CompareArgs {
            dirs: vec![root.path().join("nope")],
        })
        .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
