//! Handler for `maskbench run`.

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use crate::RunArgs;
use maskbench::{
    expand_inputs, limits, ClaimStore, CommandLauncher, DiagnosticLog, Owner, PoolConfig,
    PoolSummary, ReclaimPolicy, RunConfig, Supervisor, SupervisorSummary, WorkerLauncher,
    WorkerPool,
};
use std::env;
use std::path::PathBuf;

/// Name of the diagnostic log inside the output directory
pub const LOG_FILE: &str = "log.txt";

/// Load `--config` (or defaults) and apply the command-line overrides
pub fn resolve_config(args: &RunArgs) -> CliResult<RunConfig> {
    let base = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    apply_overrides(base, args)
}

/// Flags win over file values
pub fn apply_overrides(mut config: RunConfig, args: &RunArgs) -> CliResult<RunConfig> {
    if !args.inputs.is_empty() {
        config.inputs.clone_from(&args.inputs);
    }
    if let Some(engine) = args.engine {
        config.engine = engine;
    }
    if let Some(tokenizer) = &args.tokenizer {
        config.tokenizer.clone_from(tokenizer);
    }
    if let Some(output) = &args.output {
        config.output_dir.clone_from(output);
    }
    if let Some(jobs) = args.jobs {
        config.workers = jobs;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(limit) = args.memory_limit_gb {
        config.memory_limit_gb = limit;
    }
    match (&args.reclaim, args.stale_after_secs) {
        (Some(name), stale) => {
            config.reclaim = ReclaimPolicy::parse(name, stale).map_err(CliError::invalid_argument)?;
        }
        (None, Some(_)) => {
            return Err(CliError::invalid_argument(
                "--stale-after-secs needs --reclaim older-than",
            ));
        }
        (None, None) => {}
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.require_complete {
        config.require_complete = true;
    }
    if args.isolate {
        config.isolate = true;
    }
    config.validate()?;
    Ok(config)
}

/// `maskbench run`: supervised when isolation is on, in-process otherwise
pub fn run_command(cli: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let config = resolve_config(args)?;
    if config.isolate && args.worker_run_id.is_none() {
        execute_supervised(cli, args).map(|_| ())
    } else {
        execute_run(cli, args).map(|_| ())
    }
}

fn corpus_files(config: &RunConfig) -> CliResult<Vec<PathBuf>> {
    if config.inputs.is_empty() {
        return Err(CliError::invalid_argument("no inputs given"));
    }
    let files = expand_inputs(&config.inputs)?;
    if files.is_empty() {
        return Err(CliError::NoInputs {
            patterns: config.inputs.join(" "),
        });
    }
    Ok(files)
}

fn run_owner(args: &RunArgs) -> Owner {
    match &args.worker_run_id {
        Some(run_id) => Owner::new(run_id.as_str(), std::process::id(), limits::hostname()),
        None => Owner::current(),
    }
}

/// Execute a corpus run in this process
pub fn execute_run(cli: &CliConfig, args: &RunArgs) -> CliResult<PoolSummary> {
    let config = resolve_config(args)?;
    let files = corpus_files(&config)?;

    let ctx = config.eval_context()?;
    let store = ClaimStore::open(&config.output_dir, run_owner(args))?.with_reclaim(config.reclaim);
    let log = DiagnosticLog::open(&config.output_dir.join(LOG_FILE))?;
    limits::apply_memory_limit(config.memory_limit_gb)?;

    let workers = config.worker_count();
    tracing::info!(
        files = files.len(),
        engine = %config.engine,
        tokenizer = %config.tokenizer,
        workers,
        output = %config.output_dir.display(),
        run_id = store.owner().run_id(),
        "run configured"
    );

    let reporter = ProgressReporter::new(cli.color.should_color(), cli.verbosity.is_quiet())
        .with_bar(!args.no_progress);
    reporter.info(&format!(
        "{} files -> {} ({}, {} workers)",
        files.len(),
        config.output_dir.display(),
        config.engine,
        workers
    ));

    let pool_config = PoolConfig {
        workers,
        chunk_size: config.chunk_size,
        max_attempts: config.max_attempts,
        seed: config.seed,
    };
    let summary = WorkerPool::new(&ctx, &store, pool_config)
        .with_log(log)
        .run(&files, &reporter)?;
    reporter.summary(&summary);
    reporter.success(&format!("records in {}", config.output_dir.display()));
    Ok(summary)
}

/// Re-run this command as worker processes under a [`Supervisor`]
pub fn execute_supervised(cli: &CliConfig, args: &RunArgs) -> CliResult<SupervisorSummary> {
    let program = env::current_exe()?;
    let worker_args = env::args_os().skip(1).collect();
    let mut launcher = CommandLauncher::new(program, worker_args, "--worker-run-id");
    supervise(cli, args, &mut launcher)
}

fn supervise(
    cli: &CliConfig,
    args: &RunArgs,
    launcher: &mut dyn WorkerLauncher,
) -> CliResult<SupervisorSummary> {
    let config = resolve_config(args)?;
    let files = corpus_files(&config)?;
    // fail on a bad engine or tokenizer before any worker starts
    config.eval_context()?;
    let store = ClaimStore::open(&config.output_dir, Owner::current())?.with_reclaim(config.reclaim);
    let log = DiagnosticLog::open(&config.output_dir.join(LOG_FILE))?;
    tracing::info!(
        files = files.len(),
        run_id = store.owner().run_id(),
        max_attempts = config.max_attempts,
        "supervising worker processes"
    );

    let summary = Supervisor::new(&store, config.max_attempts)
        .with_log(&log)
        .run(launcher)?;
    let reporter = ProgressReporter::new(cli.color.should_color(), cli.verbosity.is_quiet());
    if !summary.abandoned.is_empty() {
        reporter.warning(&format!(
            "{} files kept killing workers: {}",
            summary.abandoned.len(),
            summary.abandoned.join(", ")
        ));
    }
    match &summary.last_failure {
        Some(detail) => Err(CliError::Worker {
            message: format!("{detail} after {} launches", summary.launches),
        }),
        None => Ok(summary),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use maskbench::{EngineKind, RecordState};
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(&path, "engine: guide\nchunk_size: 5\nworkers: 2\ninputs: [a]\n").unwrap();
        let args = RunArgs {
            config: Some(path),
            chunk_size: Some(9),
            inputs: vec!["b".to_string()],
            ..RunArgs::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.engine, EngineKind::Guide);
        assert_eq!(config.chunk_size, 9);
        assert_eq!(config.workers, 2);
        assert_eq!(config.inputs, vec!["b"]);
    }

    #[test]
    fn test_reclaim_flags() {
        let args = RunArgs {
            reclaim: Some("older-than".to_string()),
            stale_after_secs: Some(30),
            ..RunArgs::default()
        };
        let config = apply_overrides(RunConfig::default(), &args).unwrap();
        assert_eq!(config.reclaim, ReclaimPolicy::OlderThan(30));

        let orphan = RunArgs {
            stale_after_secs: Some(30),
            ..RunArgs::default()
        };
        assert!(apply_overrides(RunConfig::default(), &orphan).is_err());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = RunArgs {
            max_attempts: Some(0),
            ..RunArgs::default()
        };
        assert!(apply_overrides(RunConfig::default(), &args).is_err());
    }

    #[test]
    fn test_execute_run_writes_records_and_log() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(
            input.path().join("int.json"),
            r#"{"schema": {"type": "integer"}, "tests": [{"data": 3, "valid": true}]}"#,
        )
        .unwrap();
        let out_dir: PathBuf = output.path().join("interpreter");
        let args = RunArgs {
            output: Some(out_dir.clone()),
            jobs: Some(1),
            memory_limit_gb: Some(0),
            no_progress: true,
            inputs: vec![input.path().to_string_lossy().into_owned()],
            ..RunArgs::default()
        };
        let cli = CliConfig::new().with_verbosity(crate::config::Verbosity::Quiet);
        let summary = execute_run(&cli, &args).unwrap();
        assert_eq!(summary.completed, 1);
        assert!(matches!(RecordState::read(&out_dir.join("int.json")), RecordState::Final(_)));
        assert!(out_dir.join(LOG_FILE).exists());
    }

    #[test]
    fn test_isolate_flag_sets_config() {
        let args = RunArgs {
            isolate: true,
            ..RunArgs::default()
        };
        assert!(apply_overrides(RunConfig::default(), &args).unwrap().isolate);
    }

    #[test]
    fn test_worker_claims_under_given_run_id() {
        let args = RunArgs {
            worker_run_id: Some("run-7".to_string()),
            ..RunArgs::default()
        };
        let owner = run_owner(&args);
        assert_eq!(owner.run_id(), "run-7");
        assert_ne!(run_owner(&RunArgs::default()).run_id(), "run-7");
    }

    #[cfg(unix)]
    #[test]
    fn test_supervised_worker_death_is_an_error() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(
            input.path().join("int.json"),
            r#"{"schema": {"type": "integer"}, "tests": []}"#,
        )
        .unwrap();
        let args = RunArgs {
            output: Some(output.path().to_path_buf()),
            inputs: vec![input.path().to_string_lossy().into_owned()],
            ..RunArgs::default()
        };
        let mut launcher = CommandLauncher::new("sh", vec!["-c".into(), "exit 7".into()], "--run");
        let cli = CliConfig::new().with_verbosity(crate::config::Verbosity::Quiet);
        let err = supervise(&cli, &args, &mut launcher).unwrap_err();
        assert!(matches!(err, CliError::Worker { .. }));
        assert!(err.to_string().contains("exit code 7 after 1 launches"));
        let log = fs::read_to_string(output.path().join(LOG_FILE)).unwrap();
        assert!(log.contains("worker process died (exit code 7)"));
    }

    #[test]
    fn test_no_matching_inputs() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let args = RunArgs {
            output: Some(output.path().to_path_buf()),
            memory_limit_gb: Some(0),
            inputs: vec![input.path().to_string_lossy().into_owned()],
            ..RunArgs::default()
        };
        let err = execute_run(&CliConfig::new(), &args).unwrap_err();
        assert!(matches!(err, CliError::NoInputs { .. }));
    }
}
