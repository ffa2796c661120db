//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use maskbench::EngineKind;
use std::path::PathBuf;

/// maskbench: correctness and latency harness for grammar-constrained decoding engines
#[derive(Parser, Debug)]
#[command(name = "maskbench")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a corpus through an engine, one record per schema file
    Run(RunArgs),

    /// Evaluate a single corpus file without claiming it
    Eval(EvalArgs),

    /// Aggregate an output directory into summary JSON and CSV files
    Stats(StatsArgs),

    /// Compare output directories side by side
    Compare(CompareArgs),
}

/// Arguments for the run command
///
/// Flags override values from `--config`.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// YAML run configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Engine under test (interpreter, guide, unconstrained)
    #[arg(short, long)]
    pub engine: Option<EngineKind>,

    /// `bytes` or a vocabulary JSON file
    #[arg(short, long)]
    pub tokenizer: Option<String>,

    /// Output directory for records
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Worker threads (0 = available parallelism)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Upper bound on files per queue pop
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Address space ceiling in GiB (0 disables)
    #[arg(long)]
    pub memory_limit_gb: Option<u64>,

    /// Pending markers of other owners: never, dead-owner, older-than
    #[arg(long)]
    pub reclaim: Option<String>,

    /// Marker age for `--reclaim older-than`
    #[arg(long)]
    pub stale_after_secs: Option<u64>,

    /// Tries per file in this run
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Queue shuffle seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Accept an instance only if the matcher ends complete
    #[arg(long)]
    pub require_complete: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Run the pool in worker processes and retry files whose worker died
    #[arg(long)]
    pub isolate: bool,

    /// Claim under this run id (set by the supervisor for its workers)
    #[arg(long, hide = true)]
    pub worker_run_id: Option<String>,

    /// Corpus files, directories or glob patterns
    pub inputs: Vec<String>,
}

/// Arguments for the eval command
#[derive(Parser, Debug)]
pub struct EvalArgs {
    /// Engine under test
    #[arg(short, long, default_value = "interpreter")]
    pub engine: EngineKind,

    /// `bytes` or a vocabulary JSON file
    #[arg(short, long, default_value = "bytes")]
    pub tokenizer: String,

    /// Accept an instance only if the matcher ends complete
    #[arg(long)]
    pub require_complete: bool,

    /// Corpus file
    pub file: PathBuf,
}

/// Arguments for the stats command
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Output directory of a run
    pub dir: PathBuf,

    /// Where to write the CSV files (default: `<DIR>/stats`)
    #[arg(long)]
    pub csv_dir: Option<PathBuf>,
}

/// Arguments for the compare command
#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// Output directories; the last path component names the engine
    #[arg(required = true)]
    pub dirs: Vec<PathBuf>,
}

/// Color choice argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for crate::config::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}
