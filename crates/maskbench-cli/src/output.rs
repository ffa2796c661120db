//! Output formatting, logging setup and progress reporting

use crate::config::{CliConfig, LogFormat};
use crate::error::{CliError, CliResult};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use maskbench::{ChunkProgress, PoolSummary, ProgressSink};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins over `-v`/`-q`.
pub fn init_tracing(config: &CliConfig) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.verbosity.log_directive()))
        .map_err(|e| CliError::logging(e.to_string()))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = match config.log_format {
        LogFormat::Text => builder.with_ansi(config.color.should_color()).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| CliError::logging(e.to_string()))
}

/// Progress reporter for corpus runs
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: OnceLock<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Draw a progress bar
    pub show_bar: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: OnceLock::new(),
            use_color,
            quiet,
            show_bar: !quiet,
        }
    }

    /// Enable or disable the progress bar
    #[must_use]
    pub fn with_bar(mut self, show_bar: bool) -> Self {
        self.show_bar = show_bar && !self.quiet;
        self
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "OK".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print an informational message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let _ = self.term.write_line(message);
    }

    /// Print the totals of a run
    pub fn summary(&self, summary: &PoolSummary) {
        if self.quiet {
            return;
        }
        self.info(&render_summary(summary));
        if summary.crashed > 0 || summary.ownership_lost > 0 {
            self.warning(&format!(
                "{} crashed, {} lost to takeover",
                summary.crashed, summary.ownership_lost
            ));
        }
    }
}

/// Totals of a run as text lines
#[must_use]
pub fn render_summary(summary: &PoolSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} files in {:.1}s\n",
        summary.total_files,
        summary.elapsed_ms as f64 / 1000.0
    ));
    out.push_str(&format!(
        "  completed:         {} ({} compile errors, {} validation errors)\n",
        summary.completed, summary.compile_errors, summary.validation_errors
    ));
    out.push_str(&format!("  already done:      {}\n", summary.already_done));
    out.push_str(&format!("  skipped:           {}\n", summary.skipped));
    out.push_str(&format!("  invalid inputs:    {}\n", summary.invalid_inputs));
    out.push_str(&format!("  crashed:           {}", summary.crashed));
    out
}

impl ProgressSink for ProgressReporter {
    fn started(&self, queued: usize) {
        if !self.show_bar {
            return;
        }
        let pb = ProgressBar::new(queued as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        let _ = self.progress_bar.set(pb);
    }

    fn chunk_done(&self, progress: &ChunkProgress) {
        if let Some(pb) = self.progress_bar.get() {
            pb.inc((progress.done + progress.not_done) as u64);
            pb.set_message(progress.to_string());
        }
    }

    fn finished(&self, _summary: &PoolSummary) {
        if let Some(pb) = self.progress_bar.get() {
            pb.finish_with_message("Done");
        }
    }
}
