//! Command-line surface for the batch orchestrator binary (spec §6 "CLI
//! surface").
//!
//! No teacher analog — the teacher repo carries no binary. Grounded in
//! `elevatelaw-prompt-scaler`'s `clap::Parser` usage for the derive shape
//! and doc-comment-as-help-text convention.

use std::path::PathBuf;

use clap::Parser;

/// Run a graph over a batch of input records.
#[derive(Debug, Parser)]
#[command(version, author)]
pub struct Cli {
    /// Name of the graph (task) to run.
    #[arg(long)]
    pub task: String,

    /// Number of records to process.
    #[arg(long = "num_records", default_value_t = 5)]
    pub num_records: usize,

    /// Index of the first record to process.
    #[arg(long = "start_index", default_value_t = 0)]
    pub start_index: usize,

    /// Number of records processed concurrently.
    #[arg(long = "batch_size", default_value_t = 25)]
    pub batch_size: usize,

    /// Flush the output sink and write a checkpoint every N completed records.
    #[arg(long = "checkpoint_interval", default_value_t = 100)]
    pub checkpoint_interval: usize,

    /// Resume from the last checkpoint for this run, skipping completed records.
    #[arg(long, default_value_t = false)]
    pub resume: bool,

    /// Directory for output files and the checkpoint file.
    #[arg(long = "output_dir")]
    pub output_dir: PathBuf,

    /// Name of this run, used to namespace output and checkpoint files.
    #[arg(long = "run_name")]
    pub run_name: String,

    /// Emit debug-level logs.
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Truncate any existing log file before starting.
    #[arg(long = "clear_logs", default_value_t = false)]
    pub clear_logs: bool,
}

/// Process exit codes (spec §7 "Failure semantics").
pub mod exit_code {
    /// The batch completed; no records exceeded the failure-rate threshold.
    pub const SUCCESS: i32 = 0;
    /// Startup aborted: model ping failure or invalid configuration.
    pub const ABORT: i32 = 1;
    /// The batch completed, but the record failure rate exceeded the
    /// configured threshold.
    pub const PARTIAL_FAILURE: i32 = 2;
}

/// Fraction of failed records above which a completed batch is reported as
/// a partial failure (exit code 2) rather than a success.
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_required_and_defaults() {
        let cli = Cli::parse_from([
            "sygra",
            "--task",
            "synthetic_qa",
            "--output_dir",
            "/tmp/out",
            "--run_name",
            "run-1",
        ]);
        assert_eq!(cli.task, "synthetic_qa");
        assert_eq!(cli.num_records, 5);
        assert_eq!(cli.start_index, 0);
        assert_eq!(cli.batch_size, 25);
        assert_eq!(cli.checkpoint_interval, 100);
        assert!(!cli.resume);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_parses_all_overrides() {
        let cli = Cli::parse_from([
            "sygra",
            "--task",
            "synthetic_qa",
            "--num_records",
            "100",
            "--start_index",
            "10",
            "--batch_size",
            "8",
            "--checkpoint_interval",
            "20",
            "--resume",
            "--output_dir",
            "/tmp/out",
            "--run_name",
            "run-2",
            "--debug",
            "--clear_logs",
        ]);
        assert_eq!(cli.num_records, 100);
        assert_eq!(cli.start_index, 10);
        assert_eq!(cli.batch_size, 8);
        assert_eq!(cli.checkpoint_interval, 20);
        assert!(cli.resume);
        assert!(cli.debug);
        assert!(cli.clear_logs);
    }
}
