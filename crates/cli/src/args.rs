// crates/cli/src/args.rs
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jobtrack_observability::LogFormat;

/// Submit jobs to the executor and follow them to completion.
#[derive(Debug, Parser)]
#[command(name = "jobtrack", version)]
pub struct Cli {
    /// Executor base URL.
    #[arg(long, global = true, env = "JOBTRACK_BASE_URL")]
    pub base_url: Option<String>,

    /// Log format on stderr: compact or json.
    #[arg(long, global = true, env = "JOBTRACK_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Also write daily-rotated JSON logs to this directory.
    #[arg(long, global = true, env = "JOBTRACK_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a job and stream its progress. Ctrl-C cancels it.
    Run {
        /// JSON payload file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        payload: String,

        /// Print the final outcome as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Ask the executor to cancel a job.
    Cancel {
        job_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_run() {
        let cli =
            Cli::try_parse_from(["jobtrack", "run", "--payload", "job.json", "--json"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Compact);
        match cli.command {
            Command::Run { payload, json } => {
                assert_eq!(payload, "job.json");
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "jobtrack",
            "cancel",
            "abc123",
            "--base-url",
            "http://executor:8000",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("http://executor:8000"));
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Command::Cancel { job_id } if job_id == "abc123"));
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["jobtrack", "--log-format", "xml", "run"]).is_err());
    }
}
