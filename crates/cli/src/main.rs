// crates/cli/src/main.rs
//! jobtrack command-line client.
//!
//! `jobtrack run` submits a payload, prints log lines as they arrive under a
//! status spinner, and exits 0 only if the job succeeded. Ctrl-C cancels the
//! job, and the process waits (bounded) for cancel requests still in flight.

mod args;

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use jobtrack_core::jobs::projection::{status_line, unseen_logs};
use jobtrack_core::{
    ClientConfig, HttpExecutor, JobController, JobExecutor, JobId, Outcome, Status,
};
use jobtrack_observability::{init_tracing, LogConfig};

use crate::args::{Cli, Command};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        format: cli.log_format,
        file_dir: cli.log_dir.clone(),
        ..LogConfig::default()
    };
    // Held for the whole run so buffered file logs are flushed on exit.
    let _guard = match init_tracing(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let mut config = ClientConfig::from_env().context("invalid JOBTRACK_* environment")?;
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url)?;
    }

    match cli.command {
        Command::Run { payload, json } => {
            let payload = read_payload(&payload)?;
            let outcome = follow_job(&config, payload).await?;
            print_outcome(&outcome, json)?;
            Ok(if outcome.ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Cancel { job_id } => {
            let job_id = JobId::from(job_id);
            HttpExecutor::new(config)?.cancel(&job_id).await?;
            println!("Cancel requested for {job_id}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run one job to its outcome, echoing progress.
async fn follow_job(config: &ClientConfig, payload: serde_json::Value) -> Result<Outcome> {
    let controller = JobController::connect(config)?;
    let mut snapshots = controller.subscribe();
    controller.run(payload)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("  {spinner} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("submitting");

    let mut shown = 0;
    let mut cancel_sent = false;
    let outcome = loop {
        {
            let snapshot = snapshots.borrow_and_update();
            if let Some(job) = snapshot.job.as_ref().filter(|_| snapshot.generation > 0) {
                for line in unseen_logs(job, shown) {
                    spinner.suspend(|| println!("{line}"));
                }
                shown = job.log_lines.len();
                spinner.set_message(status_line(job));
            }
            if let Some(outcome) = &snapshot.outcome {
                break outcome.clone();
            }
        }

        tokio::select! {
            changed = snapshots.changed() => changed.context("job controller stopped")?,
            signal = tokio::signal::ctrl_c(), if !cancel_sent => {
                signal.context("cannot listen for Ctrl-C")?;
                cancel_sent = true;
                tracing::info!("Interrupted; canceling job");
                spinner.set_message("canceling");
                controller.cancel()?;
            }
        }
    };

    // Orphan and fallback-settled cancels may still be in flight; the runtime
    // would abort them on exit.
    spinner.set_message("finishing pending requests");
    controller.shutdown(config.request_timeout * 2).await;
    spinner.finish_and_clear();
    Ok(outcome)
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    let mark = match outcome.status {
        Status::Success => "✔",
        Status::Canceled => "■",
        _ => "✘",
    };
    match &outcome.job_id {
        Some(id) => eprintln!("{mark} {} [{id}] {}", outcome.status, outcome.message),
        None => eprintln!("{mark} {} {}", outcome.status, outcome.message),
    }
    Ok(())
}

/// Read the job payload from a file or stdin (`-`). Empty input means `{}`.
fn read_payload(source: &str) -> Result<serde_json::Value> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("cannot read payload from stdin")?;
        text
    } else {
        std::fs::read_to_string(Path::new(source))
            .with_context(|| format!("cannot read payload file {source}"))?
    };
    parse_payload(&text)
}

fn parse_payload(text: &str) -> Result<serde_json::Value> {
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    let payload: serde_json::Value =
        serde_json::from_str(text).context("payload is not valid JSON")?;
    if !payload.is_object() {
        bail!("payload must be a JSON object");
    }
    Ok(payload)
}
