//! Jobflow - pipeline runner
//!
//! CLI entry point for running pipeline files and inspecting saved workflows.

use std::fs;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use jobflow::cli::{Cli, Command};
use jobflow::config::{Config, Settings};
use jobflow::{JobError, ParserRegistry, Pipeline, Workflow, inspect, render_error};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jobflow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("jobflow.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    let outcome = match cli.command {
        Command::Run {
            pipeline,
            output_dir,
            dry_run,
            no_progress,
        } => cmd_run(&config, &pipeline, &output_dir, dry_run, no_progress).await,
        Command::Show { path, jobs } => cmd_show(&config, &path, &jobs),
    };

    if let Err(e) = outcome {
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = handle.write_all(render_error(&e, stderr.is_terminal()).as_bytes());
        std::process::exit(1);
    }
    Ok(())
}

/// Run every job of a pipeline file; the state is saved even on failure
async fn cmd_run(
    config: &Config,
    pipeline: &Path,
    output_dir: &Path,
    dry_run: bool,
    no_progress: bool,
) -> Result<(), JobError> {
    debug!(?pipeline, ?output_dir, dry_run, no_progress, "cmd_run: called");
    let jobs = Pipeline::load(pipeline)?.build_jobs(&ParserRegistry::standard())?;

    let mut settings = Settings::from(config);
    if no_progress {
        settings.show_progress = false;
    }
    let mut wf = Workflow::new(output_dir)?.with_settings(settings);
    wf.set_dry_run(dry_run);
    info!(jobs = jobs.len(), output_dir = %wf.output_dir().display(), "Running pipeline");

    let mut result = Ok(());
    for job in jobs {
        if let Err(e) = wf.run_job(job).await {
            result = Err(e);
            break;
        }
    }
    let saved = wf.save_state().map(|path| debug!(?path, "cmd_run: state saved"));
    result.and(saved)
}

/// Print the job list, or details of the selected jobs
fn cmd_show(config: &Config, path: &Path, jobs: &[usize]) -> Result<(), JobError> {
    debug!(?path, ?jobs, "cmd_show: called");
    let wf = Workflow::open(path, Settings::from(config))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if jobs.is_empty() {
        inspect::write_job_list(&wf, &mut out)?;
        eprintln!("To see details, add job number(s).");
    } else {
        inspect::write_jobs_info(&wf, jobs, config.inspect.max_inline_chars, &mut out)?;
    }
    Ok(())
}
