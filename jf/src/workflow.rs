//! Workflow - sequential job execution in one output directory
//!
//! A [`Workflow`] runs jobs one at a time and keeps an append-only history of
//! them. Each run goes through:
//!
//! ```text
//! CREATED -> SPAWNED -> RUNNING/DRAINING -> FINISHED_OK | FINISHED_ERROR | INTERRUPTED
//! ```
//!
//! Children start with the output directory as their working directory,
//! stdout and stderr are drained in background tasks, a progress monitor runs
//! on interactive sinks, and logs are written when the job ends.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::console::OutputSink;
use crate::drain::OutputDrain;
use crate::error::{JobError, Result};
use crate::job::{Captured, Job, LiveOutput};
use crate::logs::{InlineLimits, write_logs};
use crate::monitor::{ProgressMonitor, format_elapsed};
use crate::state::{WorkflowState, resolve_state_path};

/// Where operator cancellation comes from
#[derive(Debug, Clone, Default)]
pub enum Interrupt {
    /// Ctrl-C delivered to this process
    #[default]
    CtrlC,
    /// Flag flipped to `true` by the embedding code
    Watch(watch::Receiver<bool>),
    /// Never interrupted
    Never,
}

impl Interrupt {
    /// Flag-based interrupt and the sender that triggers it
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::Watch(rx))
    }

    async fn triggered(mut self) {
        match &mut self {
            Self::CtrlC => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Interrupt: cannot listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
            }
            Self::Watch(rx) => {
                if rx.wait_for(|flag| *flag).await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            Self::Never => std::future::pending::<()>().await,
        }
    }
}

/// How the draining phase ended
enum Drained {
    Exited(ExitStatus),
    Interrupted,
}

/// Ordered, append-only history of jobs run in one output directory
#[derive(Debug)]
pub struct Workflow {
    output_dir: PathBuf,
    jobs: Vec<Job>,
    dry_run: bool,
    sink: OutputSink,
    settings: Settings,
    interrupt: Interrupt,
}

impl Workflow {
    /// Create the workflow, creating `output_dir` if needed
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref();
        debug!(?output_dir, "Workflow::new: called");
        std::fs::create_dir_all(output_dir)?;
        let output_dir = output_dir.canonicalize()?;
        Ok(Self {
            output_dir,
            jobs: Vec::new(),
            dry_run: false,
            sink: OutputSink::stdout(),
            settings: Settings::default(),
            interrupt: Interrupt::default(),
        })
    }

    /// Use another output sink
    pub fn with_sink(mut self, sink: OutputSink) -> Self {
        self.sink = sink;
        self
    }

    /// Use other runtime settings
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Use another cancellation source
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Stop each run right after the process is spawned
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Job by 1-based number
    pub fn job(&self, number: usize) -> Option<&Job> {
        number.checked_sub(1).and_then(|i| self.jobs.get(i))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run `job` with the progress line enabled when the sink allows it
    pub async fn run_job(&mut self, job: Job) -> Result<&Job> {
        let show_progress = self.settings.show_progress;
        self.run_job_with(job, show_progress).await
    }

    /// Run `job`, appending it to the history
    pub async fn run_job_with(&mut self, job: Job, show_progress: bool) -> Result<&Job> {
        let show_progress = show_progress && self.sink.is_interactive();
        debug!(name = %job.name, show_progress, "Workflow::run_job_with: called");

        self.jobs.push(job);
        let index = self.jobs.len();
        let sink = self.sink.clone();
        let output_dir = self.output_dir.clone();
        let limits = InlineLimits {
            max_lines: self.settings.max_inline_lines,
            max_chars: self.settings.max_inline_chars,
        };
        let interval = self.settings.progress_interval;
        let dry_run = self.dry_run;
        let interrupt = self.interrupt.clone();
        let job = self.jobs.last_mut().ok_or_else(|| std::io::Error::other("empty job history"))?;

        sink.put(&format!("{:3} ", index));
        sink.put_green(&format!("{:<15}", job.name));
        sink.flush();

        // CREATED -> SPAWNED
        job.started_at = Some(Utc::now());
        let clock = Instant::now();
        info!(index, name = %job.name, command = %job.command_line(), "Starting job");
        let mut child = spawn(job, &output_dir)?;

        if dry_run {
            debug!("Workflow::run_job_with: dry run, stopping after spawn");
            let _ = child.start_kill();
            let _ = child.wait().await;
            sink.put("(dry run)\n");
            return Ok(job);
        }

        // SPAWNED -> RUNNING
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| std::io::Error::other("child stdout not piped"))?;
        let stderr = child.stderr.take().ok_or_else(|| std::io::Error::other("child stderr not piped"))?;
        let mut out_drain = OutputDrain::spawn(stdout, "stdout");
        let mut err_drain = OutputDrain::spawn(stderr, "stderr");
        let err_queue = err_drain.queue();
        let keep_lines = job.parser.is_some();
        let live = Arc::new(LiveOutput::new(out_drain.queue(), job.parser.take()));
        let monitor =
            show_progress.then(|| ProgressMonitor::start(Arc::clone(&live), sink.clone(), clock, interval));

        // RUNNING <-> DRAINING
        let drained = {
            let finish = drain_to_exit(
                &mut child,
                stdin,
                &job.stdin,
                &job.name,
                &sink,
                &mut out_drain,
                &mut err_drain,
            );
            tokio::select! {
                biased;
                _ = interrupt.triggered() => Drained::Interrupted,
                result = finish => match result? {
                    // a terminal Ctrl-C reaches the child's process group too
                    status if killed_by_sigint(&status) => Drained::Interrupted,
                    status => Drained::Exited(status),
                },
            }
        };

        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        let status = match drained {
            Drained::Exited(status) => status,
            Drained::Interrupted => {
                warn!(name = %job.name, "Job interrupted");
                let _ = child.start_kill();
                out_drain.abort();
                err_drain.abort();
                let (parser, out_lines) = live.finish();
                job.parser = parser;
                job.out = Captured::from_lines(out_lines, keep_lines);
                job.err = Captured::from_lines(err_queue.take_available(), keep_lines);
                if let Err(e) = write_logs(job, index, &output_dir, limits) {
                    warn!(error = %e, "Workflow::run_job_with: writing logs after interrupt failed");
                }
                let _ = child.wait().await;
                sink.put("\n");
                return Err(JobError::Interrupted {
                    name: job.name.clone(),
                    note: job.args_as_str(),
                });
            }
        };

        // FINISHED: take ownership of everything drained
        let (parser, out_lines) = live.finish();
        job.parser = parser;
        job.out = Captured::from_lines(out_lines, keep_lines);
        job.err = Captured::from_lines(err_queue.take_available(), keep_lines);
        job.exit_code = status.code();
        let elapsed = clock.elapsed().as_secs_f64();
        job.elapsed_secs = Some(elapsed);

        sink.put(&format_elapsed(elapsed));
        sink.put(&format!("{}\n", job.summarize().unwrap_or_default()));
        sink.flush();
        info!(name = %job.name, elapsed, code = ?status.code(), "Job finished");

        let err_text = job.err.content().unwrap_or_default();
        write_logs(job, index, &output_dir, limits)?;

        if !status.success() {
            let command = job.command_line();
            let mut notes = vec![command.clone()];
            if let Captured::Logged { file, .. } = &job.out {
                notes.push(format!("stdout -> {}", output_dir.join(file).display()));
            }
            if let Captured::Logged { file, .. } = &job.err {
                notes.push(format!("stderr -> {}", output_dir.join(file).display()));
            }
            if !err_text.is_empty() {
                notes.push("stderr:".to_string());
                notes.push(err_text.trim_end().to_string());
            }
            return Err(JobError::NonZeroExit {
                command,
                code: status.code(),
                note: notes.join("\n"),
            });
        }
        Ok(job)
    }

    /// Persist the job history into the output directory
    pub fn save_state(&self) -> Result<PathBuf> {
        let path = self.output_dir.join(&self.settings.state_file);
        WorkflowState::new(self.output_dir.clone(), self.jobs.clone()).save(&path)?;
        Ok(path)
    }

    /// Restore a workflow for inspection from a directory or state file
    pub fn open(file_or_dir: impl AsRef<Path>, settings: Settings) -> Result<Self> {
        let path = resolve_state_path(file_or_dir.as_ref(), &settings.state_file)?;
        debug!(?path, "Workflow::open: called");
        let state = WorkflowState::load(&path)?;
        Ok(Self {
            output_dir: state.output_dir,
            jobs: state.jobs,
            dry_run: false,
            sink: OutputSink::stdout(),
            settings,
            interrupt: Interrupt::default(),
        })
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Workflow with {} jobs @ {}", self.jobs.len(), self.output_dir.display())
    }
}

#[cfg(unix)]
fn killed_by_sigint(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    const SIGINT: i32 = 2;
    status.signal() == Some(SIGINT)
}

#[cfg(not(unix))]
fn killed_by_sigint(_status: &ExitStatus) -> bool {
    false
}

fn spawn(job: &Job, output_dir: &Path) -> Result<Child> {
    let Some((program, args)) = job.args.split_first() else {
        return Err(JobError::Pipeline(format!("job {} has no program", job.name)));
    };
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(output_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    match command.spawn() {
        Ok(child) => Ok(child),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(%program, "spawn: program not found");
            Err(JobError::Launch {
                program: program.clone(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Feed stdin, wait for both drains and for the exit status
async fn drain_to_exit(
    child: &mut Child,
    stdin: Option<ChildStdin>,
    input: &str,
    name: &str,
    sink: &OutputSink,
    out_drain: &mut OutputDrain,
    err_drain: &mut OutputDrain,
) -> Result<ExitStatus> {
    if let Some(mut stdin) = stdin {
        if let Err(e) = stdin.write_all(input.as_bytes()).await {
            match e.kind() {
                ErrorKind::BrokenPipe | ErrorKind::InvalidInput => {
                    warn!(%name, error = %e, "Passing std input failed");
                    sink.put(&format!("\nWarning: passing std input to {} failed.\n", name));
                }
                _ => return Err(e.into()),
            }
        }
        // closing stdin lets the child see end of input
        drop(stdin);
    }
    out_drain.wait().await?;
    err_drain.wait().await?;
    Ok(child.wait().await?)
}
