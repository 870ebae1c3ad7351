//! Live progress line for interactive terminals
//!
//! While a job runs, the monitor periodically asks the job's [`LiveOutput`]
//! for a summary, prints `elapsed + summary`, flushes, and backspaces over it
//! so the next tick overwrites it in place.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::console::OutputSink;
use crate::job::LiveOutput;

/// Format of the elapsed-time column
pub fn format_elapsed(secs: f64) -> String {
    format!("{:5.1}s  ", secs)
}

/// Background ticker rendering a self-erasing status line
pub struct ProgressMonitor {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl ProgressMonitor {
    /// Start ticking every `interval`
    pub fn start(live: Arc<LiveOutput>, sink: OutputSink, started: Instant, interval: Duration) -> Self {
        debug!(?interval, "ProgressMonitor::start: called");
        let (stop, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.wait_for(|stopped| *stopped) => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Some(summary) = live.poll() {
                    let text = format!("{}{}", format_elapsed(started.elapsed().as_secs_f64()), summary);
                    sink.put(&text);
                    sink.flush();
                    sink.put(&"\u{8}".repeat(text.chars().count()));
                }
            }
            debug!("ProgressMonitor: stopped");
        });
        Self { stop, handle, interval }
    }

    /// Signal the ticker and wait for it, bounded by a few intervals
    ///
    /// A ticker still running after the bound is aborted.
    pub async fn stop(self) {
        debug!("ProgressMonitor::stop: called");
        let _ = self.stop.send(true);
        let bound = self.interval * 4 + Duration::from_millis(100);
        let mut handle = self.handle;
        match tokio::time::timeout(bound, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "ProgressMonitor::stop: monitor task failed"),
            Err(_) => {
                warn!("ProgressMonitor::stop: monitor did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}
