//! Operator-facing output sink
//!
//! The workflow never writes to the process stdout directly. It is handed an
//! [`OutputSink`] whose terminal capability is decided once, at construction,
//! and which can be shared with the progress monitor task.

use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};

use colored::Colorize;
use tracing::{debug, warn};

/// Shared, cloneable text sink with a fixed "interactive" capability
#[derive(Clone)]
pub struct OutputSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    interactive: bool,
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl OutputSink {
    /// Sink writing to the process stdout; interactive iff stdout is a terminal
    pub fn stdout() -> Self {
        let interactive = io::stdout().is_terminal();
        debug!(interactive, "OutputSink::stdout: called");
        Self::from_writer(io::stdout(), interactive)
    }

    /// Sink over an arbitrary writer with an explicit capability
    pub fn from_writer(writer: impl Write + Send + 'static, interactive: bool) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            interactive,
        }
    }

    /// Sink that discards everything
    pub fn null() -> Self {
        Self::from_writer(io::sink(), false)
    }

    /// In-memory sink, returning the buffer it writes into
    pub fn capture(interactive: bool) -> (Self, CaptureBuffer) {
        let buffer = CaptureBuffer::default();
        (Self::from_writer(buffer.clone(), interactive), buffer)
    }

    /// Whether erasable progress and colors are supported
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Write text as-is
    pub fn put(&self, text: &str) {
        self.write_all(text.as_bytes());
    }

    /// Write text in green on interactive sinks
    pub fn put_green(&self, text: &str) {
        if self.interactive {
            self.put(&text.green().to_string());
        } else {
            self.put(text);
        }
    }

    /// Flush the underlying writer
    pub fn flush(&self) {
        if let Ok(mut w) = self.writer.lock()
            && let Err(e) = w.flush()
        {
            warn!(error = %e, "OutputSink::flush: flush failed");
        }
    }

    fn write_all(&self, bytes: &[u8]) {
        match self.writer.lock() {
            Ok(mut w) => {
                if let Err(e) = w.write_all(bytes) {
                    warn!(error = %e, "OutputSink::write_all: write failed");
                }
            }
            Err(_) => warn!("OutputSink::write_all: writer lock poisoned"),
        }
    }
}

/// Shared byte buffer backing [`OutputSink::capture`]
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .0
            .lock()
            .map_err(|_| io::Error::other("capture buffer lock poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
