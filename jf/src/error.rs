//! Job error types
//!
//! Every fatal condition of a pipeline run surfaces as a [`JobError`]. Each
//! variant renders a short message and, where useful, a multi-line note
//! (command line, captured stderr) that is printed below the message.

use std::path::PathBuf;

use colored::Colorize;
use thiserror::Error;

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, JobError>;

/// Fatal pipeline errors
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Program not found: {program}")]
    Launch { program: String },

    #[error("Non-zero return value from:\n{command}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        note: String,
    },

    #[error("Interrupted while running {name}")]
    Interrupted { name: String, note: String },

    #[error("No such file: {}", path.display())]
    StateNotFound { path: PathBuf },

    #[error("Cannot read workflow state from {}", path.display())]
    StateCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported workflow state version {found} (expected {expected})")]
    UnsupportedStateVersion { found: u32, expected: u32 },

    #[error("No job number {number} (workflow has {count} jobs)")]
    NoSuchJob { number: usize, count: usize },

    #[error("Invalid pipeline: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Short message shown after `Error:`
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Optional multi-line detail printed below the message
    pub fn note(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { note, .. } | Self::Interrupted { note, .. } if !note.is_empty() => Some(note.as_str()),
            _ => None,
        }
    }

    /// Whether the error came from the operator cancelling a job
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

/// Render an error the way the pipeline reports it to the operator
///
/// The message is wrapped in bold red when `color` is set.
pub fn render_error(err: &JobError, color: bool) -> String {
    let msg = err.message();
    let msg = if color { msg.red().bold().to_string() } else { msg };
    let mut text = format!("Error: {}.\n", msg);
    if let Some(note) = err.note() {
        text.push_str(note);
        text.push('\n');
    }
    text
}
