//! Log materialization
//!
//! After a job ends, non-empty stdout / stderr are written to
//! `<NN>-<name>.log` / `<NN>-<name>.err` in the output directory. Content
//! above the inline threshold is then replaced in memory by a reference to
//! the file, which keeps the persisted workflow state small.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::job::{Captured, Job};

/// Base name shared by a job's log files: 2-digit 1-based index and name
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, so the name always stays
/// a single file inside the output directory.
pub fn log_basename(index: usize, job_name: &str) -> String {
    let name: String = job_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    format!("{:02}-{}", index, name)
}

/// In-memory limits for captured output
#[derive(Debug, Clone, Copy)]
pub struct InlineLimits {
    pub max_lines: usize,
    pub max_chars: usize,
}

impl Default for InlineLimits {
    fn default() -> Self {
        Self {
            max_lines: 5,
            max_chars: 50,
        }
    }
}

/// Write one stream and, if it is long, swap it for a file reference
///
/// Returns the path written, if any. Output already moved to a file is left
/// untouched, so calling this again does not change the file.
fn materialize(captured: &mut Captured, dir: &Path, file_name: String, limits: InlineLimits) -> Result<Option<PathBuf>> {
    let Some(content) = captured.content() else {
        return Ok(None);
    };
    if content.is_empty() {
        return Ok(None);
    }
    let path = dir.join(&file_name);
    fs::write(&path, content.as_bytes())?;
    debug!(?path, bytes = content.len(), "materialize: wrote log");
    if captured.is_long(limits.max_lines, limits.max_chars) {
        *captured = Captured::Logged {
            size: captured.size_label(),
            file: file_name,
        };
    }
    Ok(Some(path))
}

/// Write the logs of the job at 1-based `index`
pub fn write_logs(job: &mut Job, index: usize, dir: &Path, limits: InlineLimits) -> Result<Vec<PathBuf>> {
    let basename = log_basename(index, &job.name);
    debug!(%basename, ?dir, "write_logs: called");
    let mut written = Vec::new();
    written.extend(materialize(&mut job.out, dir, format!("{}.log", basename), limits)?);
    written.extend(materialize(&mut job.err, dir, format!("{}.err", basename), limits)?);
    Ok(written)
}
