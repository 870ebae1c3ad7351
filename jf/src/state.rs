//! Persisted workflow state
//!
//! The whole job history of a workflow is stored as one versioned JSON
//! document inside the output directory. Restoring it gives a workflow that
//! can be inspected; nothing is re-run.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{JobError, Result};
use crate::job::Job;

/// Default state file name inside the output directory
pub const DEFAULT_STATE_FILE: &str = "workflow.json";

/// Current schema version
pub const STATE_VERSION: u32 = 1;

/// On-disk representation of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub version: u32,
    pub output_dir: PathBuf,
    pub jobs: Vec<Job>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl WorkflowState {
    pub fn new(output_dir: PathBuf, jobs: Vec<Job>) -> Self {
        Self {
            version: STATE_VERSION,
            output_dir,
            jobs,
        }
    }

    /// Write to `path`, replacing any previous file
    pub fn save(&self, path: &Path) -> Result<()> {
        debug!(?path, jobs = self.jobs.len(), "WorkflowState::save: called");
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        info!(?path, "Saved workflow state");
        Ok(())
    }

    /// Read from `path`
    pub fn load(path: &Path) -> Result<Self> {
        debug!(?path, "WorkflowState::load: called");
        if !path.is_file() {
            return Err(JobError::StateNotFound { path: path.to_path_buf() });
        }
        let content = fs::read_to_string(path)?;
        let corrupt = |source| JobError::StateCorrupt {
            path: path.to_path_buf(),
            source,
        };
        let probe: VersionProbe = serde_json::from_str(&content).map_err(corrupt)?;
        if probe.version != STATE_VERSION {
            return Err(JobError::UnsupportedStateVersion {
                found: probe.version,
                expected: STATE_VERSION,
            });
        }
        serde_json::from_str(&content).map_err(corrupt)
    }
}

/// Resolve a state file from a directory or file argument
pub fn resolve_state_path(file_or_dir: &Path, state_file: &str) -> Result<PathBuf> {
    if file_or_dir.is_dir() {
        Ok(file_or_dir.join(state_file))
    } else if file_or_dir.exists() {
        Ok(file_or_dir.to_path_buf())
    } else {
        Err(JobError::StateNotFound {
            path: file_or_dir.to_path_buf(),
        })
    }
}
