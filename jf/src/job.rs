//! Job domain type
//!
//! A [`Job`] describes one invocation of an external program and, once run,
//! carries what it produced. The description (arguments, stdin, parser) is
//! fixed by whoever builds the job; the run state is filled in by the
//! [`crate::Workflow`] that executes it.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::drain::LineQueue;
use crate::error::Result;
use crate::parser::{IncrementalParser, OutputParser};
use crate::workflow::Workflow;

/// Output captured from one stream of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Captured {
    /// Nothing captured yet
    #[default]
    Empty,
    /// Whole stream as text (jobs without a parser)
    Text(String),
    /// Stream as lines, each with its newline (jobs with a parser)
    Lines(Vec<String>),
    /// Content moved to a log file in the output directory
    Logged { file: String, size: String },
}

impl Captured {
    /// Build from drained lines, choosing the representation
    pub fn from_lines(lines: Vec<String>, keep_lines: bool) -> Self {
        if lines.is_empty() {
            Self::Empty
        } else if keep_lines {
            Self::Lines(lines)
        } else {
            Self::Text(lines.concat())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Lines(l) => l.is_empty(),
            Self::Logged { .. } => false,
        }
    }

    /// In-memory content, `None` once moved to a log file
    pub fn content(&self) -> Option<String> {
        match self {
            Self::Empty => Some(String::new()),
            Self::Text(s) => Some(s.clone()),
            Self::Lines(l) => Some(l.concat()),
            Self::Logged { .. } => None,
        }
    }

    /// Whether the content is above the in-memory threshold
    pub fn is_long(&self, max_lines: usize, max_chars: usize) -> bool {
        match self {
            Self::Empty | Self::Logged { .. } => false,
            Self::Text(s) => s.chars().count() > max_chars,
            Self::Lines(l) => l.len() > max_lines,
        }
    }

    /// Human readable size: `no output`, `<N> lines` or `<K>kB`
    pub fn size_label(&self) -> String {
        match self {
            Self::Empty => "no output".to_string(),
            Self::Text(s) if s.is_empty() => "no output".to_string(),
            Self::Text(s) => format!("{:.1}kB", s.len() as f64 / 1024.0),
            Self::Lines(l) if l.len() == 1 => "1 line".to_string(),
            Self::Lines(l) => format!("{} lines", l.len()),
            Self::Logged { size, .. } => size.clone(),
        }
    }

    /// Inline text or `-> <file>` reference
    pub fn display_text(&self) -> String {
        match self {
            Self::Logged { file, .. } => format!("-> {}", file),
            other => other.content().unwrap_or_default(),
        }
    }
}

/// One external-program invocation and its results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Display name, derived from the program path
    pub name: String,

    /// Program followed by its arguments
    pub args: Vec<String>,

    /// Text fed to the program's standard input
    #[serde(default)]
    pub stdin: String,

    /// Captured standard output
    #[serde(default)]
    pub out: Captured,

    /// Captured standard error
    #[serde(default)]
    pub err: Captured,

    /// Launch time
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Wall time from launch to exit, in seconds
    #[serde(default)]
    pub elapsed_secs: Option<f64>,

    /// Exit code, when the program exited normally
    #[serde(default)]
    pub exit_code: Option<i32>,

    /// Attached output parser and its state
    #[serde(default)]
    pub parser: Option<OutputParser>,
}

impl Job {
    /// Create a job for `program`, named after its file name
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let name = Path::new(&program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| program.clone());
        debug!(%program, %name, "Job::new: called");
        Self {
            name,
            args: vec![program],
            stdin: String::new(),
            out: Captured::Empty,
            err: Captured::Empty,
            started_at: None,
            elapsed_secs: None,
            exit_code: None,
            parser: None,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the standard input payload
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = input.into();
        self
    }

    /// Override the display name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach an output parser
    pub fn with_parser(mut self, parser: OutputParser) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Program path (first argument), empty if there is none
    pub fn program(&self) -> &str {
        self.args.first().map_or("", String::as_str)
    }

    /// Whether the job ran to the end
    pub fn is_finished(&self) -> bool {
        self.elapsed_secs.is_some()
    }

    /// Arguments quoted, as passed to the program
    pub fn command_line(&self) -> String {
        self.args.iter().map(|a| format!("\"{}\"", a)).collect::<Vec<_>>().join(" ")
    }

    /// Shell-like rendering of the arguments and the stdin payload
    pub fn args_as_str(&self) -> String {
        let mut s = self.command_line();
        if !self.stdin.is_empty() {
            s.push_str(&format!(" << EOF\n{}\nEOF", self.stdin));
        }
        s
    }

    /// Progress or result summary
    ///
    /// With a parser attached this is the parser's summary. Otherwise finished
    /// jobs report their output sizes and running jobs an empty summary.
    pub fn summarize(&self) -> Option<String> {
        if let Some(parser) = &self.parser {
            return parser.summary();
        }
        if !self.is_finished() {
            return Some(String::new());
        }
        let mut summary = format!("stdout: {}", self.out.size_label());
        if !self.err.is_empty() {
            summary.push_str(&format!(" stderr: {}", self.err.size_label()));
        }
        Some(summary)
    }

    /// Run this job in `workflow`
    pub async fn run(self, workflow: &mut Workflow) -> Result<&Job> {
        workflow.run_job(self).await
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Job {}", self.name)?;
        if let Some(started) = self.started_at {
            write!(f, " {}", started.with_timezone(&Local).format("%Y-%m-%d %H:%M"))?;
        }
        Ok(())
    }
}

struct LiveState {
    parser: Option<OutputParser>,
    consumed: Vec<String>,
}

/// View of a running job's stdout shared with the progress monitor
///
/// The parser consumes lines from the stdout queue here; the consumed lines
/// are handed back to the control flow when the job is finalized.
pub struct LiveOutput {
    stdout: Arc<LineQueue>,
    state: Mutex<LiveState>,
}

impl LiveOutput {
    pub fn new(stdout: Arc<LineQueue>, parser: Option<OutputParser>) -> Self {
        Self {
            stdout,
            state: Mutex::new(LiveState {
                parser,
                consumed: Vec::new(),
            }),
        }
    }

    /// Feed newly available lines to the parser and summarize
    ///
    /// Without a parser nothing is consumed and the summary is empty.
    pub fn poll(&self) -> Option<String> {
        let Ok(mut state) = self.state.lock() else {
            warn!("LiveOutput::poll: lock poisoned");
            return None;
        };
        let LiveState { parser, consumed } = &mut *state;
        match parser {
            Some(parser) => {
                let lines = self.stdout.take_available();
                let summary = parser.consume_and_summarize(&lines);
                consumed.extend(lines);
                summary
            }
            None => Some(String::new()),
        }
    }

    /// Final parse, then return the parser and every stdout line seen
    pub fn finish(&self) -> (Option<OutputParser>, Vec<String>) {
        self.poll();
        let Ok(mut state) = self.state.lock() else {
            warn!("LiveOutput::finish: lock poisoned");
            return (None, self.stdout.take_available());
        };
        let mut lines = std::mem::take(&mut state.consumed);
        lines.extend(self.stdout.take_available());
        (state.parser.take(), lines)
    }
}
