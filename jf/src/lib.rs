//! Jobflow - sequential execution engine for pipelines of external programs
//!
//! Jobflow runs command-line programs one after another in a single output
//! directory, watches their output while they run, and keeps a history that
//! can be saved and inspected later.
//!
//! # Core Concepts
//!
//! - **Job**: one program invocation plus what it produced
//! - **Workflow**: append-only history of jobs run in one output directory
//! - **Drain**: background task moving a child's stdout/stderr into a queue
//! - **Parser**: extracts progress from output while the program still runs
//! - **Monitor**: self-erasing progress line on interactive terminals
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> jobflow::Result<()> {
//! use jobflow::{Job, Workflow};
//!
//! let mut wf = Workflow::new("out")?;
//! let job = wf.run_job(Job::new("sort").arg("-r").stdin("a\nb\n")).await?;
//! println!("{}", job.summarize().unwrap_or_default());
//! wf.save_state()?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod console;
pub mod drain;
pub mod error;
pub mod inspect;
pub mod job;
pub mod logs;
pub mod monitor;
pub mod parser;
pub mod pipeline;
pub mod state;
pub mod workflow;

pub use config::{Config, Settings};
pub use console::OutputSink;
pub use drain::{LineQueue, OutputDrain};
pub use error::{JobError, Result, render_error};
pub use job::{Captured, Job, LiveOutput};
pub use monitor::ProgressMonitor;
pub use parser::{
    Blob, BlobParser, IncrementalParser, OutputParser, ParserParams, ParserRegistry, RefinementParser,
};
pub use pipeline::Pipeline;
pub use state::{DEFAULT_STATE_FILE, WorkflowState};
pub use workflow::{Interrupt, Workflow};
