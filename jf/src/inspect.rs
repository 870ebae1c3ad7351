//! Inspection of a finished (or failed) workflow
//!
//! Renders the job list and per-job details of a restored workflow.

use std::io::Write;

use crate::error::{JobError, Result};
use crate::job::{Captured, Job};
use crate::workflow::Workflow;

/// Print the numbered job list
pub fn write_job_list(wf: &Workflow, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{}", wf)?;
    for (n, job) in wf.jobs().iter().enumerate() {
        writeln!(out, "{:3} {}", n + 1, job)?;
    }
    Ok(())
}

/// Print details of one job
pub fn write_job_info(job: &Job, max_inline_chars: usize, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{}", job)?;
    writeln!(out, "{}", job.args_as_str())?;
    match job.elapsed_secs {
        Some(secs) => writeln!(out, "Total time: {:.1}s", secs)?,
        None => writeln!(out, "Total time: -")?,
    }
    if job.parser.is_some()
        && let Some(summary) = job.summarize().filter(|s| !s.is_empty())
    {
        writeln!(out, "Output summary: {}", summary)?;
    }
    for (label, captured) in [("stdout", &job.out), ("stderr", &job.err)] {
        if let Captured::Text(text) = captured
            && !text.is_empty()
            && text.chars().count() < max_inline_chars
        {
            writeln!(out, "{}: {}", label, text)?;
        }
    }
    Ok(())
}

/// Print details of the jobs with the given 1-based numbers
pub fn write_jobs_info(wf: &Workflow, numbers: &[usize], max_inline_chars: usize, out: &mut impl Write) -> Result<()> {
    for &n in numbers {
        let job = wf.job(n).ok_or(JobError::NoSuchJob {
            number: n,
            count: wf.jobs().len(),
        })?;
        write_job_info(job, max_inline_chars, out)?;
    }
    Ok(())
}
