//! Pipeline definition files
//!
//! A pipeline is a YAML list of program invocations that the `run` command
//! executes in order. It is the tool-agnostic way of building [`Job`]s.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{JobError, Result};
use crate::job::Job;
use crate::parser::{ParserParams, ParserRegistry};

/// Parser reference inside a pipeline step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserSpec {
    /// Registry identifier (`refinement`, `blobs`)
    pub kind: String,

    #[serde(flatten)]
    pub params: ParserParams,
}

/// One step of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Program path or name looked up in PATH
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Display name, defaults to the program's file name
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub stdin: Option<String>,

    #[serde(default)]
    pub parser: Option<ParserSpec>,
}

/// Ordered list of steps
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    pub jobs: Vec<StepDefinition>,
}

impl Pipeline {
    /// Load a pipeline file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(?path, "Pipeline::load: called");
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let pipeline: Self = serde_yaml::from_str(content).map_err(|e| JobError::Pipeline(e.to_string()))?;
        if let Some(i) = pipeline.jobs.iter().position(|s| s.program.trim().is_empty()) {
            return Err(JobError::Pipeline(format!("step {} has an empty program", i + 1)));
        }
        Ok(pipeline)
    }

    /// Build the jobs, attaching parsers from `registry`
    pub fn build_jobs(&self, registry: &ParserRegistry) -> Result<Vec<Job>> {
        self.jobs
            .iter()
            .map(|step| {
                let mut job = Job::new(step.program.clone()).args(step.args.iter().cloned());
                if let Some(name) = &step.name {
                    job = job.named(name.clone());
                }
                if let Some(stdin) = &step.stdin {
                    job = job.stdin(stdin.clone());
                }
                if let Some(spec) = &step.parser {
                    job = job.with_parser(registry.create(&spec.kind, &spec.params)?);
                }
                Ok(job)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{OutputParser, RefinementParser};

    const YAML: &str = r#"
jobs:
  - program: /usr/bin/sort
    args: ["-r"]
    stdin: |
      b
      a
  - program: refmac5
    name: refmac5 restr
    parser:
      kind: refinement
      ncyc: 8
"#;

    #[test]
    fn test_from_yaml_builds_jobs() {
        let pipeline = Pipeline::from_yaml(YAML).unwrap();
        let jobs = pipeline.build_jobs(&ParserRegistry::standard()).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "sort");
        assert_eq!(jobs[0].args, vec!["/usr/bin/sort", "-r"]);
        assert_eq!(jobs[0].stdin, "b\na\n");
        assert_eq!(jobs[1].name, "refmac5 restr");
        assert_eq!(
            jobs[1].parser,
            Some(OutputParser::Refinement(RefinementParser::new(8)))
        );
    }

    #[test]
    fn test_unknown_parser() {
        let yaml = "jobs:\n  - program: x\n    parser:\n      kind: magic\n";
        let pipeline = Pipeline::from_yaml(yaml).unwrap();
        assert!(pipeline.build_jobs(&ParserRegistry::standard()).is_err());
    }

    #[test]
    fn test_empty_program_rejected() {
        let err = Pipeline::from_yaml("jobs:\n  - program: ''\n").unwrap_err();
        assert!(err.to_string().contains("step 1"));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(Pipeline::from_yaml("jobs: [").unwrap_err(), JobError::Pipeline(_)));
    }
}
