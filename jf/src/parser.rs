//! Incremental output parsers
//!
//! A parser is attached to a [`crate::Job`] when the job is built. While the
//! child runs it is fed each stdout line exactly once and can be asked for a
//! one-line summary at any time. Lines it does not understand are ignored.
//!
//! Parsers form a closed set ([`OutputParser`]); the [`ParserRegistry`] maps
//! textual identifiers used in pipeline files to their constructors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{JobError, Result};

/// Capability shared by all output parsers
pub trait IncrementalParser: Send {
    /// Feed one line of output (trailing newline included, if any)
    fn consume(&mut self, line: &str);

    /// Summary of what has been parsed so far, if there is one yet
    fn summary(&self) -> Option<String>;

    /// Consume a batch of newly available lines, then summarize
    fn consume_and_summarize(&mut self, lines: &[String]) -> Option<String> {
        for line in lines {
            self.consume(line);
        }
        self.summary()
    }
}

/// Tracks refinement cycles and the R-free / R quality metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementParser {
    pub cycle: i32,
    /// Total number of cycles requested, -1 if unknown
    pub ncyc: i32,
    pub free_r: f64,
    pub overall_r: f64,
}

impl RefinementParser {
    pub fn new(ncyc: i32) -> Self {
        Self {
            cycle: 0,
            ncyc,
            free_r: 0.0,
            overall_r: 0.0,
        }
    }
}

fn value_after_last_eq(line: &str) -> &str {
    line.rsplit('=').next().unwrap_or("").trim()
}

impl IncrementalParser for RefinementParser {
    fn consume(&mut self, line: &str) {
        let value = value_after_last_eq(line);
        if line.starts_with("Free R factor") {
            if let Ok(v) = value.parse() {
                self.free_r = v;
            }
        } else if line.starts_with("Overall R factor") {
            if let Ok(v) = value.parse() {
                self.overall_r = v;
            }
        } else if (line.starts_with("     Rigid body cycle =") || line.starts_with("     CGMAT cycle number ="))
            && let Ok(v) = value.parse()
        {
            self.cycle = v;
        }
    }

    fn summary(&self) -> Option<String> {
        Some(format!(
            "cycle {:2}/{}   R-free / R = {:.4} / {:.4}",
            self.cycle, self.ncyc, self.free_r, self.overall_r
        ))
    }
}

/// A density blob reported by a blob-search program
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub score: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Collects `#`-marked blob lines whose score is above a threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobParser {
    pub threshold: f64,
    pub blobs: Vec<Blob>,
}

impl BlobParser {
    pub const DEFAULT_THRESHOLD: f64 = 150.0;

    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            blobs: Vec::new(),
        }
    }

    fn parse_line(line: &str) -> Option<Blob> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return None;
        }
        let score = fields[5].parse().ok()?;
        let coord = |s: &str| s.trim_matches(|c: char| c == ',' || c == '(' || c == ')').parse::<f64>().ok();
        let n = fields.len();
        Some(Blob {
            score,
            x: coord(fields[n - 3])?,
            y: coord(fields[n - 2])?,
            z: coord(fields[n - 1])?,
        })
    }
}

impl Default for BlobParser {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl IncrementalParser for BlobParser {
    fn consume(&mut self, line: &str) {
        if !line.starts_with('#') {
            return;
        }
        match Self::parse_line(line) {
            Some(blob) if blob.score > self.threshold => self.blobs.push(blob),
            Some(_) => {}
            None => debug!(line = line.trim_end(), "BlobParser::consume: unparseable marker line"),
        }
    }

    fn summary(&self) -> Option<String> {
        match self.blobs.len() {
            0 => None,
            1 => Some(format!("1 blob above {}", self.threshold)),
            n => Some(format!("{} blobs above {}", n, self.threshold)),
        }
    }
}

/// The closed set of parsers a job can carry, with their state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputParser {
    Refinement(RefinementParser),
    Blobs(BlobParser),
}

impl OutputParser {
    /// Registry identifier of this parser
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Refinement(_) => "refinement",
            Self::Blobs(_) => "blobs",
        }
    }

    fn inner_mut(&mut self) -> &mut dyn IncrementalParser {
        match self {
            Self::Refinement(p) => p,
            Self::Blobs(p) => p,
        }
    }

    fn inner(&self) -> &dyn IncrementalParser {
        match self {
            Self::Refinement(p) => p,
            Self::Blobs(p) => p,
        }
    }
}

impl IncrementalParser for OutputParser {
    fn consume(&mut self, line: &str) {
        self.inner_mut().consume(line);
    }

    fn summary(&self) -> Option<String> {
        self.inner().summary()
    }
}

/// Parameters a parser can be constructed with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserParams {
    /// Expected number of cycles (refinement)
    pub ncyc: Option<i32>,
    /// Minimum score (blobs)
    pub threshold: Option<f64>,
}

type ParserConstructor = fn(&ParserParams) -> OutputParser;

/// Maps parser identifiers to constructors
pub struct ParserRegistry {
    constructors: BTreeMap<&'static str, ParserConstructor>,
}

impl ParserRegistry {
    /// Registry with the built-in parsers
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("refinement", |p| {
            OutputParser::Refinement(RefinementParser::new(p.ncyc.unwrap_or(-1)))
        });
        registry.register("blobs", |p| {
            OutputParser::Blobs(BlobParser::new(p.threshold.unwrap_or(BlobParser::DEFAULT_THRESHOLD)))
        });
        registry
    }

    /// Registry without any parser
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register (or replace) a constructor
    pub fn register(&mut self, kind: &'static str, constructor: ParserConstructor) {
        self.constructors.insert(kind, constructor);
    }

    /// Registered identifiers, sorted
    pub fn kinds(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    /// Build a fresh parser
    pub fn create(&self, kind: &str, params: &ParserParams) -> Result<OutputParser> {
        debug!(%kind, ?params, "ParserRegistry::create: called");
        match self.constructors.get(kind) {
            Some(constructor) => Ok(constructor(params)),
            None => Err(JobError::Pipeline(format!(
                "unknown parser '{}' (known: {})",
                kind,
                self.kinds().join(", ")
            ))),
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
