//! Timestamp-based staleness ("is this target up to date?").
//!
//! Verdicts are computed once per run, before anything executes, from a single
//! view of the filesystem. Results are memoized so shared subgraphs are only
//! inspected once.
//!
//! Rules, per node kind:
//! - phony targets are always stale;
//! - source paths are up to date when they exist and a `MissingSource` error
//!   otherwise;
//! - file targets are stale when the output is missing, when any dependency
//!   is itself stale, or when any dependency is strictly newer than the
//!   output. Equal timestamps count as up to date.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::graph::{BuildGraph, NodeKind};

/// Filesystem queries needed for staleness checks.
pub trait Filesystem: Send + Sync {
  /// Modification time of `path`, or `None` if it does not exist.
  fn modified(&self, path: &Path) -> io::Result<Option<SystemTime>>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
  fn modified(&self, path: &Path) -> io::Result<Option<SystemTime>> {
    match std::fs::metadata(path) {
      Ok(meta) => meta.modified().map(Some),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Staleness {
  Stale,
  UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum StalenessError {
  #[error("file dependency '{}' does not exist", .0.display())]
  MissingSource(PathBuf),

  #[error("cannot stat '{}': {message}", path.display())]
  Stat { path: PathBuf, message: String },
}

pub type Verdict = Result<Staleness, StalenessError>;

/// Memoizing evaluator over one graph and one filesystem view.
pub struct StalenessEvaluator<'a, F: Filesystem + ?Sized> {
  graph: &'a BuildGraph,
  fs: &'a F,
  verdicts: HashMap<NodeIndex, Verdict>,
  mtimes: HashMap<NodeIndex, Option<SystemTime>>,
}

impl<'a, F: Filesystem + ?Sized> StalenessEvaluator<'a, F> {
  pub fn new(graph: &'a BuildGraph, fs: &'a F) -> Self {
    Self {
      graph,
      fs,
      verdicts: HashMap::new(),
      mtimes: HashMap::new(),
    }
  }

  /// Decide whether `idx` must run.
  pub fn evaluate(&mut self, idx: NodeIndex) -> Verdict {
    if let Some(verdict) = self.verdicts.get(&idx) {
      return verdict.clone();
    }
    let verdict = self.compute(idx);
    trace!(node = %self.graph.node(idx).key, ?verdict, "staleness verdict");
    self.verdicts.insert(idx, verdict.clone());
    verdict
  }

  /// Evaluate every node, dependencies first.
  pub fn evaluate_all(mut self) -> HashMap<NodeIndex, Verdict> {
    for &idx in self.graph.topological_order() {
      self.evaluate(idx);
    }
    let stale = self.verdicts.values().filter(|v| matches!(v, Ok(Staleness::Stale))).count();
    debug!(nodes = self.verdicts.len(), stale, "staleness evaluated");
    self.verdicts
  }

  fn compute(&mut self, idx: NodeIndex) -> Verdict {
    let graph = self.graph;
    let node = graph.node(idx);
    match &node.kind {
      NodeKind::Phony(_) => Ok(Staleness::Stale),
      NodeKind::Source(path) => match self.mtime(idx)? {
        Some(_) => Ok(Staleness::UpToDate),
        None => Err(StalenessError::MissingSource(path.clone())),
      },
      NodeKind::File(_) => {
        let Some(output_mtime) = self.mtime(idx)? else {
          return Ok(Staleness::Stale);
        };

        let mut stale = false;
        for dep in graph.dependencies(idx) {
          if self.evaluate(dep.node)? == Staleness::Stale {
            stale = true;
            continue;
          }
          if let Some(dep_mtime) = self.mtime(dep.node)?
            && dep_mtime > output_mtime
          {
            trace!(node = %node.key, dep = %graph.node(dep.node).key, "dependency is newer than output");
            stale = true;
          }
        }

        Ok(if stale { Staleness::Stale } else { Staleness::UpToDate })
      }
    }
  }

  fn mtime(&mut self, idx: NodeIndex) -> Result<Option<SystemTime>, StalenessError> {
    if let Some(mtime) = self.mtimes.get(&idx) {
      return Ok(*mtime);
    }
    let path = match &self.graph.node(idx).kind {
      NodeKind::File(t) => t.output(),
      NodeKind::Source(path) => path.as_path(),
      NodeKind::Phony(_) => return Ok(None),
    };
    let mtime = self.fs.modified(path).map_err(|e| StalenessError::Stat {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;
    self.mtimes.insert(idx, mtime);
    Ok(mtime)
  }
}
