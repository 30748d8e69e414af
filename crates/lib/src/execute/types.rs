//! Types for build execution.
//!
//! This module defines the error types, per-node outcomes, the aggregate
//! report, and configuration for running a build graph.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::graph::NodeKey;
use crate::render::RenderError;
use crate::staleness::StalenessError;

/// Why a single node failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecuteError {
  #[error(transparent)]
  Staleness {
    #[from]
    source: StalenessError,
  },

  #[error(transparent)]
  Render {
    #[from]
    source: RenderError,
  },

  /// The command ran and reported failure.
  #[error("command {}: {cmd}", describe_exit(code))]
  CmdFailed { cmd: String, code: Option<i32> },

  /// The command could not be started. Treated like a failing command.
  #[error("failed to launch command: {cmd}: {message}")]
  Spawn { cmd: String, message: String },

  /// The command exited successfully but did not create the target's output.
  #[error("command succeeded but '{}' was not created", path.display())]
  OutputMissing { path: PathBuf },
}

fn describe_exit(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("exited with status {code}"),
    None => "was terminated by a signal".to_string(),
  }
}

/// Why a node never ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "node", rename_all = "snake_case")]
pub enum SkipReason {
  /// A node this one depends on (directly or transitively) failed.
  DependencyFailed(NodeKey),
  /// Dispatch stopped after a failure elsewhere in the graph.
  BuildHalted,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipReason::DependencyFailed(key) => write!(f, "dependency '{key}' failed"),
      SkipReason::BuildHalted => f.write_str("build halted"),
    }
  }
}

/// Lifecycle of a node inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
  Pending,
  Ready,
  Running,
  Succeeded,
  Failed,
  Skipped,
}

impl NodeState {
  pub fn is_terminal(self) -> bool {
    matches!(self, NodeState::Succeeded | NodeState::Failed | NodeState::Skipped)
  }
}

/// Terminal outcome of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeOutcome {
  /// The node's command ran and succeeded.
  Executed { command: String },
  /// The node was fresh and nothing ran.
  UpToDate,
  /// The node had no command to run (a grouping phony target).
  NoCommand,
  Failed { error: ExecuteError },
  Skipped { reason: SkipReason },
}

impl NodeOutcome {
  pub fn is_success(&self) -> bool {
    matches!(
      self,
      NodeOutcome::Executed { .. } | NodeOutcome::UpToDate | NodeOutcome::NoCommand
    )
  }
}

/// Outcome of one node, as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
  pub key: NodeKey,
  pub outcome: NodeOutcome,
}

/// Result of running a build graph.
///
/// Every node reachable from the requested targets appears in `nodes`, in
/// topological order, including the ones that were skipped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
  pub nodes: Vec<NodeReport>,

  /// Nodes whose command was started, in dispatch order.
  pub dispatched: Vec<NodeKey>,

  /// The first node to fail, if any.
  pub first_failure: Option<NodeKey>,
}

impl BuildReport {
  /// Returns true if no node failed or was skipped.
  pub fn is_success(&self) -> bool {
    self.nodes.iter().all(|n| n.outcome.is_success())
  }

  pub fn outcome(&self, key: &NodeKey) -> Option<&NodeOutcome> {
    self.nodes.iter().find(|n| &n.key == key).map(|n| &n.outcome)
  }

  /// The first failure with its error.
  pub fn failure(&self) -> Option<(&NodeKey, &ExecuteError)> {
    let key = self.first_failure.as_ref()?;
    match self.outcome(key)? {
      NodeOutcome::Failed { error } => Some((key, error)),
      _ => None,
    }
  }

  pub fn executed(&self) -> usize {
    self.count(|o| matches!(o, NodeOutcome::Executed { .. }))
  }

  pub fn up_to_date(&self) -> usize {
    self.count(|o| matches!(o, NodeOutcome::UpToDate))
  }

  pub fn failed(&self) -> usize {
    self.count(|o| matches!(o, NodeOutcome::Failed { .. }))
  }

  pub fn skipped(&self) -> impl Iterator<Item = (&NodeKey, &SkipReason)> {
    self.nodes.iter().filter_map(|n| match &n.outcome {
      NodeOutcome::Skipped { reason } => Some((&n.key, reason)),
      _ => None,
    })
  }

  fn count(&self, pred: impl Fn(&NodeOutcome) -> bool) -> usize {
    self.nodes.iter().filter(|n| pred(&n.outcome)).count()
  }
}

/// Configuration for build execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of commands running at once. Zero means unbounded.
  pub jobs: usize,

  /// Keep dispatching independent work after a failure.
  pub keep_going: bool,

  /// Shell used to run commands.
  /// If None, uses /bin/bash (or /bin/sh without bash) on Unix and
  /// powershell.exe on Windows.
  pub shell: Option<String>,

  /// Working directory for every command.
  pub cwd: PathBuf,

  /// Print each command line to stdout before running it.
  pub echo: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      jobs: 0,
      keep_going: false,
      shell: None,
      cwd: PathBuf::from("."),
      echo: true,
    }
  }
}

/// Exit status of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdStatus {
  /// Exit code, or `None` if the process was killed by a signal.
  pub code: Option<i32>,
}

impl CmdStatus {
  pub fn success(self) -> bool {
    self.code == Some(0)
  }
}
