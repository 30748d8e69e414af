//! Build execution.
//!
//! This module runs a validated [`BuildGraph`]. It handles:
//! - staleness verdicts, computed once before anything runs
//! - dependency-ordered dispatch to a bounded pool of worker tasks
//! - failure propagation and skip tracking
//!
//! A single coordinator owns the node state table. Workers only run a
//! command and hand its exit status back; every state transition happens on
//! the coordinator, and a node reaches a terminal state at most once.

pub mod cmd;
pub mod types;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

use crate::graph::{BuildGraph, NodeKey, NodeKind};
use crate::render::render_node;
use crate::staleness::{Filesystem, Staleness, StalenessError, StalenessEvaluator, Verdict};
use crate::vars::VariableStore;

pub use cmd::{CommandRunner, ShellRunner};
pub use types::{
  BuildReport, CmdStatus, ExecuteConfig, ExecuteError, NodeOutcome, NodeReport, NodeState, SkipReason,
};

/// A command that would run, as reported by [`plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedCommand {
  pub key: NodeKey,
  pub command: String,
}

/// Execute every stale node in `graph`.
///
/// Nodes are dispatched as soon as all their dependencies have succeeded,
/// with at most `config.jobs` commands running at once (zero means no
/// limit). After the first failure no new command is started unless
/// `config.keep_going` is set; commands already running always finish.
///
/// # Returns
///
/// A [`BuildReport`] with the outcome of every node in the graph.
pub async fn execute<R, F>(
  graph: &BuildGraph,
  vars: Arc<VariableStore>,
  runner: Arc<R>,
  fs: &F,
  config: &ExecuteConfig,
) -> BuildReport
where
  R: CommandRunner,
  F: Filesystem + ?Sized,
{
  info!(nodes = graph.len(), jobs = config.jobs, keep_going = config.keep_going, "starting build");

  let verdicts = StalenessEvaluator::new(graph, fs).evaluate_all();
  let mut scheduler = Scheduler::new(graph, verdicts, config);

  let mut join_set = JoinSet::new();
  let mut in_flight: HashMap<Id, NodeIndex> = HashMap::new();

  loop {
    scheduler.resolve_ready(&vars);

    while scheduler.has_capacity(in_flight.len())
      && let Some((idx, command)) = scheduler.runnable.pop_front()
    {
      let runner = runner.clone();
      let cwd = config.cwd.clone();
      let key = &graph.node(idx).key;
      info!(node = %key, command = %command, "running");
      scheduler.transition(idx, NodeState::Running);
      scheduler.dispatched.push(key.clone());

      let handle = join_set.spawn(async move {
        let status = runner.run(&command, &cwd).await;
        (command, status)
      });
      in_flight.insert(handle.id(), idx);
    }

    let Some(joined) = join_set.join_next_with_id().await else {
      break;
    };

    match joined {
      Ok((id, (command, status))) => {
        let Some(idx) = in_flight.remove(&id) else {
          continue;
        };
        scheduler.complete(idx, command, status, fs);
      }
      Err(e) => {
        // A panicking runner fails its node like a launch error.
        let Some(idx) = in_flight.remove(&e.id()) else {
          continue;
        };
        let cmd = scheduler.commands.remove(&idx).unwrap_or_default();
        scheduler.fail(
          idx,
          ExecuteError::Spawn {
            cmd,
            message: e.to_string(),
          },
        );
      }
    }
  }

  scheduler.finish()
}

/// List the commands a build would run, in dependency order, without running
/// anything.
///
/// # Errors
///
/// Returns the first missing source or unresolvable variable.
pub fn plan<F>(graph: &BuildGraph, vars: &VariableStore, fs: &F) -> Result<Vec<PlannedCommand>, ExecuteError>
where
  F: Filesystem + ?Sized,
{
  let verdicts = StalenessEvaluator::new(graph, fs).evaluate_all();
  let mut planned = Vec::new();

  for &idx in graph.topological_order() {
    let node = graph.node(idx);
    match verdict_of(&verdicts, idx)? {
      Staleness::UpToDate => {}
      Staleness::Stale => {
        if let Some(command) = render_node(&node.kind, vars)? {
          planned.push(PlannedCommand {
            key: node.key.clone(),
            command,
          });
        }
      }
    }
  }

  debug!(commands = planned.len(), "planned build");
  Ok(planned)
}

fn verdict_of(verdicts: &HashMap<NodeIndex, Verdict>, idx: NodeIndex) -> Result<Staleness, StalenessError> {
  // Every node gets a verdict; a missing one means nothing can be assumed.
  verdicts.get(&idx).cloned().unwrap_or(Ok(Staleness::Stale))
}

/// Coordinator-owned execution state.
struct Scheduler<'a> {
  graph: &'a BuildGraph,
  verdicts: HashMap<NodeIndex, Verdict>,
  jobs: usize,
  keep_going: bool,
  halted: bool,

  states: Vec<NodeState>,
  outcomes: HashMap<NodeIndex, NodeOutcome>,
  /// Dependencies of each node that have not succeeded yet.
  waiting_on: Vec<usize>,
  ready: VecDeque<NodeIndex>,
  runnable: VecDeque<(NodeIndex, String)>,
  commands: HashMap<NodeIndex, String>,
  dispatched: Vec<NodeKey>,
  first_failure: Option<NodeKey>,
}

impl<'a> Scheduler<'a> {
  fn new(graph: &'a BuildGraph, verdicts: HashMap<NodeIndex, Verdict>, config: &ExecuteConfig) -> Self {
    let len = graph.len();
    let mut waiting_on = vec![0; len];
    let mut ready = VecDeque::new();
    for &idx in graph.topological_order() {
      waiting_on[idx.index()] = graph.dependency_count(idx);
      if waiting_on[idx.index()] == 0 {
        ready.push_back(idx);
      }
    }

    let mut scheduler = Self {
      graph,
      verdicts,
      jobs: config.jobs,
      keep_going: config.keep_going,
      halted: false,
      states: vec![NodeState::Pending; len],
      outcomes: HashMap::new(),
      waiting_on,
      ready: VecDeque::new(),
      runnable: VecDeque::new(),
      commands: HashMap::new(),
      dispatched: Vec::new(),
      first_failure: None,
    };
    for idx in ready {
      scheduler.make_ready(idx);
    }
    scheduler
  }

  fn has_capacity(&self, running: usize) -> bool {
    !self.halted && (self.jobs == 0 || running < self.jobs)
  }

  /// Move a node between states. Terminal states are final.
  fn transition(&mut self, idx: NodeIndex, next: NodeState) -> bool {
    let current = self.states[idx.index()];
    if current.is_terminal() {
      error!(node = %self.graph.node(idx).key, ?current, ?next, "ignoring transition out of terminal state");
      return false;
    }
    self.states[idx.index()] = next;
    true
  }

  fn make_ready(&mut self, idx: NodeIndex) {
    if self.transition(idx, NodeState::Ready) {
      self.ready.push_back(idx);
    }
  }

  /// Settle every ready node that does not need a command, and queue the
  /// rest for dispatch.
  fn resolve_ready(&mut self, vars: &VariableStore) {
    while let Some(idx) = self.ready.pop_front() {
      if self.states[idx.index()] != NodeState::Ready {
        continue;
      }
      let graph = self.graph;
      let node = graph.node(idx);

      let verdict = match verdict_of(&self.verdicts, idx) {
        Ok(verdict) => verdict,
        Err(e) => {
          self.fail(idx, e.into());
          continue;
        }
      };
      if verdict == Staleness::UpToDate {
        debug!(node = %node.key, "up to date");
        self.succeed(idx, NodeOutcome::UpToDate);
        continue;
      }

      match render_node(&node.kind, vars) {
        Ok(None) => self.succeed(idx, NodeOutcome::NoCommand),
        Ok(Some(command)) => {
          self.commands.insert(idx, command.clone());
          self.runnable.push_back((idx, command));
        }
        Err(e) => self.fail(idx, e.into()),
      }
    }

    if self.halted {
      for (idx, _) in std::mem::take(&mut self.runnable) {
        self.skip(idx, SkipReason::BuildHalted);
      }
    }
  }

  /// Handle a finished command.
  fn complete<F>(&mut self, idx: NodeIndex, command: String, status: std::io::Result<CmdStatus>, fs: &F)
  where
    F: Filesystem + ?Sized,
  {
    self.commands.remove(&idx);
    let status = match status {
      Ok(status) => status,
      Err(e) => {
        self.fail(
          idx,
          ExecuteError::Spawn {
            cmd: command,
            message: e.to_string(),
          },
        );
        return;
      }
    };
    if !status.success() {
      self.fail(
        idx,
        ExecuteError::CmdFailed {
          cmd: command,
          code: status.code,
        },
      );
      return;
    }

    let graph = self.graph;
    if let NodeKind::File(target) = &graph.node(idx).kind {
      let path = target.output();
      match fs.modified(path) {
        Ok(Some(_)) => {}
        Ok(None) => {
          self.fail(
            idx,
            ExecuteError::OutputMissing {
              path: path.to_path_buf(),
            },
          );
          return;
        }
        Err(e) => {
          self.fail(
            idx,
            StalenessError::Stat {
              path: path.to_path_buf(),
              message: e.to_string(),
            }
            .into(),
          );
          return;
        }
      }
    }

    self.succeed(idx, NodeOutcome::Executed { command });
  }

  fn succeed(&mut self, idx: NodeIndex, outcome: NodeOutcome) {
    if !self.transition(idx, NodeState::Succeeded) {
      return;
    }
    self.outcomes.insert(idx, outcome);

    let dependents: Vec<NodeIndex> = self.graph.dependents(idx).collect();
    for dependent in dependents {
      let waiting = &mut self.waiting_on[dependent.index()];
      *waiting = waiting.saturating_sub(1);
      if *waiting == 0 && self.states[dependent.index()] == NodeState::Pending {
        self.make_ready(dependent);
      }
    }
  }

  fn fail(&mut self, idx: NodeIndex, err: ExecuteError) {
    if !self.transition(idx, NodeState::Failed) {
      return;
    }
    let key = self.graph.node(idx).key.clone();
    error!(node = %key, error = %err, "node failed");
    self.outcomes.insert(idx, NodeOutcome::Failed { error: err });

    if self.first_failure.is_none() {
      self.first_failure = Some(key.clone());
    }
    if !self.keep_going && !self.halted {
      info!("halting build after failure");
      self.halted = true;
    }

    // Everything downstream can never become ready.
    let mut stack: Vec<NodeIndex> = self.graph.dependents(idx).collect();
    while let Some(next) = stack.pop() {
      if self.states[next.index()].is_terminal() {
        continue;
      }
      self.skip(next, SkipReason::DependencyFailed(key.clone()));
      stack.extend(self.graph.dependents(next));
    }
  }

  fn skip(&mut self, idx: NodeIndex, reason: SkipReason) {
    if !self.transition(idx, NodeState::Skipped) {
      return;
    }
    warn!(node = %self.graph.node(idx).key, %reason, "skipping");
    self.outcomes.insert(idx, NodeOutcome::Skipped { reason });
  }

  /// Close out the run: anything still not terminal was never reached
  /// because the build halted.
  fn finish(mut self) -> BuildReport {
    for &idx in self.graph.topological_order() {
      if !self.states[idx.index()].is_terminal() {
        self.skip(idx, SkipReason::BuildHalted);
      }
    }

    let nodes: Vec<NodeReport> = self
      .graph
      .topological_order()
      .iter()
      .filter_map(|idx| {
        let outcome = self.outcomes.remove(idx)?;
        Some(NodeReport {
          key: self.graph.node(*idx).key.clone(),
          outcome,
        })
      })
      .collect();

    let report = BuildReport {
      nodes,
      dispatched: self.dispatched,
      first_failure: self.first_failure,
    };

    info!(
      executed = report.executed(),
      up_to_date = report.up_to_date(),
      failed = report.failed(),
      skipped = report.skipped().count(),
      "build complete"
    );
    report
  }
}
