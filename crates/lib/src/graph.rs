//! Build graph assembly and validation.
//!
//! The graph is built once from the requested top-level targets by walking
//! their `depends` transitively. Nodes are keyed by output path (file
//! targets), name (phony targets) or path (sources), and stored in a
//! `petgraph` DAG with edges pointing from a dependency to its dependent.
//!
//! Validation happens here, before anything runs:
//! - two different targets with the same output path are rejected;
//! - two different phony targets with the same name are rejected;
//! - cycles are rejected with the offending node sequence.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::target::{Dependency, PhonyTarget, Target};

/// Errors raised while assembling the graph. None of these leave partial
/// state behind: nothing has been built yet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("dependency cycle detected: {}", format_cycle(.0))]
  Cycle(Vec<NodeKey>),

  #[error("output '{}' is declared by more than one target", .0.display())]
  DuplicateOutput(PathBuf),

  #[error("target '{0}' defined multiple times")]
  DuplicateName(String),

  #[error("unknown target(s): {}", .0.join(" "))]
  UnknownTargets(Vec<String>),
}

fn format_cycle(keys: &[NodeKey]) -> String {
  keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
}

/// Identity of a node in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum NodeKey {
  /// A target, identified by its output path.
  File(PathBuf),
  /// A phony target, identified by its name.
  Phony(String),
  /// A plain source path.
  Source(PathBuf),
}

impl NodeKey {
  fn of(dep: &Dependency) -> Self {
    match dep {
      Dependency::Target(t) => NodeKey::File(t.output().to_path_buf()),
      Dependency::Phony(p) => NodeKey::Phony(p.name().to_string()),
      Dependency::Source(path) => NodeKey::Source(path.clone()),
    }
  }
}

impl fmt::Display for NodeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      NodeKey::File(path) | NodeKey::Source(path) => write!(f, "{}", path.display()),
      NodeKey::Phony(name) => f.write_str(name),
    }
  }
}

/// What a node is.
#[derive(Debug, Clone)]
pub enum NodeKind {
  File(Arc<Target>),
  Phony(Arc<PhonyTarget>),
  Source(PathBuf),
}

impl NodeKind {
  fn of(dep: &Dependency) -> Self {
    match dep {
      Dependency::Target(t) => NodeKind::File(t.clone()),
      Dependency::Phony(p) => NodeKind::Phony(p.clone()),
      Dependency::Source(path) => NodeKind::Source(path.clone()),
    }
  }

  /// The command template this node runs, if any.
  pub fn command(&self) -> Option<&str> {
    match self {
      NodeKind::File(t) => Some(t.command()),
      NodeKind::Phony(p) => p.cmd(),
      NodeKind::Source(_) => None,
    }
  }
}

/// A direct dependency edge with the binding name it was declared under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDependency {
  pub binding: Option<String>,
  pub node: NodeIndex,
}

/// A node in the build graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
  pub key: NodeKey,
  pub kind: NodeKind,
  /// Direct dependencies in declaration order, duplicates preserved.
  pub dependencies: Vec<NodeDependency>,
}

/// The validated dependency graph reachable from a set of requested targets.
pub struct BuildGraph {
  graph: DiGraph<GraphNode, ()>,
  index: HashMap<NodeKey, NodeIndex>,
  roots: Vec<NodeIndex>,
  order: Vec<NodeIndex>,
}

impl BuildGraph {
  /// Assemble and validate the graph for `requested`.
  pub fn new<I, D>(requested: I) -> Result<Self, GraphError>
  where
    I: IntoIterator<Item = D>,
    D: Into<Dependency>,
  {
    let mut collector = Collector::default();
    let mut root_keys = Vec::new();
    for dep in requested {
      let dep = dep.into();
      let key = collector.visit(&dep)?;
      if !root_keys.contains(&key) {
        root_keys.push(key);
      }
    }

    let mut graph = DiGraph::new();
    let mut index = HashMap::new();
    let mut pending_edges = Vec::new();

    for pending in collector.nodes {
      if let NodeKey::Source(path) = &pending.key
        && collector.index.contains_key(&NodeKey::File(path.clone()))
      {
        debug!(path = %path.display(), "source path is produced by a target");
        continue;
      }
      let deps: Vec<(Option<String>, NodeKey)> = pending
        .deps
        .into_iter()
        .map(|(binding, key)| (binding, resolve_alias(key, &collector.index)))
        .collect();
      let idx = graph.add_node(GraphNode {
        key: pending.key.clone(),
        kind: pending.kind,
        dependencies: Vec::new(),
      });
      index.insert(pending.key, idx);
      pending_edges.push((idx, deps));
    }

    for (dependent, deps) in pending_edges {
      let mut resolved = Vec::with_capacity(deps.len());
      for (binding, key) in deps {
        let Some(&dep_idx) = index.get(&key) else {
          continue;
        };
        graph.update_edge(dep_idx, dependent, ());
        resolved.push(NodeDependency {
          binding,
          node: dep_idx,
        });
      }
      graph[dependent].dependencies = resolved;
    }

    let roots = root_keys
      .into_iter()
      .map(|key| resolve_alias(key, &collector.index))
      .filter_map(|key| index.get(&key).copied())
      .collect();

    let order = match toposort(&graph, None) {
      Ok(order) => order,
      Err(_) => {
        let cycle = find_cycle(&graph).into_iter().map(|idx| graph[idx].key.clone()).collect();
        return Err(GraphError::Cycle(cycle));
      }
    };

    debug!(nodes = graph.node_count(), edges = graph.edge_count(), "build graph assembled");

    Ok(Self {
      graph,
      index,
      roots,
      order,
    })
  }

  /// Nodes in an order where every dependency precedes its dependents.
  pub fn topological_order(&self) -> &[NodeIndex] {
    &self.order
  }

  /// The requested top-level nodes.
  pub fn roots(&self) -> &[NodeIndex] {
    &self.roots
  }

  pub fn node(&self, idx: NodeIndex) -> &GraphNode {
    &self.graph[idx]
  }

  pub fn find(&self, key: &NodeKey) -> Option<NodeIndex> {
    self.index.get(key).copied()
  }

  /// Direct dependencies of a node with binding names preserved.
  pub fn dependencies(&self, idx: NodeIndex) -> &[NodeDependency] {
    &self.graph[idx].dependencies
  }

  /// Distinct direct dependents of a node.
  pub fn dependents(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
    self.graph.neighbors_directed(idx, Direction::Outgoing)
  }

  /// Number of distinct direct dependencies of a node.
  pub fn dependency_count(&self, idx: NodeIndex) -> usize {
    self.graph.neighbors_directed(idx, Direction::Incoming).count()
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }
}

/// A source path that some target produces is that target.
fn resolve_alias(key: NodeKey, index: &HashMap<NodeKey, usize>) -> NodeKey {
  if let NodeKey::Source(path) = &key {
    let file = NodeKey::File(path.clone());
    if index.contains_key(&file) {
      return file;
    }
  }
  key
}

#[derive(Default)]
struct Collector {
  nodes: Vec<PendingNode>,
  index: HashMap<NodeKey, usize>,
}

struct PendingNode {
  key: NodeKey,
  kind: NodeKind,
  deps: Vec<(Option<String>, NodeKey)>,
}

impl Collector {
  fn visit(&mut self, dep: &Dependency) -> Result<NodeKey, GraphError> {
    let key = NodeKey::of(dep);
    if let Some(&existing) = self.index.get(&key) {
      ensure_same(&self.nodes[existing].kind, dep)?;
      return Ok(key);
    }

    let slot = self.nodes.len();
    self.index.insert(key.clone(), slot);
    self.nodes.push(PendingNode {
      key: key.clone(),
      kind: NodeKind::of(dep),
      deps: Vec::new(),
    });

    let depends = match dep {
      Dependency::Target(t) => t.depends(),
      Dependency::Phony(p) => p.depends(),
      Dependency::Source(_) => return Ok(key),
    };

    let mut deps = Vec::with_capacity(depends.len());
    for (binding, child) in depends.iter() {
      let child_key = self.visit(child)?;
      deps.push((binding.map(str::to_string), child_key));
    }
    self.nodes[slot].deps = deps;

    Ok(key)
  }
}

/// Two declarations with the same key must be the same target.
fn ensure_same(existing: &NodeKind, dep: &Dependency) -> Result<(), GraphError> {
  match (existing, dep) {
    (NodeKind::File(a), Dependency::Target(b)) if !Arc::ptr_eq(a, b) && a != b => {
      Err(GraphError::DuplicateOutput(a.output().to_path_buf()))
    }
    (NodeKind::Phony(a), Dependency::Phony(b)) if !Arc::ptr_eq(a, b) && a != b => {
      Err(GraphError::DuplicateName(a.name().to_string()))
    }
    _ => Ok(()),
  }
}

/// Find one cycle, as a node sequence that starts and ends on the same node,
/// following "depends on" edges.
fn find_cycle(graph: &DiGraph<GraphNode, ()>) -> Vec<NodeIndex> {
  #[derive(Clone, Copy, PartialEq, Eq)]
  enum Mark {
    New,
    Active,
    Done,
  }

  fn visit(
    graph: &DiGraph<GraphNode, ()>,
    node: NodeIndex,
    marks: &mut [Mark],
    path: &mut Vec<NodeIndex>,
  ) -> Option<Vec<NodeIndex>> {
    marks[node.index()] = Mark::Active;
    path.push(node);
    for dep in graph.neighbors_directed(node, Direction::Incoming) {
      match marks[dep.index()] {
        Mark::Active => {
          let start = path.iter().position(|&n| n == dep).unwrap_or(0);
          let mut cycle = path[start..].to_vec();
          cycle.push(dep);
          return Some(cycle);
        }
        Mark::New => {
          if let Some(cycle) = visit(graph, dep, marks, path) {
            return Some(cycle);
          }
        }
        Mark::Done => {}
      }
    }
    path.pop();
    marks[node.index()] = Mark::Done;
    None
  }

  let mut marks = vec![Mark::New; graph.node_count()];
  let mut path = Vec::new();
  for start in graph.node_indices() {
    if marks[start.index()] == Mark::New
      && let Some(cycle) = visit(graph, start, &mut marks, &mut path)
    {
      return cycle;
    }
  }
  Vec::new()
}

/// The top-level phony targets a build description exposes, by name.
#[derive(Debug, Clone, Default)]
pub struct Invocables {
  targets: Vec<Arc<PhonyTarget>>,
}

impl Invocables {
  pub fn new(targets: impl IntoIterator<Item = Arc<PhonyTarget>>) -> Result<Self, GraphError> {
    let mut unique: Vec<Arc<PhonyTarget>> = Vec::new();
    for target in targets {
      if let Some(existing) = unique.iter().find(|t| t.name() == target.name()) {
        if Arc::ptr_eq(existing, &target) {
          continue;
        }
        return Err(GraphError::DuplicateName(target.name().to_string()));
      }
      unique.push(target);
    }
    Ok(Self { targets: unique })
  }

  /// Look up every requested name, reporting all unknown ones at once.
  pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<PhonyTarget>>, GraphError> {
    let mut found = Vec::with_capacity(names.len());
    let mut unknown = Vec::new();
    for name in names {
      let name = name.as_ref();
      match self.get(name) {
        Some(target) => found.push(target.clone()),
        None => unknown.push(name.to_string()),
      }
    }
    if unknown.is_empty() {
      Ok(found)
    } else {
      Err(GraphError::UnknownTargets(unknown))
    }
  }

  pub fn get(&self, name: &str) -> Option<&Arc<PhonyTarget>> {
    self.targets.iter().find(|t| t.name() == name)
  }

  /// `(name, help)` pairs in declaration order.
  pub fn help_entries(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
    self.targets.iter().map(|t| (t.name(), t.help_text()))
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }
}
