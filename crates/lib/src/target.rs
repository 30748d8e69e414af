//! Declarative build targets.
//!
//! Targets are immutable values. A build description creates them once,
//! shares them through [`Arc`], and hands the requested ones to
//! [`BuildGraph`](crate::graph::BuildGraph). No I/O happens here.
//!
//! ```
//! use std::sync::Arc;
//! use mkgraph_lib::target::{PhonyTarget, Target};
//!
//! let obj = Arc::new(Target::new("build/a.o", "$CC -c $SRC -o $OUTPUT").bind("SRC", "src/a.c"));
//! let exe = Arc::new(Target::new("build/prog", "$CC $OBJS -o $OUTPUT").bind("OBJS", vec![obj.clone()]));
//! let build = PhonyTarget::new("build").help("Build the binary").depend(&exe);
//! assert_eq!(build.depends().len(), 1);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Binding name used for output paths in command templates.
pub const OUTPUT_VAR: &str = "OUTPUT";

/// A thing a target can depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
  /// A file produced by another target.
  Target(Arc<Target>),
  /// A named, file-less target.
  Phony(Arc<PhonyTarget>),
  /// A plain path on disk that is not built by this node.
  Source(PathBuf),
}

impl Dependency {
  /// The string substituted for this dependency in a command template.
  pub fn render(&self) -> String {
    match self {
      Dependency::Target(t) => t.output.display().to_string(),
      Dependency::Phony(p) => p.name.clone(),
      Dependency::Source(path) => path.display().to_string(),
    }
  }
}

impl fmt::Display for Dependency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.render())
  }
}

impl From<Arc<Target>> for Dependency {
  fn from(target: Arc<Target>) -> Self {
    Dependency::Target(target)
  }
}

impl From<&Arc<Target>> for Dependency {
  fn from(target: &Arc<Target>) -> Self {
    Dependency::Target(target.clone())
  }
}

impl From<Target> for Dependency {
  fn from(target: Target) -> Self {
    Dependency::Target(Arc::new(target))
  }
}

impl From<Arc<PhonyTarget>> for Dependency {
  fn from(phony: Arc<PhonyTarget>) -> Self {
    Dependency::Phony(phony)
  }
}

impl From<&Arc<PhonyTarget>> for Dependency {
  fn from(phony: &Arc<PhonyTarget>) -> Self {
    Dependency::Phony(phony.clone())
  }
}

impl From<PhonyTarget> for Dependency {
  fn from(phony: PhonyTarget) -> Self {
    Dependency::Phony(Arc::new(phony))
  }
}

impl From<PathBuf> for Dependency {
  fn from(path: PathBuf) -> Self {
    Dependency::Source(path)
  }
}

impl From<&Path> for Dependency {
  fn from(path: &Path) -> Self {
    Dependency::Source(path.to_path_buf())
  }
}

impl From<&str> for Dependency {
  fn from(path: &str) -> Self {
    Dependency::Source(PathBuf::from(path))
  }
}

/// A dependency value as written by the caller: one item or a (possibly
/// nested) sequence of items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependsValue {
  One(Dependency),
  Many(Vec<DependsValue>),
}

impl DependsValue {
  /// Flatten nested sequences into a single ordered list.
  pub fn flatten(self) -> Vec<Dependency> {
    let mut out = Vec::new();
    self.flatten_into(&mut out);
    out
  }

  fn flatten_into(self, out: &mut Vec<Dependency>) {
    match self {
      DependsValue::One(dep) => out.push(dep),
      DependsValue::Many(items) => {
        for item in items {
          item.flatten_into(out);
        }
      }
    }
  }
}

impl<T: Into<DependsValue>> From<Vec<T>> for DependsValue {
  fn from(items: Vec<T>) -> Self {
    DependsValue::Many(items.into_iter().map(Into::into).collect())
  }
}

impl From<Dependency> for DependsValue {
  fn from(dep: Dependency) -> Self {
    DependsValue::One(dep)
  }
}

impl From<Arc<Target>> for DependsValue {
  fn from(target: Arc<Target>) -> Self {
    DependsValue::One(target.into())
  }
}

impl From<&Arc<Target>> for DependsValue {
  fn from(target: &Arc<Target>) -> Self {
    DependsValue::One(target.into())
  }
}

impl From<Target> for DependsValue {
  fn from(target: Target) -> Self {
    DependsValue::One(target.into())
  }
}

impl From<Arc<PhonyTarget>> for DependsValue {
  fn from(phony: Arc<PhonyTarget>) -> Self {
    DependsValue::One(phony.into())
  }
}

impl From<&Arc<PhonyTarget>> for DependsValue {
  fn from(phony: &Arc<PhonyTarget>) -> Self {
    DependsValue::One(phony.into())
  }
}

impl From<PhonyTarget> for DependsValue {
  fn from(phony: PhonyTarget) -> Self {
    DependsValue::One(phony.into())
  }
}

impl From<PathBuf> for DependsValue {
  fn from(path: PathBuf) -> Self {
    DependsValue::One(path.into())
  }
}

impl From<&Path> for DependsValue {
  fn from(path: &Path) -> Self {
    DependsValue::One(path.into())
  }
}

impl From<&str> for DependsValue {
  fn from(path: &str) -> Self {
    DependsValue::One(path.into())
  }
}

/// A group of dependencies sharing one binding name.
///
/// Anonymous groups (`name == None`) order the build but are not available as
/// command variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependsGroup {
  pub name: Option<String>,
  pub items: Vec<Dependency>,
}

/// Ordered binding-name -> dependencies mapping shared by both target kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Depends {
  groups: Vec<DependsGroup>,
}

impl Depends {
  /// Append to the group called `name`, creating it on first use.
  fn push(&mut self, name: Option<String>, value: DependsValue) {
    let items = value.flatten();
    match self.groups.iter_mut().find(|g| g.name == name) {
      Some(group) => group.items.extend(items),
      None => self.groups.push(DependsGroup { name, items }),
    }
  }

  pub fn groups(&self) -> &[DependsGroup] {
    &self.groups
  }

  /// Items bound to `name`, if any.
  pub fn get(&self, name: &str) -> Option<&[Dependency]> {
    self
      .groups
      .iter()
      .find(|g| g.name.as_deref() == Some(name))
      .map(|g| g.items.as_slice())
  }

  /// All dependencies with their binding names, in declaration order.
  pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &Dependency)> {
    self
      .groups
      .iter()
      .flat_map(|g| g.items.iter().map(move |d| (g.name.as_deref(), d)))
  }

  pub fn len(&self) -> usize {
    self.groups.iter().map(|g| g.items.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A unit of work producing exactly one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
  output: PathBuf,
  command: String,
  depends: Depends,
}

impl Target {
  pub fn new(output: impl Into<PathBuf>, command: impl Into<String>) -> Self {
    Self {
      output: output.into(),
      command: command.into(),
      depends: Depends::default(),
    }
  }

  /// Add dependencies available in the command as `$NAME`.
  pub fn bind(mut self, name: impl Into<String>, value: impl Into<DependsValue>) -> Self {
    self.depends.push(Some(name.into()), value.into());
    self
  }

  /// Add dependencies that order the build without a binding name.
  pub fn depend(mut self, value: impl Into<DependsValue>) -> Self {
    self.depends.push(None, value.into());
    self
  }

  pub fn output(&self) -> &Path {
    &self.output
  }

  pub fn command(&self) -> &str {
    &self.command
  }

  pub fn depends(&self) -> &Depends {
    &self.depends
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.output.display())
  }
}

/// A named, file-less target: an alias for other targets and/or a command
/// that runs on every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonyTarget {
  name: String,
  help: Option<String>,
  command: Option<String>,
  depends: Depends,
}

impl PhonyTarget {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      help: None,
      command: None,
      depends: Depends::default(),
    }
  }

  pub fn help(mut self, help: impl Into<String>) -> Self {
    self.help = Some(help.into());
    self
  }

  pub fn command(mut self, command: impl Into<String>) -> Self {
    self.command = Some(command.into());
    self
  }

  pub fn bind(mut self, name: impl Into<String>, value: impl Into<DependsValue>) -> Self {
    self.depends.push(Some(name.into()), value.into());
    self
  }

  pub fn depend(mut self, value: impl Into<DependsValue>) -> Self {
    self.depends.push(None, value.into());
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn help_text(&self) -> Option<&str> {
    self.help.as_deref()
  }

  pub fn cmd(&self) -> Option<&str> {
    self.command.as_deref()
  }

  pub fn depends(&self) -> &Depends {
    &self.depends
  }
}

impl fmt::Display for PhonyTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)
  }
}
