//! Command template parsing and variable substitution.
//!
//! Command templates reference variables with `$NAME`, `$(NAME)` or
//! `${NAME}`, where a name is made of ASCII letters, digits and underscores.
//! Rendering is plain string substitution: the result is handed to the shell
//! verbatim.
//!
//! # Lookup order
//!
//! 1. `OUTPUT`, the output path of a file target;
//! 2. a binding name from the target's own `depends`, rendered as the
//!    space-joined list of its items;
//! 3. the global [`VariableStore`].
//!
//! # Escaping
//!
//! `$$` renders a single literal `$`. A `$` that does not start a variable
//! reference is kept as is, so shell syntax such as `$(git rev-parse HEAD)`
//! or `${HOME:-/tmp}` reaches the shell untouched.
//!
//! # Example
//!
//! ```
//! use mkgraph_lib::render::{parse, Segment};
//!
//! let segments = parse("cc -c $SRC -o ${OUTPUT}");
//! assert_eq!(segments, vec![
//!     Segment::Literal("cc -c ".to_string()),
//!     Segment::Variable("SRC".to_string()),
//!     Segment::Literal(" -o ".to_string()),
//!     Segment::Variable("OUTPUT".to_string()),
//! ]);
//! ```

use std::borrow::Cow;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::graph::NodeKind;
use crate::target::{Dependency, Depends, OUTPUT_VAR, PhonyTarget, Target};
use crate::vars::VariableStore;

/// A segment of parsed template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text, with `$$` already collapsed to `$`.
  Literal(String),

  /// A variable reference to be resolved.
  Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum RenderError {
  #[error("unset variable \"${0}\"")]
  UnresolvedVariable(String),
}

/// Source of variable values during rendering.
pub trait Resolver {
  fn resolve(&self, name: &str) -> Result<Cow<'_, str>, RenderError>;
}

fn is_name_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// Parse a template into literal and variable segments.
///
/// `$(NAME)` and `${NAME}` are references only when the closing bracket
/// directly follows the name; anything else stays literal text.
pub fn parse(input: &str) -> Vec<Segment> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek().map(|&(_, c)| c) {
      Some('$') => {
        chars.next();
        literal.push('$');
      }
      Some(open @ ('(' | '{')) => {
        let close = if open == '(' { ')' } else { '}' };
        // Name characters are ASCII, so byte offsets line up with chars here.
        let rest = &input[pos + 2..];
        let name_len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
        if name_len == 0 || !rest[name_len..].starts_with(close) {
          // Command substitution or parameter expansion: leave it to the shell.
          literal.push('$');
          continue;
        }

        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Variable(rest[..name_len].to_string()));

        let end = pos + 2 + name_len + 1;
        while chars.next_if(|&(i, _)| i < end).is_some() {}
      }
      Some(c) if is_name_char(c) => {
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        let mut name = String::new();
        while let Some((_, c)) = chars.next_if(|&(_, c)| is_name_char(c)) {
          name.push(c);
        }
        segments.push(Segment::Variable(name));
      }
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  segments
}

/// Parse and substitute in one step.
///
/// # Errors
///
/// Returns an error if any variable cannot be resolved.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, RenderError> {
  let segments = parse(input);
  substitute_segments(&segments, resolver)
}

/// Substitute variables in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, RenderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Variable(name) => result.push_str(&resolver.resolve(name)?),
    }
  }

  Ok(result)
}

/// Resolver for one target: its own bindings first, then global variables.
pub struct Bindings<'a> {
  output: Option<&'a Path>,
  depends: &'a Depends,
  vars: &'a VariableStore,
}

impl<'a> Bindings<'a> {
  pub fn for_target(target: &'a Target, vars: &'a VariableStore) -> Self {
    Self {
      output: Some(target.output()),
      depends: target.depends(),
      vars,
    }
  }

  /// Phony targets have no `OUTPUT`.
  pub fn for_phony(phony: &'a PhonyTarget, vars: &'a VariableStore) -> Self {
    Self {
      output: None,
      depends: phony.depends(),
      vars,
    }
  }
}

impl Resolver for Bindings<'_> {
  fn resolve(&self, name: &str) -> Result<Cow<'_, str>, RenderError> {
    if name == OUTPUT_VAR
      && let Some(output) = self.output
    {
      return Ok(output.to_string_lossy());
    }
    if let Some(items) = self.depends.get(name) {
      let joined = items.iter().map(Dependency::render).collect::<Vec<_>>().join(" ");
      return Ok(Cow::Owned(joined));
    }
    self
      .vars
      .get(name)
      .map(Cow::Borrowed)
      .ok_or_else(|| RenderError::UnresolvedVariable(name.to_string()))
  }
}

/// Render the command a node runs, or `None` if it has no command.
pub fn render_node(kind: &NodeKind, vars: &VariableStore) -> Result<Option<String>, RenderError> {
  match kind {
    NodeKind::File(t) => substitute(t.command(), &Bindings::for_target(t, vars)).map(Some),
    NodeKind::Phony(p) => match p.cmd() {
      Some(cmd) => substitute(cmd, &Bindings::for_phony(p, vars)).map(Some),
      None => Ok(None),
    },
    NodeKind::Source(_) => Ok(None),
  }
}
