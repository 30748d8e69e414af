//! Build description evaluation.
//!
//! This module provides [`evaluate_build_file`], which runs a Lua build
//! description and collects the invocable targets it returns together with
//! the variables it set.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use mlua::prelude::*;
use tracing::{debug, info};

use crate::graph::{GraphError, Invocables};
use crate::lua::runtime;
use crate::lua::targets::PhonyHandle;
use crate::target::PhonyTarget;
use crate::vars::VariableStore;

/// Errors that can occur during build file evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  /// Lua evaluation error.
  #[error("lua error: {0}")]
  Lua(#[from] LuaError),

  /// The invocable targets collide.
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// The file did not return a list of phony targets.
  #[error("build file must return a list of mk.phony targets: {0}")]
  InvalidReturn(String),
}

/// Everything a build description produced.
#[derive(Debug)]
pub struct BuildDescription {
  /// Targets that can be named on the command line.
  pub invocables: Invocables,
  /// Overrides plus the defaults the file set.
  pub vars: VariableStore,
}

/// Evaluate a Lua build description.
///
/// `vars` holds the external overrides; the file may add defaults to it with
/// `mk.set`. The file must return an array of `mk.phony{}` handles.
///
/// # Example
/// ```ignore
/// use std::path::Path;
/// use mkgraph_lib::eval::evaluate_build_file;
/// use mkgraph_lib::vars::VariableStore;
///
/// let desc = evaluate_build_file(Path::new("mk.lua"), VariableStore::new())?;
/// for (name, help) in desc.invocables.help_entries() {
///   println!("{name}  {}", help.unwrap_or(""));
/// }
/// ```
pub fn evaluate_build_file(path: &Path, vars: VariableStore) -> Result<BuildDescription, EvalError> {
  let vars = Rc::new(RefCell::new(vars));

  // The runtime holds clones of `vars`; drop it before unwrapping.
  let phonies = {
    let lua = runtime::create_runtime(vars.clone())?;
    let returned = runtime::load_file(&lua, path)?;
    collect_phonies(returned)?
  };

  let invocables = Invocables::new(phonies)?;
  let vars = Rc::try_unwrap(vars)
    .map(RefCell::into_inner)
    .unwrap_or_else(|shared| shared.borrow().clone());

  info!(path = %path.display(), targets = invocables.len(), vars = vars.len(), "evaluated build file");
  Ok(BuildDescription { invocables, vars })
}

fn collect_phonies(returned: LuaValue) -> Result<Vec<Arc<PhonyTarget>>, EvalError> {
  let table = match returned {
    LuaValue::Table(table) => table,
    other => return Err(EvalError::InvalidReturn(format!("got {}", other.type_name()))),
  };

  let mut phonies = Vec::new();
  for (i, item) in table.sequence_values::<LuaValue>().enumerate() {
    match item? {
      LuaValue::UserData(ud) => match ud.borrow::<PhonyHandle>() {
        Ok(handle) => phonies.push(handle.0.clone()),
        Err(_) => {
          return Err(EvalError::InvalidReturn(format!(
            "entry {} is not a phony target",
            i + 1
          )));
        }
      },
      other => {
        return Err(EvalError::InvalidReturn(format!(
          "entry {} is a {}",
          i + 1,
          other.type_name()
        )));
      }
    }
  }
  if phonies.is_empty() {
    return Err(EvalError::InvalidReturn("empty target list".to_string()));
  }

  debug!(count = phonies.len(), "collected invocable targets");
  Ok(phonies)
}
