//! Global Lua values and the `mk` table.
//!
//! This module registers the `mk` global table which provides:
//! - `mk.target{}` - Declare a file target
//! - `mk.phony{}` - Declare a phony target
//! - `mk.set{}` / `mk.set(name, value)` - Provide variable defaults
//! - `mk.get(name, default)` - Read a variable
//! - `mk.path` - Path manipulation utilities
//!
//! `mk.dir` is set per file by [`load_file`](super::runtime::load_file).

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;
use tracing::debug;

use super::helpers;
use super::targets::register_target_fns;
use crate::vars::VariableStore;

/// Register the `mk` global table in the Lua runtime.
pub fn register_globals(lua: &Lua, vars: Rc<RefCell<VariableStore>>) -> LuaResult<()> {
  let mk = lua.create_table()?;

  // Path utilities
  mk.set("path", helpers::path::create_path_helpers(lua)?)?;

  // mk.target{} and mk.phony{}
  register_target_fns(lua, &mk)?;

  // mk.set{ NAME = value, ... } or mk.set(NAME, value)
  let store = vars.clone();
  let set = lua.create_function(move |_, (first, second): (LuaValue, LuaValue)| {
    let mut store = store.borrow_mut();
    match (first, second) {
      (LuaValue::Table(defaults), LuaValue::Nil) => {
        for pair in defaults.pairs::<String, LuaValue>() {
          let (name, value) = pair?;
          let value = var_value(&name, value)?;
          let stored = store.set(name.clone(), value);
          debug!(var = %name, stored, "mk.set");
        }
        Ok(())
      }
      (LuaValue::String(name), value) => {
        let name = name.to_str()?.to_string();
        let value = var_value(&name, value)?;
        let stored = store.set(name.clone(), value);
        debug!(var = %name, stored, "mk.set");
        Ok(())
      }
      (other, _) => Err(LuaError::external(format!(
        "mk.set expects a table or a name and a value, got {}",
        other.type_name()
      ))),
    }
  })?;
  mk.set("set", set)?;

  // mk.get(NAME [, default])
  let store = vars;
  let get = lua.create_function(move |_, (name, default): (String, Option<String>)| {
    Ok(store.borrow().get(&name).map(str::to_string).or(default))
  })?;
  mk.set("get", get)?;

  lua.globals().set("mk", mk)?;

  Ok(())
}

/// Variables are strings; numbers are accepted and formatted the way Lua
/// prints them.
fn var_value(name: &str, value: LuaValue) -> LuaResult<String> {
  match value {
    LuaValue::String(s) => Ok(s.to_str()?.to_string()),
    LuaValue::Integer(i) => Ok(i.to_string()),
    LuaValue::Number(n) => Ok(n.to_string()),
    other => Err(LuaError::external(format!(
      "mk.set: value for '{name}' must be a string or a number, got {}",
      other.type_name()
    ))),
  }
}
