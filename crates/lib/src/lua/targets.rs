//! Lua bindings for `mk.target{}` and `mk.phony{}`.
//!
//! This module provides:
//! - `TargetHandle` and `PhonyHandle` as LuaUserData wrapping shared targets
//! - `register_target_fns()` to register both constructors on the `mk` table
//! - Conversion from Lua `depends` values into [`DependsValue`]s

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use mlua::prelude::*;
use tracing::debug;

use crate::target::{DependsValue, PhonyTarget, Target};

/// A file target as seen from Lua.
#[derive(Debug, Clone)]
pub struct TargetHandle(pub Arc<Target>);

/// A phony target as seen from Lua.
#[derive(Debug, Clone)]
pub struct PhonyHandle(pub Arc<PhonyTarget>);

impl LuaUserData for TargetHandle {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    fields.add_field_method_get("output", |_, this| Ok(this.0.output().to_string_lossy().into_owned()));
    fields.add_field_method_get("cmd", |_, this| Ok(this.0.command().to_string()));
  }

  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_meta_method(mlua::MetaMethod::ToString, |_, this, ()| {
      Ok(this.0.output().to_string_lossy().into_owned())
    });
  }
}

impl LuaUserData for PhonyHandle {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    fields.add_field_method_get("name", |_, this| Ok(this.0.name().to_string()));
    fields.add_field_method_get("help", |_, this| Ok(this.0.help_text().map(str::to_string)));
    fields.add_field_method_get("cmd", |_, this| Ok(this.0.cmd().map(str::to_string)));
  }

  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_meta_method(mlua::MetaMethod::ToString, |_, this, ()| Ok(this.0.name().to_string()));
  }
}

/// Register `mk.target` and `mk.phony` on the given table.
pub fn register_target_fns(lua: &Lua, mk: &LuaTable) -> LuaResult<()> {
  let target = lua.create_function(|_, decl: LuaTable| {
    check_fields(&decl, "mk.target", &["output", "cmd", "depends"])?;

    let output: Option<String> = decl.get("output")?;
    let output = output.ok_or_else(|| LuaError::external("mk.target: 'output' is required"))?;
    let cmd: Option<String> = decl.get("cmd")?;
    let cmd = cmd.ok_or_else(|| LuaError::external(format!("mk.target '{output}': 'cmd' is required")))?;

    let mut target = Target::new(output, cmd);
    for (name, value) in parse_depends(decl.get("depends")?)? {
      target = match name {
        Some(name) => target.bind(name, value),
        None => target.depend(value),
      };
    }

    debug!(output = %target.output().display(), deps = target.depends().len(), "declared target");
    Ok(TargetHandle(Arc::new(target)))
  })?;
  mk.set("target", target)?;

  let phony = lua.create_function(|_, decl: LuaTable| {
    check_fields(&decl, "mk.phony", &["name", "help", "cmd", "depends"])?;

    let name: Option<String> = decl.get("name")?;
    let name = name.ok_or_else(|| LuaError::external("mk.phony: 'name' is required"))?;

    let mut phony = PhonyTarget::new(name);
    if let Some(help) = decl.get::<Option<String>>("help")? {
      phony = phony.help(help);
    }
    if let Some(cmd) = decl.get::<Option<String>>("cmd")? {
      phony = phony.command(cmd);
    }
    for (binding, value) in parse_depends(decl.get("depends")?)? {
      phony = match binding {
        Some(binding) => phony.bind(binding, value),
        None => phony.depend(value),
      };
    }

    debug!(name = %phony.name(), deps = phony.depends().len(), "declared phony target");
    Ok(PhonyHandle(Arc::new(phony)))
  })?;
  mk.set("phony", phony)?;

  Ok(())
}

/// Reject misspelled keys in a constructor table.
fn check_fields(decl: &LuaTable, func: &str, allowed: &[&str]) -> LuaResult<()> {
  for pair in decl.pairs::<LuaValue, LuaValue>() {
    let (key, _) = pair?;
    let known = match &key {
      LuaValue::String(s) => {
        let s = s.to_str()?;
        allowed.iter().any(|name| *name == &*s)
      }
      _ => false,
    };
    if !known {
      let key = key.to_string()?;
      return Err(LuaError::external(format!(
        "{func}: unknown field '{key}' (expected one of: {})",
        allowed.join(", ")
      )));
    }
  }
  Ok(())
}

/// Parse a `depends` field into (binding name, value) pairs.
///
/// Accepted shapes:
/// - a single handle or path string (anonymous)
/// - an array of those, nested arrays allowed (anonymous)
/// - a table mapping binding names to any of the above; its array part, if
///   any, is anonymous
pub fn parse_depends(value: LuaValue) -> LuaResult<Vec<(Option<String>, DependsValue)>> {
  match value {
    LuaValue::Nil => Ok(Vec::new()),
    LuaValue::Table(table) => {
      let mut anonymous = Vec::new();
      for item in table.sequence_values::<LuaValue>() {
        anonymous.push(lua_to_depends_value(item?)?);
      }

      // Sorted so the declaration is deterministic regardless of Lua's
      // table iteration order.
      let mut named = BTreeMap::new();
      for pair in table.pairs::<LuaValue, LuaValue>() {
        let (key, item) = pair?;
        match key {
          LuaValue::String(name) => {
            named.insert(name.to_str()?.to_string(), lua_to_depends_value(item)?);
          }
          LuaValue::Integer(_) => {}
          other => {
            return Err(LuaError::external(format!(
              "depends keys must be binding names, got {}",
              other.type_name()
            )));
          }
        }
      }

      let mut out = Vec::with_capacity(named.len() + 1);
      if !anonymous.is_empty() {
        out.push((None, DependsValue::Many(anonymous)));
      }
      out.extend(named.into_iter().map(|(name, value)| (Some(name), value)));
      Ok(out)
    }
    other => Ok(vec![(None, lua_to_depends_value(other)?)]),
  }
}

/// Convert one dependency value: a handle, a path string, or an array of
/// those.
pub fn lua_to_depends_value(value: LuaValue) -> LuaResult<DependsValue> {
  match value {
    LuaValue::String(s) => Ok(DependsValue::from(PathBuf::from(s.to_str()?.to_string()))),
    LuaValue::UserData(ud) => {
      if let Ok(target) = ud.borrow::<TargetHandle>() {
        return Ok(DependsValue::from(&target.0));
      }
      if let Ok(phony) = ud.borrow::<PhonyHandle>() {
        return Ok(DependsValue::from(&phony.0));
      }
      Err(LuaError::external("depends: userdata is not a target"))
    }
    LuaValue::Table(table) => {
      let mut items = Vec::new();
      for item in table.sequence_values::<LuaValue>() {
        items.push(lua_to_depends_value(item?)?);
      }
      Ok(DependsValue::Many(items))
    }
    other => Err(LuaError::external(format!(
      "depends: expected a target, a path string or an array, got {}",
      other.type_name()
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::Dependency;

  fn create_test_lua() -> LuaResult<Lua> {
    let lua = Lua::new();
    let mk = lua.create_table()?;
    register_target_fns(&lua, &mk)?;
    lua.globals().set("mk", mk)?;
    Ok(lua)
  }

  fn rendered(target: &Target, name: &str) -> Vec<String> {
    target
      .depends()
      .get(name)
      .unwrap_or_default()
      .iter()
      .map(Dependency::render)
      .collect()
  }

  mod target_fn {
    use super::*;

    #[test]
    fn creates_handle_with_fields() -> LuaResult<()> {
      let lua = create_test_lua()?;
      let (output, text): (String, String) = lua
        .load(
          r#"
          local t = mk.target{ output = "a.o", cmd = "cc -c $SRC -o $OUTPUT", depends = { SRC = "a.c" } }
          return t.output, tostring(t)
          "#,
        )
        .eval()?;
      assert_eq!(output, "a.o");
      assert_eq!(text, "a.o");
      Ok(())
    }

    #[test]
    fn named_and_anonymous_depends() -> LuaResult<()> {
      let lua = create_test_lua()?;
      let handle: LuaAnyUserData = lua
        .load(
          r#"
          local a = mk.target{ output = "a.o", cmd = "touch $OUTPUT" }
          local b = mk.target{ output = "b.o", cmd = "touch $OUTPUT" }
          return mk.target{
            output = "prog",
            cmd = "cc $OBJS -o $OUTPUT",
            depends = { "config.h", OBJS = { a, { b } } },
          }
          "#,
        )
        .eval()?;
      let target = handle.borrow::<TargetHandle>()?.0.clone();

      assert_eq!(rendered(&target, "OBJS"), vec!["a.o", "b.o"]);
      let anonymous: Vec<_> = target
        .depends()
        .iter()
        .filter(|(name, _)| name.is_none())
        .map(|(_, d)| d.render())
        .collect();
      assert_eq!(anonymous, vec!["config.h"]);
      Ok(())
    }

    #[test]
    fn single_value_depends_is_anonymous() -> LuaResult<()> {
      let lua = create_test_lua()?;
      let handle: LuaAnyUserData = lua
        .load(r#"return mk.target{ output = "x", cmd = "touch $OUTPUT", depends = "input.txt" }"#)
        .eval()?;
      let target = handle.borrow::<TargetHandle>()?.0.clone();
      assert_eq!(target.depends().len(), 1);
      assert_eq!(target.depends().groups()[0].name, None);
      Ok(())
    }

    #[test]
    fn missing_cmd_is_an_error() -> LuaResult<()> {
      let lua = create_test_lua()?;
      let err = lua.load(r#"return mk.target{ output = "a.o" }"#).exec().unwrap_err();
      assert!(err.to_string().contains("'cmd' is required"));
      Ok(())
    }

    #[test]
    fn unknown_field_is_an_error() -> LuaResult<()> {
      let lua = create_test_lua()?;
      let err = lua
        .load(r#"return mk.target{ output = "a.o", cmd = "x", depend = "a.c" }"#)
        .exec()
        .unwrap_err();
      assert!(err.to_string().contains("unknown field 'depend'"));
      Ok(())
    }

    #[test]
    fn bad_dependency_type_is_an_error() -> LuaResult<()> {
      let lua = create_test_lua()?;
      let err = lua
        .load(r#"return mk.target{ output = "a.o", cmd = "x", depends = { SRC = 42 } }"#)
        .exec()
        .unwrap_err();
      assert!(err.to_string().contains("expected a target, a path string or an array"));
      Ok(())
    }
  }

  mod phony_fn {
    use super::*;

    #[test]
    fn creates_handle_with_fields() -> LuaResult<()> {
      let lua = create_test_lua()?;
      let (name, help, cmd): (String, Option<String>, Option<String>) = lua
        .load(
          r#"
          local p = mk.phony{ name = "lint", help = "Lint all files", cmd = "ruff check $FILES" }
          return p.name, p.help, p.cmd
          "#,
        )
        .eval()?;
      assert_eq!(name, "lint");
      assert_eq!(help.as_deref(), Some("Lint all files"));
      assert_eq!(cmd.as_deref(), Some("ruff check $FILES"));
      Ok(())
    }

    #[test]
    fn depends_on_target_handle() -> LuaResult<()> {
      let lua = create_test_lua()?;
      let handle: LuaAnyUserData = lua
        .load(
          r#"
          local exe = mk.target{ output = "prog", cmd = "touch $OUTPUT" }
          return mk.phony{ name = "build", depends = exe }
          "#,
        )
        .eval()?;
      let phony = handle.borrow::<PhonyHandle>()?.0.clone();
      let deps: Vec<_> = phony.depends().iter().map(|(_, d)| d.clone()).collect();
      assert!(matches!(deps.as_slice(), [Dependency::Target(t)] if t.output() == std::path::Path::new("prog")));
      Ok(())
    }

    #[test]
    fn missing_name_is_an_error() -> LuaResult<()> {
      let lua = create_test_lua()?;
      let err = lua.load(r#"return mk.phony{ help = "x" }"#).exec().unwrap_err();
      assert!(err.to_string().contains("'name' is required"));
      Ok(())
    }
  }
}
