use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;

use crate::lua::globals;
use crate::vars::VariableStore;

/// Create a new Lua runtime with the `mk` global registered.
pub fn create_runtime(vars: Rc<RefCell<VariableStore>>) -> LuaResult<Lua> {
  let lua = Lua::new();
  globals::register_globals(&lua, vars)?;
  Ok(lua)
}

/// Load and execute a Lua file at the given path.
///
/// Sets `mk.dir` to the directory of the loaded file and lets `require` find
/// modules under its `lua/` subdirectory. Returns the value the file returns.
pub fn load_file(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let canonical_path = path
    .canonicalize()
    .map_err(|e| LuaError::external(format!("cannot canonicalize '{}': {}", path.display(), e)))?;
  let content = std::fs::read_to_string(&canonical_path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical_path.display(), e)))?;

  let dir = canonical_path.parent().unwrap_or(Path::new("")).to_path_buf();
  let mk = lua.globals().get::<LuaTable>("mk")?;
  mk.set("dir", dir.to_string_lossy().to_string())?;

  let package = lua.globals().get::<LuaTable>("package")?;
  let package_path = package.get::<String>("path")?;
  let lua_dir = dir.join("lua").to_string_lossy().replace('\\', "/");
  package.set("path", format!("{lua_dir}/?.lua;{lua_dir}/?/init.lua;{package_path}"))?;

  lua
    .load(&content)
    .set_name(format!("@{}", canonical_path.display()))
    .eval::<LuaValue>()
}
