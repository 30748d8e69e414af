use std::path::{Component, Path, PathBuf};

use mlua::Lua;
use mlua::prelude::*;

/// Create the `mk.path` table with pure path arithmetic. Nothing here
/// touches the filesystem.
pub fn create_path_helpers(lua: &Lua) -> LuaResult<LuaTable> {
  let path = lua.create_table()?;

  // mk.path.join(...) - Join multiple path segments
  path.set(
    "join",
    lua.create_function(|_, segments: LuaMultiValue| {
      let mut result = PathBuf::new();
      for segment in segments {
        match segment {
          LuaValue::String(s) => result.push(&*s.to_str()?),
          other => {
            return Err(LuaError::external(format!(
              "mk.path.join expects strings, got {}",
              other.type_name()
            )));
          }
        }
      }
      Ok(result.to_string_lossy().into_owned())
    })?,
  )?;

  // mk.path.dirname(path) - Parent directory, "" at the top
  path.set(
    "dirname",
    lua.create_function(|_, path_str: String| {
      Ok(
        Path::new(&path_str)
          .parent()
          .map(|p| p.to_string_lossy().into_owned())
          .unwrap_or_default(),
      )
    })?,
  )?;

  // mk.path.basename(path) - File name with extension
  path.set(
    "basename",
    lua.create_function(|_, path_str: String| {
      Ok(
        Path::new(&path_str)
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or_default(),
      )
    })?,
  )?;

  // mk.path.stem(path) - File name without its last extension
  path.set(
    "stem",
    lua.create_function(|_, path_str: String| {
      Ok(
        Path::new(&path_str)
          .file_stem()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or_default(),
      )
    })?,
  )?;

  // mk.path.extname(path) - Extension including the dot, "" if none
  path.set(
    "extname",
    lua.create_function(|_, path_str: String| {
      Ok(
        Path::new(&path_str)
          .extension()
          .map(|e| format!(".{}", e.to_string_lossy()))
          .unwrap_or_default(),
      )
    })?,
  )?;

  // mk.path.with_extension(path, ext) - Replace the extension ("" removes it)
  path.set(
    "with_extension",
    lua.create_function(|_, (path_str, ext): (String, String)| {
      let ext = ext.strip_prefix('.').unwrap_or(&ext);
      Ok(Path::new(&path_str).with_extension(ext).to_string_lossy().into_owned())
    })?,
  )?;

  // mk.path.normalize(path) - Resolve `.` and `..` lexically
  path.set(
    "normalize",
    lua.create_function(|_, path_str: String| {
      let mut normalized = PathBuf::new();
      for component in Path::new(&path_str).components() {
        match component {
          Component::ParentDir => {
            normalized.pop();
          }
          Component::CurDir => {}
          _ => normalized.push(component),
        }
      }
      Ok(normalized.to_string_lossy().into_owned())
    })?,
  )?;

  Ok(path)
}
