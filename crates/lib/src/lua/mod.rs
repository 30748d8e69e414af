//! Lua front end for build descriptions.
//!
//! A build description is a Lua file (`mk.lua` by default) that declares
//! targets through the `mk` global and returns the phony targets that can be
//! invoked from the command line.
//!
//! # Submodules
//!
//! - [`globals`] - The `mk` table (`mk.target{}`, `mk.phony{}`, `mk.set`, ...)
//! - [`helpers`] - Helper tables exposed to build descriptions
//! - [`runtime`] - Lua VM creation and file loading
//! - [`targets`] - Target handles and `depends` conversion

pub mod globals;
pub mod helpers;
pub mod runtime;
pub mod targets;
