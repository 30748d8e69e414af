//! mkgraph-lib: declarative build orchestration
//!
//! This crate provides the pieces behind the `mk` command:
//! - `Target` / `PhonyTarget`: immutable build declarations
//! - `BuildGraph`: the validated dependency graph for a set of requested targets
//! - `StalenessEvaluator`: mtime-based rebuild decisions
//! - `execute`: bounded parallel execution with failure containment
//! - `eval`: the Lua front end that turns `mk.lua` into declarations

pub mod eval;
pub mod execute;
pub mod graph;
pub mod lua;
pub mod render;
pub mod staleness;
pub mod target;
pub mod vars;
