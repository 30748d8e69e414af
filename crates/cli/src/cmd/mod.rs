mod build;
mod list;

pub use build::cmd_build;
pub use list::print_targets;
