//! Listing of invocable targets, shown when `mk` runs without targets.

use anyhow::Result;
use clap::CommandFactory;
use serde::Serialize;

use mkgraph_lib::graph::Invocables;

use crate::Cli;
use crate::output::{OutputFormat, print_json};

#[derive(Debug, Serialize)]
struct TargetEntry<'a> {
  name: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  help: Option<&'a str>,
}

pub fn print_targets(invocables: &Invocables, format: OutputFormat) -> Result<()> {
  if format.is_json() {
    #[derive(Serialize)]
    struct ListOutput<'a> {
      targets: Vec<TargetEntry<'a>>,
    }

    let targets = invocables
      .help_entries()
      .map(|(name, help)| TargetEntry { name, help })
      .collect();
    return print_json(&ListOutput { targets });
  }

  println!("{}", Cli::command().render_usage());
  println!();
  print!("{}", format_targets(invocables));
  Ok(())
}

/// `Targets:` followed by one aligned `name  help` line per target.
fn format_targets(invocables: &Invocables) -> String {
  let width = invocables.help_entries().map(|(name, _)| name.len()).max().unwrap_or(0);
  let mut out = String::from("Targets:\n");
  for (name, help) in invocables.help_entries() {
    match help {
      Some(help) => out.push_str(&format!("  {name:<width$}  {help}\n")),
      None => out.push_str(&format!("  {name}\n")),
    }
  }
  out
}
