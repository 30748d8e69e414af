//! Implementation of `mk [TARGET]...`.
//!
//! Evaluates the build description, assembles the graph for the requested
//! targets, and runs it.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::CommandFactory;
use tracing::{debug, info};

use mkgraph_lib::eval::evaluate_build_file;
use mkgraph_lib::execute::{ExecuteConfig, ShellRunner, execute, plan};
use mkgraph_lib::graph::{BuildGraph, GraphError};
use mkgraph_lib::staleness::StdFilesystem;
use mkgraph_lib::vars::{VariableStore, parse_override};

use super::print_targets;
use crate::Cli;
use crate::output::{print_error, print_json, print_plan, print_report};

/// Exit status for an unknown target name.
const EXIT_USAGE: u8 = 2;
/// Exit status after Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

pub fn cmd_build(cli: &Cli) -> Result<ExitCode> {
  let path = dunce::canonicalize(&cli.file)
    .with_context(|| format!("Build file not found: {}", cli.file.display()))?;
  let dir = path
    .parent()
    .with_context(|| format!("Build file has no parent directory: {}", path.display()))?
    .to_path_buf();
  std::env::set_current_dir(&dir).with_context(|| format!("Failed to enter directory: {}", dir.display()))?;
  debug!(dir = %dir.display(), "changed directory");

  let vars = VariableStore::with_overrides(cli.define.iter().map(|raw| parse_override(raw)));
  let desc = evaluate_build_file(&path, vars)
    .map_err(|err| anyhow::Error::msg(err.to_string()))
    .with_context(|| format!("Failed to evaluate build file: {}", path.display()))?;

  if cli.targets.is_empty() {
    print_targets(&desc.invocables, cli.format)?;
    return Ok(ExitCode::SUCCESS);
  }

  let requested = match desc.invocables.resolve(&cli.targets) {
    Ok(requested) => requested,
    Err(err @ GraphError::UnknownTargets(_)) => {
      print_error(&err.to_string());
      eprintln!("{}", Cli::command().render_usage());
      return Ok(ExitCode::from(EXIT_USAGE));
    }
    Err(err) => return Err(err.into()),
  };
  let graph = BuildGraph::new(requested).context("Invalid build graph")?;

  if cli.dry_run {
    let commands = plan(&graph, &desc.vars, &StdFilesystem).context("Failed to plan build")?;
    if cli.format.is_json() {
      print_json(&commands)?;
    } else {
      print_plan(&commands);
    }
    return Ok(ExitCode::SUCCESS);
  }

  let config = ExecuteConfig {
    jobs: cli.jobs,
    keep_going: cli.keep_going,
    shell: cli.shell.clone(),
    cwd: dir,
    // Keep stdout a single JSON document.
    echo: !cli.format.is_json(),
  };
  let runner = Arc::new(ShellRunner::from_config(&config));
  let vars = Arc::new(desc.vars);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let report = rt.block_on(async {
    tokio::select! {
      report = execute(&graph, vars, runner, &StdFilesystem, &config) => Some(report),
      _ = tokio::signal::ctrl_c() => None,
    }
  });
  let Some(report) = report else {
    eprintln!("mk: interrupt");
    return Ok(ExitCode::from(EXIT_INTERRUPTED));
  };
  info!(elapsed = ?started.elapsed(), "build finished");

  if cli.format.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report, started.elapsed());
  }

  Ok(if report.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}
