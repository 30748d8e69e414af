//! Terminal rendering of build results.
//!
//! Summary lines are built as `(Status, String)` pairs and only colored when
//! printed, so the wording can be tested without a terminal.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{AnsiColors, OwoColorize, Stream};

use mkgraph_lib::execute::{BuildReport, NodeOutcome, PlannedCommand};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Marker in front of a summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  /// Commands ran and the build succeeded.
  Built,
  /// Nothing needed to run.
  Idle,
  Failed,
  Skipped,
}

impl Status {
  fn symbol(self) -> &'static str {
    match self {
      Status::Built => "✓",
      Status::Idle => "•",
      Status::Failed => "✗",
      Status::Skipped => "⚠",
    }
  }

  fn color(self) -> AnsiColors {
    match self {
      Status::Built => AnsiColors::Green,
      Status::Idle => AnsiColors::Blue,
      Status::Failed => AnsiColors::Red,
      Status::Skipped => AnsiColors::Yellow,
    }
  }

  /// Problems go to stderr, everything else to stdout.
  fn is_problem(self) -> bool {
    matches!(self, Status::Failed | Status::Skipped)
  }
}

pub fn print_status(status: Status, message: &str) {
  let color = status.color();
  if status.is_problem() {
    eprintln!(
      "{} {}",
      status.symbol().if_supports_color(Stream::Stderr, |s| s.color(color)),
      message.if_supports_color(Stream::Stderr, |s| s.color(color))
    );
  } else {
    println!(
      "{} {message}",
      status.symbol().if_supports_color(Stream::Stdout, |s| s.color(color))
    );
  }
}

pub fn print_error(message: &str) {
  print_status(Status::Failed, message);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Print the commands a dry run would execute, one per line.
pub fn print_plan(commands: &[PlannedCommand]) {
  if commands.is_empty() {
    print_status(Status::Idle, NOTHING_TO_DO);
  }
  for planned in commands {
    println!("{}", planned.command);
  }
}

pub fn print_report(report: &BuildReport, elapsed: Duration) {
  for (status, line) in summary_lines(report, elapsed) {
    print_status(status, &line);
  }
}

const NOTHING_TO_DO: &str = "Nothing to do";

/// The first failure leads, then any later failures, then every skipped
/// node with its reason. A successful build gets a single line.
fn summary_lines(report: &BuildReport, elapsed: Duration) -> Vec<(Status, String)> {
  let Some((first_key, first_err)) = report.failure() else {
    let line = match report.executed() {
      0 => (Status::Idle, NOTHING_TO_DO.to_string()),
      run => (
        Status::Built,
        format!(
          "{run} command(s) run, {} up to date in {}",
          report.up_to_date(),
          format_elapsed(elapsed)
        ),
      ),
    };
    return vec![line];
  };

  let mut lines = vec![(Status::Failed, format!("{first_key}: {first_err}"))];
  for node in &report.nodes {
    if let NodeOutcome::Failed { error } = &node.outcome
      && &node.key != first_key
    {
      lines.push((Status::Failed, format!("{}: {error}", node.key)));
    }
  }
  for (key, reason) in report.skipped() {
    lines.push((Status::Skipped, format!("skipped {key}: {reason}")));
  }
  lines
}

/// Milliseconds under a second, seconds with two decimals above.
fn format_elapsed(elapsed: Duration) -> String {
  if elapsed < Duration::from_secs(1) {
    format!("{}ms", elapsed.as_millis())
  } else {
    format!("{:.2}s", elapsed.as_secs_f64())
  }
}
