mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, print_error};

/// mk - Declarative build orchestration
#[derive(Parser, Debug)]
#[command(name = "mk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
  /// Build description to load
  #[arg(short, long, default_value = "mk.lua")]
  pub file: PathBuf,

  /// Maximum number of commands to run at once (0 = no limit)
  #[arg(short, long, default_value_t = 0)]
  pub jobs: usize,

  /// Set a variable, overriding the build file's default
  #[arg(short = 'D', value_name = "VAR[=VALUE]")]
  pub define: Vec<String>,

  /// Keep building independent targets after a failure
  #[arg(short, long)]
  pub keep_going: bool,

  /// Print the commands that would run without running them
  #[arg(short = 'n', long)]
  pub dry_run: bool,

  /// Shell used to run commands (default: bash, else /bin/sh)
  #[arg(long, value_name = "SHELL")]
  pub shell: Option<String>,

  /// Enable verbose output
  #[arg(short, long)]
  pub verbose: bool,

  /// Output format
  #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
  pub format: OutputFormat,

  /// Targets to build
  pub targets: Vec<String>,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cmd::cmd_build(&cli) {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}
