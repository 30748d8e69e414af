//! Process execution for rendered commands.
//!
//! Commands run through a shell in the build file's directory. They inherit
//! the caller's environment and standard streams, so compiler output goes
//! straight to the terminal.

use std::future::Future;
use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::execute::types::{CmdStatus, ExecuteConfig};

/// Runs one rendered command line and reports how it exited.
///
/// Implementations must be shareable across worker tasks.
pub trait CommandRunner: Send + Sync + 'static {
  /// Run `command` in `cwd`. An `Err` means the process could not be started.
  fn run(&self, command: &str, cwd: &Path) -> impl Future<Output = io::Result<CmdStatus>> + Send;
}

/// Runs commands with `<shell> -c <command>`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
  shell: String,
  args: Vec<String>,
  echo: bool,
}

impl ShellRunner {
  pub fn new(shell: Option<&str>) -> Self {
    let (shell, args) = get_shell(shell);
    Self { shell, args, echo: false }
  }

  pub fn from_config(config: &ExecuteConfig) -> Self {
    Self::new(config.shell.as_deref()).echo(config.echo)
  }

  /// Print each command line to stdout before running it.
  pub fn echo(mut self, echo: bool) -> Self {
    self.echo = echo;
    self
  }
}

impl Default for ShellRunner {
  fn default() -> Self {
    Self::new(None)
  }
}

impl CommandRunner for ShellRunner {
  async fn run(&self, command: &str, cwd: &Path) -> io::Result<CmdStatus> {
    if self.echo {
      println!("{command}");
    }
    debug!(shell = %self.shell, cwd = ?cwd, cmd = %command, "spawning process");

    let status = Command::new(&self.shell)
      .args(&self.args)
      .arg(command)
      .current_dir(cwd)
      .stdin(Stdio::inherit())
      .stdout(Stdio::inherit())
      .stderr(Stdio::inherit())
      .status()
      .await?;

    Ok(CmdStatus { code: status.code() })
  }
}

#[cfg(unix)]
const DEFAULT_SHELL: &str = "/bin/bash";
#[cfg(unix)]
const FALLBACK_SHELL: &str = "/bin/sh";

/// Get the shell command and arguments for the current platform.
///
/// An explicit shell gets the argument style its name suggests. Otherwise
/// Unix uses `/bin/bash -c`, falling back to `/bin/sh -c` where bash is not
/// installed, and Windows uses PowerShell.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    let shell = if Path::new(DEFAULT_SHELL).exists() {
      DEFAULT_SHELL
    } else {
      FALLBACK_SHELL
    };
    (shell.to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
