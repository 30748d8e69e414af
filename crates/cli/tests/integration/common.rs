//! Shared test helpers for CLI integration tests.

use std::fs::File;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated project directory with an `mk.lua`.
pub struct TestEnv {
  pub temp: TempDir,
  pub build_file: PathBuf,
}

impl TestEnv {
  /// Copy a fixture into a temporary `mk.lua`.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let build_file = temp.path().join("mk.lua");
    std::fs::write(&build_file, fixture_content(name)).unwrap();
    Self { temp, build_file }
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.temp.path().join(relative_path)).unwrap()
  }

  pub fn exists(&self, relative_path: &str) -> bool {
    self.temp.path().join(relative_path).exists()
  }

  /// Push a file's mtime into the future so it is newer than anything built.
  pub fn touch_later(&self, relative_path: &str) {
    let file = File::options()
      .write(true)
      .open(self.temp.path().join(relative_path))
      .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
  }

  /// `mk` running from the project directory.
  pub fn mk_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("mk");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
