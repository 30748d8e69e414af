//! Build execution through the CLI.

use predicates::prelude::*;

use super::common::TestEnv;

fn c_project() -> TestEnv {
  let env = TestEnv::from_fixture("c_project.lua");
  env.write_file("a.c", "A\n");
  env.write_file("b.c", "B\n");
  env
}

fn stdout_of(output: &std::process::Output) -> String {
  String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn builds_program_from_scratch() {
  let env = c_project();

  let output = env.mk_cmd().arg("all").assert().success().get_output().clone();
  let stdout = stdout_of(&output);

  let a = stdout.find("cat a.c > a.o").expect("a.o command echoed");
  let b = stdout.find("cat b.c > b.o").expect("b.o command echoed");
  let prog = stdout.find("cat a.o b.o > prog").expect("prog command echoed");
  assert!(a < prog && b < prog);
  assert_eq!(env.read_file("prog"), "A\nB\n");
}

#[test]
fn second_run_does_nothing() {
  let env = c_project();
  env.mk_cmd().arg("all").assert().success();

  env
    .mk_cmd()
    .arg("all")
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to do"))
    .stdout(predicate::str::contains("cat").not());
}

#[test]
fn touched_source_rebuilds_only_its_chain() {
  let env = c_project();
  env.mk_cmd().arg("all").assert().success();

  env.write_file("a.c", "A2\n");
  env.touch_later("a.c");

  let output = env.mk_cmd().arg("all").assert().success().get_output().clone();
  let stdout = stdout_of(&output);

  let a = stdout.find("cat a.c > a.o").expect("a.o rebuilt");
  let prog = stdout.find("cat a.o b.o > prog").expect("prog relinked");
  assert!(a < prog);
  assert!(!stdout.contains("cat b.c > b.o"));
  assert_eq!(env.read_file("prog"), "A2\nB\n");
}

#[test]
fn jobs_limit_still_builds_everything() {
  let env = c_project();
  env.mk_cmd().args(["-j", "1", "all"]).assert().success();
  assert_eq!(env.read_file("prog"), "A\nB\n");
}

#[test]
fn phony_command_always_runs() {
  let env = c_project();
  env.mk_cmd().arg("all").assert().success();

  env
    .mk_cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("rm -f a.o b.o prog"));
  assert!(!env.exists("prog"));
}

#[test]
fn dry_run_lists_commands_without_running() {
  let env = c_project();

  env
    .mk_cmd()
    .args(["-n", "all"])
    .assert()
    .success()
    .stdout(predicate::str::contains("cat a.c > a.o"))
    .stdout(predicate::str::contains("cat a.o b.o > prog"));
  assert!(!env.exists("a.o"));
  assert!(!env.exists("prog"));
}

#[test]
fn json_report() {
  let env = c_project();

  let output = env
    .mk_cmd()
    .args(["--format", "json", "all"])
    .assert()
    .success()
    .get_output()
    .clone();
  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

  let nodes = report["nodes"].as_array().unwrap();
  let prog = nodes
    .iter()
    .find(|n| n["key"]["kind"] == "file" && n["key"]["id"] == "prog")
    .unwrap();
  assert_eq!(prog["outcome"]["status"], "executed");
  assert_eq!(prog["outcome"]["command"], "cat a.o b.o > prog");
  assert!(report["first_failure"].is_null());
}

#[test]
fn missing_source_fails_build() {
  let env = TestEnv::from_fixture("c_project.lua");
  env.write_file("a.c", "A\n");

  env
    .mk_cmd()
    .arg("all")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("b.c"));
  assert!(!env.exists("prog"));
}

#[test]
fn failing_command_skips_dependents() {
  let env = TestEnv::from_fixture("failing.lua");

  env
    .mk_cmd()
    .args(["-k", "all"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("broken.o: command exited with status 3: exit 3"))
    .stderr(predicate::str::contains("skipped app: dependency 'broken.o' failed"));
  assert!(!env.exists("app"));
  // Independent work still ran under -k.
  assert_eq!(env.read_file("docs.html"), "docs\n");
}

#[test]
fn failing_command_halts_by_default() {
  let env = TestEnv::from_fixture("failing.lua");

  env
    .mk_cmd()
    .args(["-j", "1", "all"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("status 3"));
  assert!(!env.exists("app"));
}

#[test]
fn command_without_output_fails() {
  let env = TestEnv::from_fixture("missing_output.lua");

  env
    .mk_cmd()
    .arg("all")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("'never.txt' was not created"));
}

#[test]
fn cycle_is_rejected_before_running() {
  let env = TestEnv::from_fixture("cycle.lua");

  env
    .mk_cmd()
    .arg("all")
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependency cycle detected"))
    .stdout(predicate::str::contains("cp").not());
}

#[test]
fn build_file_flag_changes_directory() {
  let env = c_project();
  let elsewhere = tempfile::TempDir::new().unwrap();

  env
    .mk_cmd()
    .current_dir(elsewhere.path())
    .arg("-f")
    .arg(&env.build_file)
    .arg("all")
    .assert()
    .success();
  assert_eq!(env.read_file("prog"), "A\nB\n");
}

#[test]
fn shell_flag_selects_command_shell() {
  let env = TestEnv::from_fixture("c_project.lua");
  env.write_file(
    "mk.lua",
    r#"return { mk.phony{ name = "which", cmd = "echo $$0 > shell.txt" } }"#,
  );

  env.mk_cmd().args(["--shell", "/bin/sh", "which"]).assert().success();
  assert_eq!(env.read_file("shell.txt"), "/bin/sh\n");
}
