//! Variable overrides through `-D`.

use super::common::TestEnv;

#[test]
fn build_file_default_is_used() {
  let env = TestEnv::from_fixture("vars.lua");
  env.mk_cmd().arg("show").assert().success();
  assert_eq!(env.read_file("msg.txt"), "default\n");
}

#[test]
fn override_beats_build_file_default() {
  let env = TestEnv::from_fixture("vars.lua");
  env.mk_cmd().args(["-D", "MSG=hello", "show"]).assert().success();
  assert_eq!(env.read_file("msg.txt"), "hello\n");
}

#[test]
fn override_without_value_is_empty() {
  let env = TestEnv::from_fixture("vars.lua");
  env.mk_cmd().args(["-D", "MSG", "show"]).assert().success();
  assert_eq!(env.read_file("msg.txt"), "\n");
}
