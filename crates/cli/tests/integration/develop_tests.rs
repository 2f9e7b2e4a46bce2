use predicates::prelude::*;

use super::common::{TestEnv, host};

#[test]
fn print_emits_a_sourceable_script() {
  let Some(host) = host() else { return };
  let env = TestEnv::with_project();
  env.fake_dist("1.80.0", host);
  env.write_file("project/fanout.toml", "[devshell]\ntools = [\"cargo-not-installed\"]\n");

  env
    .fanout_cmd()
    .args(["develop", "--print", "--shell", "bash", "--source"])
    .arg(env.project_path())
    .assert()
    .success()
    .stdout(predicate::str::starts_with("#!/usr/bin/env bash"))
    .stdout(predicate::str::contains("export RUST_SRC_PATH='"))
    .stdout(predicate::str::contains("export FANOUT_TOOLCHAIN='"))
    .stdout(predicate::str::contains("# cargo-not-installed not found on PATH"))
    .stderr(predicate::str::contains("cargo-not-installed not found on PATH"));
}

#[test]
fn dev_shell_does_not_need_a_successful_build() {
  let Some(host) = host() else { return };
  let env = TestEnv::with_project();
  env.fake_dist("1.80.0", host);
  env.write_file("project/src/main.rs", "fn main() { let x = ; }\n");
  env.write_file("project/fanout.toml", "[devshell]\ntools = []\n");

  env
    .fanout_cmd()
    .args(["develop", "--print", "--shell", "fish", "--source"])
    .arg(env.project_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("set -gx PATH '"));
}

#[cfg(unix)]
#[test]
fn command_runs_inside_the_environment() {
  let Some(host) = host() else { return };
  let env = TestEnv::with_project();
  env.fake_dist("1.80.0", host);
  env.write_file("project/fanout.toml", "[devshell]\ntools = []\n");

  env
    .fanout_cmd()
    .args(["develop", "-c", "echo \"$FANOUT_TOOLCHAIN\"", "--source"])
    .arg(env.project_path())
    .assert()
    .success()
    .stdout(predicate::str::contains(env.store_path().join("toolchain").display().to_string()));
}

#[test]
fn unavailable_platform_fails() {
  let env = TestEnv::with_project();

  env
    .fanout_cmd()
    .args(["develop", "--print", "--platform", "x86_64-darwin", "--source"])
    .arg(env.project_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to provision dev shell for x86_64-darwin"));
}

#[test]
fn unknown_shell_is_rejected() {
  let env = TestEnv::with_project();

  env
    .fanout_cmd()
    .args(["develop", "--print", "--shell", "powershell", "--source"])
    .arg(env.project_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("unsupported shell: powershell"));
}
