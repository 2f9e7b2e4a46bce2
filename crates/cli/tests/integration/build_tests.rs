use predicates::prelude::*;

use super::common::{TestEnv, host};

fn json_stdout(output: &std::process::Output) -> serde_json::Value {
  serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn build_outside_a_project_fails() {
  let env = TestEnv::empty();

  env
    .fanout_cmd()
    .arg("build")
    .arg("--source")
    .arg(env.temp.path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load project"));
}

#[test]
fn build_rejects_unsupported_platform() {
  let env = TestEnv::with_project();

  env
    .fanout_cmd()
    .args(["build", "--platform", "riscv64-linux", "--source"])
    .arg(env.project_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("unsupported platform: riscv64-linux"));
}

#[test]
fn missing_toolchain_fails_only_that_platform() {
  let Some(host) = host() else { return };
  let env = TestEnv::with_project();
  env.fake_dist("1.80.0", host);

  let output = env
    .fanout_cmd()
    .args(["build", "all", "--all-platforms", "--no-link", "-o", "json", "--source"])
    .arg(env.project_path())
    .output()
    .unwrap();

  assert!(!output.status.success());
  let json = json_stdout(&output);
  for platform in json.as_object().unwrap().keys() {
    let packages = &json[platform]["packages"];
    for name in ["default", "static"] {
      let kind = packages[name]["error"]["kind"].as_str().unwrap();
      if *platform == host.to_string() {
        // the fake distribution has no runnable cargo
        assert_eq!(kind, "build-failed");
      } else {
        assert_eq!(kind, "toolchain-not-found");
      }
    }
  }
  assert_eq!(json.as_object().unwrap().len(), 4);
}

#[test]
fn failed_build_reports_the_output_and_creates_no_link() {
  let Some(host) = host() else { return };
  let env = TestEnv::with_project();
  env.fake_dist("1.80.0", host);

  env
    .fanout_cmd()
    .args(["build", "--source"])
    .arg(env.project_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains(format!("{} default: build failed", host)))
    .stderr(predicate::str::contains("1 of 1 output(s) failed"));

  assert!(std::fs::symlink_metadata(env.project_path().join("result")).is_err());
  let tmp = env.store_path().join("tmp");
  assert!(!tmp.exists() || std::fs::read_dir(tmp).unwrap().count() == 0);
}
