use predicates::prelude::*;

use super::common::{TestEnv, host};

#[test]
fn show_lists_every_platform_without_building() {
  let Some(host) = host() else { return };
  let env = TestEnv::with_project();
  env.fake_dist("1.80.0", host);

  let output = env
    .fanout_cmd()
    .args(["show", "-o", "json", "--source"])
    .arg(env.project_path())
    .output()
    .unwrap();

  assert!(output.status.success());
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["binary"], "hello");
  assert_eq!(json["fingerprint"].as_str().unwrap().len(), 64);

  let outputs = json["outputs"].as_object().unwrap();
  assert_eq!(outputs.len(), 4);
  let here = &outputs[&host.to_string()];
  assert_eq!(here["default"]["target_triple"], host.rust_triple());
  assert_eq!(here["static"]["target_triple"], host.musl_triple());
  assert_eq!(here["default"]["cached"], false);
  assert_ne!(here["default"]["descriptor_key"], here["static"]["descriptor_key"]);
  assert!(here["devShell"]["descriptor_key"].is_null());

  assert!(!env.store_path().join("build").exists());
}

#[test]
fn show_text_marks_unavailable_platforms() {
  let env = TestEnv::with_project();

  env
    .fanout_cmd()
    .args(["show", "--source"])
    .arg(env.project_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Binary: hello"))
    .stdout(predicate::str::contains("toolchain not found"));
}

#[test]
fn fingerprint_ignores_build_output() {
  let env = TestEnv::with_project();
  let fingerprint = || {
    let output = env
      .fanout_cmd()
      .args(["fingerprint", "--source"])
      .arg(env.project_path())
      .output()
      .unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap()
  };

  let before = fingerprint();
  env.write_file("project/target/release/hello", "binary");
  env.write_file("project/README.md", "# hello");
  assert_eq!(fingerprint(), before);

  env.write_file("project/src/lib.rs", "pub fn f() {}\n");
  assert_ne!(fingerprint(), before);
}

#[test]
fn fingerprint_verbose_lists_files() {
  let env = TestEnv::with_project();

  env
    .fanout_cmd()
    .args(["fingerprint", "-v", "--source"])
    .arg(env.project_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("src/main.rs"))
    .stdout(predicate::str::contains("Cargo.lock"));
}
