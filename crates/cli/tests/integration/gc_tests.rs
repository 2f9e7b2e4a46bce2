use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn gc_with_no_store_succeeds() {
  let env = TestEnv::empty();

  env
    .fanout_cmd()
    .arg("gc")
    .assert()
    .success()
    .stdout(predicate::str::contains("Garbage collection complete"));
}

#[test]
fn gc_dry_run_shows_what_would_be_removed() {
  let env = TestEnv::empty();
  env.write_file("store/build/0123456789abcdef0123/bin/hello", "binary");

  env
    .fanout_cmd()
    .arg("gc")
    .arg("--dry-run")
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run"))
    .stdout(predicate::str::contains("Builds removed: 1"));

  assert!(env.store_path().join("build/0123456789abcdef0123").exists());
}

#[test]
fn gc_removes_unrooted_builds_and_temp_leftovers() {
  let env = TestEnv::empty();
  env.write_file("store/build/0123456789abcdef0123/bin/hello", "binary");
  env.write_file("store/build/0123456789abcdef0123/.fanout-complete", "{}");
  env.write_file("store/tmp/.tmpXYZ/partial", "half");

  let output = env.fanout_cmd().args(["gc", "-o", "json"]).output().unwrap();

  assert!(output.status.success());
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["stats"]["builds_deleted"], 1);
  assert_eq!(json["stats"]["temp_deleted"], 1);
  assert!(!env.store_path().join("build/0123456789abcdef0123").exists());
}
