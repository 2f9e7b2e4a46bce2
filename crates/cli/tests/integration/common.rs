//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use fanout_lib::platform::Platform;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding a sample project, an
/// isolated store and, optionally, a fake toolchain distribution.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create an empty test environment.
  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Create an environment with a minimal binary crate named `hello`.
  pub fn with_project() -> Self {
    let env = Self::empty();
    env.write_file(
      "project/Cargo.toml",
      "[package]\nname = \"hello\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
    );
    env.write_file(
      "project/Cargo.lock",
      "version = 4\n\n[[package]]\nname = \"hello\"\nversion = \"0.1.0\"\n",
    );
    env.write_file("project/src/main.rs", "fn main() {\n  println!(\"hello\");\n}\n");
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn project_path(&self) -> PathBuf {
    self.temp.path().join("project")
  }

  /// Store path (isolated per test).
  pub fn store_path(&self) -> PathBuf {
    let p = self.temp.path().join("store");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn dist_path(&self) -> PathBuf {
    let p = self.temp.path().join("dist");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Lay out a fake `stable` distribution for `platform` with every component.
  ///
  /// Good enough for resolving toolchains, not for compiling.
  pub fn fake_dist(&self, version: &str, platform: Platform) {
    let triple = platform.rust_triple();
    let host = self.dist_path().join("stable").join(version).join(&triple);
    let files = [
      ("rustc", "bin/rustc".to_string()),
      ("cargo", "bin/cargo".to_string()),
      ("rustfmt", "bin/rustfmt".to_string()),
      ("clippy", "bin/cargo-clippy".to_string()),
      ("rust-analyzer", "bin/rust-analyzer".to_string()),
      ("rust-src", "lib/rustlib/src/rust/library/core/src/lib.rs".to_string()),
      ("rust-std", format!("lib/rustlib/{}/lib/libstd.rlib", triple)),
    ];
    for (component, file) in files {
      write(&host.join(component).join(file), component);
    }
    let musl = platform.musl_triple();
    write(
      &host
        .join(format!("rust-std-{}", musl))
        .join(format!("lib/rustlib/{}/lib/libstd.rlib", musl)),
      "musl std",
    );
  }

  /// Get a pre-configured Command for the fanout binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `FANOUT_STORE`: isolated store
  /// - `FANOUT_DIST`: the fake distribution
  /// - `RUSTUP_HOME`: an empty directory, so no real toolchain leaks in
  pub fn fanout_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("fanout");
    cmd.env("FANOUT_STORE", self.store_path());
    cmd.env("FANOUT_DIST", self.dist_path());
    cmd.env("RUSTUP_HOME", self.temp.path().join("rustup"));
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

fn write(path: &Path, content: &str) {
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(path, content).unwrap();
}

/// The platform tests run on, if it is in the supported matrix.
pub fn host() -> Option<Platform> {
  Platform::current()
}
