//! Compiler backends.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::types::BuildTargetDescriptor;
use crate::consts::SOURCE_DATE_EPOCH;
use crate::platform::paths::cargo_home;

/// Inputs to one compilation.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
  pub descriptor: &'a BuildTargetDescriptor,
  /// Staged copy of the relevant source files.
  pub source_dir: &'a Path,
  /// Scratch space owned by this compilation.
  pub work_dir: &'a Path,
}

#[derive(Debug)]
pub struct CompileOutput {
  /// The produced executable, somewhere under the work dir.
  pub binary: PathBuf,
  /// Combined compiler output.
  pub log: String,
}

#[derive(Debug, Error)]
pub enum CompileError {
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("compiler exited with code {code:?}")]
  Exit { code: Option<i32>, output: String },

  #[error("compiler succeeded but produced no binary at {path}")]
  MissingOutput { path: PathBuf },
}

impl CompileError {
  /// What the user should see: compiler diagnostics when there are any.
  pub fn output(&self) -> String {
    match self {
      CompileError::Exit { output, .. } if !output.is_empty() => output.clone(),
      other => other.to_string(),
    }
  }
}

/// Turns staged source into an executable.
pub trait Compiler: Send + Sync {
  fn compile(&self, request: CompileRequest<'_>) -> impl Future<Output = Result<CompileOutput, CompileError>> + Send;
}

/// Runs the toolchain's `cargo build --release`.
///
/// `--locked` is passed when the staged source carries a `Cargo.lock`; without
/// one cargo resolves dependencies itself.
///
/// The child gets a cleared environment: `PATH` is the toolchain's `bin/`
/// followed by the host `PATH` (for linkers), `HOME` and `TMPDIR` point into
/// the work dir, the locale is `C` and `SOURCE_DATE_EPOCH` is fixed. The
/// descriptor's `env_overrides` are applied last.
#[derive(Debug, Clone)]
pub struct CargoCompiler {
  host_path: Option<OsString>,
  cargo_home: PathBuf,
}

impl Default for CargoCompiler {
  fn default() -> Self {
    Self::new()
  }
}

impl CargoCompiler {
  pub fn new() -> Self {
    Self {
      host_path: std::env::var_os("PATH"),
      cargo_home: cargo_home(),
    }
  }

  fn search_path(&self, toolchain_bin: &Path) -> OsString {
    let mut dirs = vec![toolchain_bin.to_path_buf()];
    if let Some(host) = &self.host_path {
      dirs.extend(std::env::split_paths(host));
    }
    std::env::join_paths(dirs).unwrap_or_else(|_| toolchain_bin.as_os_str().to_owned())
  }
}

fn cargo_args(target_triple: &str, source_dir: &Path) -> Vec<String> {
  let mut args = vec!["build".to_string(), "--release".to_string()];
  if source_dir.join("Cargo.lock").is_file() {
    args.push("--locked".to_string());
  }
  args.extend(["--target".to_string(), target_triple.to_string()]);
  args
}

impl Compiler for CargoCompiler {
  async fn compile(&self, request: CompileRequest<'_>) -> Result<CompileOutput, CompileError> {
    let descriptor = request.descriptor;
    let toolchain = &descriptor.toolchain;
    let cargo = toolchain.tool("cargo");
    let target_dir = request.work_dir.join("target");
    let home = request.work_dir.join("home");
    let tmp = request.work_dir.join("tmp");
    for dir in [&home, &tmp] {
      tokio::fs::create_dir_all(dir).await.map_err(|source| CompileError::Spawn {
        program: cargo.clone(),
        source,
      })?;
    }

    info!(target = %descriptor.target_triple, binary = %descriptor.binary, "running cargo build");

    let mut command = Command::new(&cargo);
    command
      .args(cargo_args(&descriptor.target_triple, request.source_dir))
      .current_dir(request.source_dir)
      .env_clear()
      .env("PATH", self.search_path(&toolchain.bin_dir()))
      .env("HOME", &home)
      .env("TMPDIR", &tmp)
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
      .env("CARGO_HOME", &self.cargo_home)
      .env("CARGO_TARGET_DIR", &target_dir)
      .env("CARGO_TERM_COLOR", "never")
      .env("RUSTC", toolchain.tool("rustc"))
      .envs(&descriptor.env_overrides)
      .kill_on_drop(true);

    debug!(cargo = ?cargo, source_dir = ?request.source_dir, "spawning process");

    let output = command.output().await.map_err(|source| CompileError::Spawn {
      program: cargo.clone(),
      source,
    })?;

    let mut log = String::from_utf8_lossy(&output.stderr).to_string();
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
      log.push_str(&stdout);
    }

    if !output.status.success() {
      debug!(stderr = %log, "cargo failed");
      return Err(CompileError::Exit {
        code: output.status.code(),
        output: log,
      });
    }

    let binary = target_dir
      .join(&descriptor.target_triple)
      .join("release")
      .join(format!("{}{}", descriptor.binary, std::env::consts::EXE_SUFFIX));
    if !binary.is_file() {
      return Err(CompileError::MissingOutput { path: binary });
    }

    Ok(CompileOutput { binary, log })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(unix)]
  #[test]
  fn toolchain_bin_comes_first_on_path() {
    let compiler = CargoCompiler {
      host_path: Some(OsString::from("/usr/bin:/bin")),
      cargo_home: PathBuf::from("/home/u/.cargo"),
    };
    let path = compiler.search_path(Path::new("/store/toolchain/abc/bin"));
    let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();
    assert_eq!(
      dirs,
      [
        PathBuf::from("/store/toolchain/abc/bin"),
        PathBuf::from("/usr/bin"),
        PathBuf::from("/bin")
      ]
    );
  }

  #[test]
  fn locked_only_with_a_lockfile() {
    let temp = tempfile::TempDir::new().unwrap();
    let triple = "x86_64-unknown-linux-gnu";
    assert_eq!(
      cargo_args(triple, temp.path()),
      ["build", "--release", "--target", triple]
    );

    std::fs::write(temp.path().join("Cargo.lock"), "version = 4\n").unwrap();
    assert_eq!(
      cargo_args(triple, temp.path()),
      ["build", "--release", "--locked", "--target", triple]
    );
  }

  #[test]
  fn compile_error_output_prefers_diagnostics() {
    let err = CompileError::Exit {
      code: Some(101),
      output: "error[E0425]: cannot find value".to_string(),
    };
    assert!(err.output().contains("E0425"));

    let err = CompileError::Exit {
      code: Some(1),
      output: String::new(),
    };
    assert_eq!(err.output(), "compiler exited with code Some(1)");
  }
}
