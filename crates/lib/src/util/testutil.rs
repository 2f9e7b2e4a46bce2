//! Test fixtures: fake toolchain distributions, sample projects and a
//! compiler that never runs cargo.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::build::{CompileError, CompileOutput, CompileRequest, Compiler};
use crate::platform::Platform;
use crate::toolchain::{Component, Located, ResolveError, ResolvedToolchain, ToolchainSource, ToolchainSpec};
use crate::util::hash::{hash_bytes, portable_rel_path};

fn write(path: &Path, content: &str) {
  fs::create_dir_all(path.parent().unwrap()).unwrap();
  fs::write(path, content).unwrap();
}

/// Files a component tree carries, relative to the tree root.
fn component_files(component: Component, triple: &str) -> Vec<String> {
  match component {
    Component::Rustc => vec!["bin/rustc".into(), "lib/librustc_driver.so".into()],
    Component::Cargo => vec!["bin/cargo".into()],
    Component::Rustfmt => vec!["bin/rustfmt".into(), "bin/cargo-fmt".into()],
    Component::Clippy => vec!["bin/clippy-driver".into(), "bin/cargo-clippy".into()],
    Component::RustAnalyzer => vec!["bin/rust-analyzer".into()],
    Component::RustSrc => vec!["lib/rustlib/src/rust/library/core/src/lib.rs".into()],
    Component::RustStd => vec![format!("lib/rustlib/{}/lib/libstd.rlib", triple)],
  }
}

/// Lay out an unpacked distribution for `platform` under `root`, with every
/// component plus a standard library for each of `extra_targets`.
pub fn fake_dist(root: &Path, channel: &str, version: &str, platform: Platform, extra_targets: &[&str]) {
  let triple = platform.rust_triple();
  let host_dir = root.join(channel).join(version).join(&triple);
  for component in Component::ALL {
    for file in component_files(component, &triple) {
      write(
        &host_dir.join(component.as_str()).join(file),
        &format!("{} {} {}\n", component, version, triple),
      );
    }
  }
  for target in extra_targets {
    write(
      &host_dir
        .join(format!("rust-std-{}", target))
        .join(format!("lib/rustlib/{}/lib/libstd.rlib", target)),
      &format!("std {} {}\n", version, target),
    );
  }
}

/// A toolchain source that counts how often it is asked to locate.
pub struct CountingSource<S> {
  inner: S,
  calls: AtomicUsize,
}

impl<S> CountingSource<S> {
  pub fn new(inner: S) -> Self {
    Self {
      inner,
      calls: AtomicUsize::new(0),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl<S: ToolchainSource> ToolchainSource for CountingSource<S> {
  fn name(&self) -> &'static str {
    self.inner.name()
  }

  fn locate(&self, spec: &ToolchainSpec, platform: Platform) -> Result<Located, ResolveError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.inner.locate(spec, platform)
  }
}

/// A minimal binary crate named `name` in `dir`.
pub fn sample_project(dir: &Path, name: &str) {
  write(
    &dir.join("Cargo.toml"),
    &format!(
      "[package]\nname = \"{}\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n[dependencies]\n",
      name
    ),
  );
  write(
    &dir.join("Cargo.lock"),
    &format!(
      "# This file is automatically @generated by Cargo.\n# It is not intended for manual editing.\nversion = 4\n\n[[package]]\nname = \"{}\"\nversion = \"0.1.0\"\n",
      name
    ),
  );
  write(
    &dir.join("src/main.rs"),
    "fn main() {\n  println!(\"Hello, world!\");\n}\n",
  );
}

/// A resolved toolchain that exists only on paper.
pub fn fake_toolchain(platform: Platform, path: &str) -> ResolvedToolchain {
  ResolvedToolchain {
    spec: ToolchainSpec::default(),
    platform,
    version: "1.80.0".to_string(),
    content_hash: hash_bytes(b"fake toolchain"),
    path: PathBuf::from(path),
  }
}

const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;
const PT_INTERP: u32 = 3;

/// A 64-bit little-endian ELF header followed by its program headers.
pub fn fake_elf(interp: bool, dynamic: bool) -> Vec<u8> {
  let mut types = vec![PT_LOAD];
  if interp {
    types.push(PT_INTERP);
  }
  if dynamic {
    types.push(PT_DYNAMIC);
  }

  let mut bytes = vec![0u8; 64];
  bytes[..4].copy_from_slice(b"\x7fELF");
  bytes[4] = 2; // ELFCLASS64
  bytes[5] = 1; // little endian
  bytes[6] = 1;
  bytes[0x10..0x12].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
  bytes[0x20..0x28].copy_from_slice(&64u64.to_le_bytes());
  bytes[0x34..0x36].copy_from_slice(&64u16.to_le_bytes());
  bytes[0x36..0x38].copy_from_slice(&56u16.to_le_bytes());
  bytes[0x38..0x3a].copy_from_slice(&(types.len() as u16).to_le_bytes());

  for kind in types {
    let mut header = [0u8; 56];
    header[..4].copy_from_slice(&kind.to_le_bytes());
    bytes.extend_from_slice(&header);
  }
  bytes
}

/// The first bytes of a 64-bit Mach-O executable.
pub fn fake_macho() -> Vec<u8> {
  let mut bytes = vec![0xcf, 0xfa, 0xed, 0xfe];
  bytes.resize(32, 0);
  bytes
}

#[cfg(unix)]
pub fn fake_executable(dir: &Path, name: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  write(&path, "#!/bin/sh\nexit 0\n");
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  path
}

#[derive(Debug, Clone)]
enum FakeMode {
  Static,
  Dynamic,
  Failing(String),
}

/// A [`Compiler`] that writes a canned executable instead of running cargo.
#[derive(Debug)]
pub struct FakeCompiler {
  mode: FakeMode,
  calls: AtomicUsize,
  sources: Mutex<Vec<String>>,
}

impl Default for FakeCompiler {
  /// Produces a static ELF, valid for every target.
  fn default() -> Self {
    Self::with_mode(FakeMode::Static)
  }
}

impl FakeCompiler {
  fn with_mode(mode: FakeMode) -> Self {
    Self {
      mode,
      calls: AtomicUsize::new(0),
      sources: Mutex::new(Vec::new()),
    }
  }

  /// Produces an ELF that needs the dynamic loader.
  pub fn dynamic() -> Self {
    Self::with_mode(FakeMode::Dynamic)
  }

  /// Fails every compilation with `diagnostics` as compiler output.
  pub fn failing(diagnostics: &str) -> Self {
    Self::with_mode(FakeMode::Failing(diagnostics.to_string()))
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Relative paths of the sources staged for the most recent compilation.
  pub fn last_sources(&self) -> Vec<String> {
    self.sources.lock().unwrap().clone()
  }
}

impl Compiler for FakeCompiler {
  async fn compile(&self, request: CompileRequest<'_>) -> Result<CompileOutput, CompileError> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    let mut seen: Vec<String> = walkdir::WalkDir::new(request.source_dir)
      .into_iter()
      .filter_map(|e| e.ok())
      .filter(|e| e.file_type().is_file())
      .map(|e| portable_rel_path(e.path(), request.source_dir))
      .collect();
    seen.sort();
    *self.sources.lock().unwrap() = seen;

    let bytes = match &self.mode {
      FakeMode::Static => fake_elf(false, false),
      FakeMode::Dynamic => fake_elf(true, true),
      FakeMode::Failing(diagnostics) => {
        return Err(CompileError::Exit {
          code: Some(101),
          output: diagnostics.clone(),
        });
      }
    };

    let descriptor = request.descriptor;
    let binary = request
      .work_dir
      .join("target")
      .join(&descriptor.target_triple)
      .join("release")
      .join(&descriptor.binary);
    fs::create_dir_all(binary.parent().unwrap()).unwrap();
    fs::write(&binary, bytes).unwrap();

    Ok(CompileOutput {
      binary,
      log: format!("Compiling {} v0.1.0\n", descriptor.binary),
    })
  }
}
