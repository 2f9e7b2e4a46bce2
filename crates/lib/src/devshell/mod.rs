//! Development environments.
//!
//! A [`DevEnvironment`] is computed fresh on every request: it is the resolved
//! toolchain plus auxiliary tools and native library paths, expressed as a set
//! of environment variables. It never depends on a build having succeeded.

mod shell;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::NativeLib;
use crate::platform::Platform;
use crate::toolchain::{ResolveError, ResolvedToolchain, ToolchainResolver, ToolchainSource, ToolchainSpec};

pub use shell::Shell;

const PATH_SEPARATOR: &str = ":";

/// An auxiliary tool requested for the dev shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevTool {
  pub name: String,
  /// Where the tool was found; `None` if it is not installed.
  pub path: Option<PathBuf>,
}

impl DevTool {
  pub fn is_available(&self) -> bool {
    self.path.is_some()
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct DevEnvironment {
  pub platform: Platform,
  pub toolchain: ResolvedToolchain,
  pub extra_tools: Vec<DevTool>,
  pub library_search_path: Vec<PathBuf>,
  /// Variables to set, `PATH` included.
  pub env: BTreeMap<String, String>,
}

impl DevEnvironment {
  pub fn missing_tools(&self) -> impl Iterator<Item = &DevTool> {
    self.extra_tools.iter().filter(|t| !t.is_available())
  }

  /// `PATH` entries in lookup order.
  pub fn path_entries(&self) -> Vec<PathBuf> {
    self
      .env
      .get("PATH")
      .map(|p| p.split(PATH_SEPARATOR).map(PathBuf::from).collect())
      .unwrap_or_default()
  }

  /// Render the environment as a script `shell` can source.
  pub fn script(&self, shell: Shell) -> String {
    let mut lines = vec![
      shell.header().to_string(),
      shell.comment(&format!(
        "fanout dev shell for {} (rust {})",
        self.platform, self.toolchain.version
      )),
    ];
    for tool in self.missing_tools() {
      lines.push(shell.comment(&format!("{} not found on PATH", tool.name)));
    }
    for (name, value) in &self.env {
      lines.push(shell.export_var(name, value));
    }
    lines.push(String::new());
    lines.join("\n")
  }

  /// Configure `command` to run inside this environment.
  pub fn apply<'a>(&self, command: &'a mut Command) -> &'a mut Command {
    command.envs(&self.env)
  }
}

/// Assembles dev environments from the shared toolchain resolver.
pub struct DevShellProvisioner<S> {
  resolver: Arc<ToolchainResolver<S>>,
  spec: ToolchainSpec,
  tools: Vec<String>,
  native: Vec<NativeLib>,
  inherited_path: Option<OsString>,
}

impl<S: ToolchainSource> DevShellProvisioner<S> {
  pub fn new(resolver: Arc<ToolchainResolver<S>>, spec: ToolchainSpec) -> Self {
    Self {
      resolver,
      spec,
      tools: Vec::new(),
      native: Vec::new(),
      inherited_path: std::env::var_os("PATH"),
    }
  }

  pub fn with_tools(mut self, tools: Vec<String>) -> Self {
    self.tools = tools;
    self
  }

  pub fn with_native(mut self, native: Vec<NativeLib>) -> Self {
    self.native = native;
    self
  }

  /// Use `path` instead of this process's `PATH` for tool lookup and as the
  /// tail of the environment's `PATH`.
  pub fn with_inherited_path(mut self, path: Option<OsString>) -> Self {
    self.inherited_path = path;
    self
  }

  #[instrument(skip(self))]
  pub async fn provision(&self, platform: Platform) -> Result<DevEnvironment, ResolveError> {
    let toolchain = self.resolver.resolve(&self.spec, platform).await?;

    let extra_tools = self.find_tools();
    for tool in extra_tools.iter().filter(|t| !t.is_available()) {
      warn!(tool = %tool.name, "dev tool not found on PATH, continuing without it");
    }

    let mut path = vec![toolchain.bin_dir()];
    for dir in extra_tools.iter().filter_map(|t| t.path.as_deref().and_then(Path::parent)) {
      if !path.iter().any(|p| p == dir) {
        path.push(dir.to_path_buf());
      }
    }
    if let Some(inherited) = &self.inherited_path {
      path.extend(std::env::split_paths(inherited));
    }

    let mut env = BTreeMap::new();
    env.insert("PATH".to_string(), join(&path));
    env.insert(
      "RUST_SRC_PATH".to_string(),
      toolchain.rust_src_path().to_string_lossy().to_string(),
    );
    env.insert(
      "FANOUT_TOOLCHAIN".to_string(),
      toolchain.path.to_string_lossy().to_string(),
    );

    let library_search_path: Vec<PathBuf> = self.native.iter().map(NativeLib::lib_dir).collect();
    if !library_search_path.is_empty() {
      let libs = join(&library_search_path);
      env.insert(platform.os.library_path_var().to_string(), libs.clone());
      env.insert("LIBRARY_PATH".to_string(), libs);
      let pkgconfig: Vec<PathBuf> = self.native.iter().map(NativeLib::pkgconfig_dir).collect();
      env.insert("PKG_CONFIG_PATH".to_string(), join(&pkgconfig));
    }

    debug!(%platform, vars = env.len(), "provisioned dev environment");
    Ok(DevEnvironment {
      platform,
      toolchain,
      extra_tools,
      library_search_path,
      env,
    })
  }

  fn find_tools(&self) -> Vec<DevTool> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    self
      .tools
      .iter()
      .map(|name| DevTool {
        name: name.clone(),
        path: which::which_in(name, self.inherited_path.as_ref(), &cwd).ok(),
      })
      .collect()
  }
}

fn join(paths: &[PathBuf]) -> String {
  paths
    .iter()
    .map(|p| p.to_string_lossy())
    .collect::<Vec<_>>()
    .join(PATH_SEPARATOR)
}
