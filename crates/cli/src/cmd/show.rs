//! Implementation of the `fanout show` command.
//!
//! Resolves every toolchain and computes descriptor keys for the whole output
//! surface, reporting which outputs are already in the store. Nothing is built.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use fanout_lib::orchestrate::PlannedOutput;
use fanout_lib::platform::supported_platforms;
use fanout_lib::registry::{OutputFailure, OutputName};
use fanout_lib::store::ArtifactStore;
use fanout_lib::store::lock::{LockMode, StoreLock};

use super::{load_project, orchestrator, runtime};
use crate::output::{OutputFormat, print_json, print_stat, symbols, truncate_hash};

pub fn cmd_show(source: &Path, output: OutputFormat) -> Result<()> {
  let project = load_project(source)?;
  let fingerprint = project.snapshot.fingerprint.clone();
  let binary = project.binary.clone();

  let store = ArtifactStore::open_default();
  let _lock = StoreLock::acquire(&store, LockMode::Shared, "show").context("Failed to acquire store lock")?;
  let orchestrator = orchestrator(project, store)?;
  let planned = runtime()?.block_on(orchestrator.plan(supported_platforms(), &OutputName::ALL));

  if output.is_json() {
    let mut platforms: BTreeMap<String, BTreeMap<&str, Value>> = BTreeMap::new();
    for (platform, name, result) in &planned {
      let value = match result {
        Ok(plan) => serde_json::to_value(plan).context("Failed to serialize plan")?,
        Err(failure) => json!({ "error": failure }),
      };
      platforms.entry(platform.triple()).or_default().insert(name.as_str(), value);
    }
    print_json(&json!({
      "fingerprint": fingerprint,
      "binary": binary,
      "outputs": platforms,
    }))?;
    return Ok(());
  }

  println!("Binary: {}", binary);
  println!("Fingerprint: {}", fingerprint);
  let mut current = None;
  for (platform, name, result) in &planned {
    if current != Some(*platform) {
      println!();
      println!("{}", platform);
      current = Some(*platform);
    }
    println!("  {}", describe(*name, result));
  }
  println!();
  print_stat(
    "Cached",
    &format!(
      "{}/{}",
      planned
        .iter()
        .filter(|(_, _, r)| r.as_ref().is_ok_and(|p| p.cached))
        .count(),
      planned.iter().filter(|(_, n, _)| *n != OutputName::DevShell).count()
    ),
  );
  Ok(())
}

fn describe(name: OutputName, result: &Result<PlannedOutput, OutputFailure>) -> String {
  match result {
    Ok(plan) => match (&plan.descriptor_key, &plan.target_triple) {
      (Some(key), Some(triple)) => format!(
        "{} {} {} rust {} [{}]",
        if plan.cached { symbols::SUCCESS } else { symbols::PLUS },
        name,
        triple,
        plan.toolchain_version,
        truncate_hash(key.as_str())
      ),
      _ => format!("{} {} rust {}", symbols::INFO, name, plan.toolchain_version),
    },
    Err(failure) => format!("{} {}: {}", symbols::ERROR, name, failure.kind),
  }
}
