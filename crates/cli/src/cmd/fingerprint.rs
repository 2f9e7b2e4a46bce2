use std::path::Path;

use anyhow::{Context, Result};

use fanout_lib::config::ProjectConfig;
use fanout_lib::source::{SourceFilter, SourceSnapshot};

pub fn cmd_fingerprint(source: &Path, verbose: bool) -> Result<()> {
  let config = ProjectConfig::load(source).context("Failed to load fanout.toml")?;
  let filter = SourceFilter::for_project(source, &config.source).context("Invalid source patterns")?;
  let snapshot =
    SourceSnapshot::scan(source, &filter).with_context(|| format!("Failed to fingerprint {}", source.display()))?;

  if verbose {
    for file in &snapshot.files {
      println!("{}  {}", file.hash, file.path);
    }
    println!();
  }
  println!("{}", snapshot.fingerprint);
  Ok(())
}
