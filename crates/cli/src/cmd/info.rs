use fanout_lib::config::ProjectConfig;
use fanout_lib::platform::paths::store_dir;
use fanout_lib::platform::{Platform, for_each, platform_triple, supported_platforms};
use fanout_lib::toolchain::{ToolchainSource, ToolchainSpec};

pub fn cmd_info() {
  println!("System:");
  match platform_triple() {
    Some(triple) => println!("Platform: {}", triple),
    _ => println!("Could not detect platform."),
  }
  println!("Store: {}", store_dir().display());

  let source = match ProjectConfig::default().with_env_overrides().toolchain_source() {
    Ok(source) => source,
    Err(e) => {
      println!("Toolchain source: {}", e);
      return;
    }
  };
  println!("Toolchain source: {}", source.name());

  let spec = ToolchainSpec::default();
  let available = for_each(supported_platforms(), |p: Platform| {
    source.locate(&spec, p).map(|located| located.version)
  });

  println!();
  println!("Platforms:");
  for (platform, result) in &available {
    let status = match result {
      Ok(version) => format!("{} {}", spec.channel, version),
      Err(_) => "toolchain unavailable".to_string(),
    };
    println!(
      "  {:<16} {:<28} {:<28} {}",
      platform.to_string(),
      platform.rust_triple(),
      platform.musl_triple(),
      status
    );
  }
}
