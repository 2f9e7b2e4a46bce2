mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{BuildOptions, BuildSelection, DevelopOptions, PlatformArgs};
use crate::output::{OutputFormat, print_error};

/// fanout - build a Rust project for every platform from one source tree
#[derive(Parser)]
#[command(name = "fanout")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the default and/or static binary
  Build {
    /// Which binaries to build
    #[arg(value_enum, default_value = "default")]
    what: BuildSelection,

    #[command(flatten)]
    platforms: PlatformArgs,

    /// Project directory (default: current directory)
    #[arg(long, default_value = ".")]
    source: PathBuf,

    /// Do not create result links
    #[arg(long)]
    no_link: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Enter the development environment
  Develop {
    /// Platform to provision for (default: host)
    #[arg(long)]
    platform: Option<String>,

    /// Print a script to source instead of starting a shell
    #[arg(long)]
    print: bool,

    /// Shell to generate the script for or start (auto-detected if not specified)
    #[arg(short, long)]
    shell: Option<String>,

    /// Run a single command inside the environment
    #[arg(short = 'c', long = "command")]
    command: Option<String>,

    /// Project directory (default: current directory)
    #[arg(long, default_value = ".")]
    source: PathBuf,
  },

  /// Show every output and its cache status without building
  Show {
    /// Project directory (default: current directory)
    #[arg(long, default_value = ".")]
    source: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Print the source fingerprint
  Fingerprint {
    /// Project directory (default: current directory)
    #[arg(long, default_value = ".")]
    source: PathBuf,
  },

  /// Show host platform and toolchain availability
  Info,

  /// Remove unreferenced store entries
  Gc {
    /// Show what would be removed without removing it
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(e) = run(cli) {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Commands::Build {
      what,
      platforms,
      source,
      no_link,
      output,
    } => cmd::cmd_build(
      BuildOptions {
        what,
        platforms,
        source,
        link: !no_link,
      },
      output,
    ),
    Commands::Develop {
      platform,
      print,
      shell,
      command,
      source,
    } => cmd::cmd_develop(DevelopOptions {
      platform,
      print,
      shell,
      command,
      source,
    }),
    Commands::Show { source, output } => cmd::cmd_show(&source, output),
    Commands::Fingerprint { source } => cmd::cmd_fingerprint(&source, cli.verbose),
    Commands::Info => Ok(cmd::cmd_info()),
    Commands::Gc { dry_run, output } => cmd::cmd_gc(dry_run, output),
  }
}
