mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kiln_lib::consts::MANIFEST_FILE;

use crate::output::{OutputFormat, print_error};

/// kiln - build-target dependency-graph orchestrator
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[command(flatten)]
  global: GlobalArgs,

  #[command(subcommand)]
  command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
  /// Path to the root manifest
  #[arg(long, global = true, default_value = MANIFEST_FILE)]
  pub manifest: PathBuf,

  /// Configuration to apply (default: KILN_CONFIGURATION, then the first declared)
  #[arg(short, long, global = true)]
  pub configuration: Option<String>,

  /// Maximum number of targets built in parallel (default: KILN_JOBS, then the CPU count)
  #[arg(short, long, global = true)]
  pub jobs: Option<usize>,

  /// Build root (default: KILN_BUILD_ROOT, then .kiln/build next to the manifest)
  #[arg(long, global = true)]
  pub build_root: Option<PathBuf>,

  /// Platform triple to resolve for (default: the host)
  #[arg(long, global = true)]
  pub platform: Option<String>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  pub verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the given goals and everything they depend on
  Build {
    /// Target names or capabilities
    #[arg(required = true)]
    goals: Vec<String>,

    /// Rebuild targets even when unchanged
    #[arg(short, long)]
    force: bool,
  },

  /// Build and run tests (default: every target providing a Test/* capability)
  Test {
    /// Target names or capabilities
    goals: Vec<String>,

    /// Rebuild targets even when unchanged
    #[arg(short, long)]
    force: bool,

    /// Arguments passed to the test binaries
    #[arg(last = true)]
    args: Vec<String>,
  },

  /// Build a goal and run its executable
  Run {
    /// Target name or capability
    goal: String,

    /// Arguments passed to the executable
    #[arg(last = true)]
    args: Vec<String>,
  },

  /// Show build order and effective properties without running anything
  Plan {
    /// Target names or capabilities
    #[arg(required = true)]
    goals: Vec<String>,
  },

  /// List declared targets
  Targets,

  /// Show platform and workspace information
  Info,
}

fn init_tracing(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.global.verbose);

  let global = cli.global;
  let result = match cli.command {
    Commands::Build { goals, force } => cmd::cmd_build(&global, goals, force),
    Commands::Test { goals, force, args } => cmd::cmd_test(&global, goals, force, args),
    Commands::Run { goal, args } => cmd::cmd_run(&global, goal, args),
    Commands::Plan { goals } => cmd::cmd_plan(&global, goals).map(|_| ExitCode::SUCCESS),
    Commands::Targets => cmd::cmd_targets(&global).map(|_| ExitCode::SUCCESS),
    Commands::Info => cmd::cmd_info(&global).map(|_| ExitCode::SUCCESS),
  };

  match result {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}
