mod build;
mod info;
mod plan;
mod targets;

pub use build::{cmd_build, cmd_run, cmd_test};
pub use info::cmd_info;
pub use plan::cmd_plan;
pub use targets::cmd_targets;

use anyhow::{Context, Result};

use kiln_lib::execute::ExecuteConfig;
use kiln_lib::{OrchestrateOptions, Workspace, load_workspace};

use crate::GlobalArgs;

/// Build run options from the global flags.
fn options(global: &GlobalArgs, goals: Vec<String>, execute: ExecuteConfig) -> OrchestrateOptions {
  OrchestrateOptions {
    manifest: global.manifest.clone(),
    configuration: global.configuration.clone(),
    goals,
    platform: global.platform.clone(),
    build_root: global.build_root.clone(),
    execute,
  }
}

fn execute_config(global: &GlobalArgs, arguments: Vec<String>, force: bool) -> ExecuteConfig {
  let mut config = ExecuteConfig {
    arguments,
    force,
    ..Default::default()
  };
  if let Some(jobs) = global.jobs {
    config.parallelism = jobs.max(1);
  }
  config
}

fn workspace(global: &GlobalArgs) -> Result<Workspace> {
  load_workspace(&global.manifest, global.configuration.as_deref())
    .with_context(|| format!("Failed to load {}", global.manifest.display()))
}
