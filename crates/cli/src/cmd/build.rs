//! `kiln build`, `kiln test` and `kiln run`.
//!
//! All three resolve the requested goals, execute them with the command
//! runner and print the run report. They differ only in how goals are
//! chosen and whether trailing arguments are forwarded.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use kiln_lib::execute::{CommandRunner, ExecuteConfig, ExecutionReport};
use kiln_lib::{Workspace, plan_workspace, run_plan};

use super::{execute_config, options, workspace};
use crate::GlobalArgs;
use crate::output::{print_info, print_json, print_report, print_warning};

#[derive(Serialize)]
struct RunOutput<'a> {
  project: &'a str,
  configuration: Option<&'a str>,
  goals: &'a [String],
  report: &'a ExecutionReport,
}

pub fn cmd_build(global: &GlobalArgs, goals: Vec<String>, force: bool) -> Result<ExitCode> {
  let workspace = workspace(global)?;
  run_goals(global, workspace, goals, execute_config(global, Vec::new(), force), false)
}

pub fn cmd_test(global: &GlobalArgs, goals: Vec<String>, force: bool, args: Vec<String>) -> Result<ExitCode> {
  let workspace = workspace(global)?;

  let goals = if goals.is_empty() { workspace.test_goals() } else { goals };
  if goals.is_empty() {
    print_warning("No test targets declared");
    return Ok(ExitCode::SUCCESS);
  }

  run_goals(global, workspace, goals, execute_config(global, args, force), false)
}

pub fn cmd_run(global: &GlobalArgs, goal: String, args: Vec<String>) -> Result<ExitCode> {
  let workspace = workspace(global)?;
  run_goals(global, workspace, vec![goal], execute_config(global, args, false), true)
}

/// `echo` prints the captured stdout of the goal targets ahead of the report.
fn run_goals(
  global: &GlobalArgs,
  workspace: Workspace,
  goals: Vec<String>,
  execute: ExecuteConfig,
  echo: bool,
) -> Result<ExitCode> {
  let start = Instant::now();
  let options = options(global, goals, execute);

  let plan = plan_workspace(workspace, &options).context("Failed to resolve goals")?;
  debug!(goals = ?options.goals, order = ?plan.graph.order(), "resolved build order");
  if !global.output.is_json() {
    print_info(&format!(
      "Building {} target(s) for {}",
      plan.graph.len(),
      options.goals.join(", ")
    ));
  }

  let runner = Arc::new(CommandRunner::new(plan.workspace.toolchain.clone()));
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let run = rt.block_on(run_plan(plan, runner, &options.execute));

  if global.output.is_json() {
    print_json(&RunOutput {
      project: &run.plan.workspace.project.name,
      configuration: run.plan.workspace.configuration.as_deref(),
      goals: &options.goals,
      report: &run.report,
    })?;
  } else {
    if echo {
      for target in run.plan.graph.targets().iter().filter(|t| t.goal) {
        if let Some(report) = run.report.get(target.name()) {
          print!("{}", report.stdout);
        }
      }
    }
    print_report(&run.report, start.elapsed(), global.verbose);
  }

  Ok(ExitCode::from(u8::try_from(run.report.exit_code()).unwrap_or(1)))
}
