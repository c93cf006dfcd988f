//! Implementation of the `kiln plan` command.
//!
//! Resolves the goals and prints the build order together with each target's
//! effective properties. Nothing is executed and nothing is written.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use kiln_lib::decl::{PropertySet, Visibility};
use kiln_lib::execute::ExecuteConfig;
use kiln_lib::{Plan, plan_workspace};

use super::{options, workspace};
use crate::GlobalArgs;
use crate::output::{print_json, print_stat, symbols};

#[derive(Serialize)]
struct PlannedEdge<'a> {
  capability: &'a str,
  visibility: Visibility,
  provider: &'a str,
}

#[derive(Serialize)]
struct PlannedTarget<'a> {
  name: &'a str,
  goal: bool,
  actions: Vec<&'static str>,
  out_dir: &'a Path,
  edges: Vec<PlannedEdge<'a>>,
  properties: Option<&'a PropertySet>,
}

#[derive(Serialize)]
struct PlanOutput<'a> {
  project: &'a str,
  configuration: Option<&'a str>,
  build_root: &'a Path,
  targets: Vec<PlannedTarget<'a>>,
}

fn planned_targets(plan: &Plan) -> Vec<PlannedTarget<'_>> {
  let targets = plan.graph.targets();
  targets
    .iter()
    .map(|target| PlannedTarget {
      name: target.name(),
      goal: target.goal,
      actions: target.decl.actions.iter().map(|a| a.kind()).collect(),
      out_dir: &target.outputs.out_dir,
      edges: target
        .edges
        .iter()
        .map(|edge| PlannedEdge {
          capability: &edge.capability,
          visibility: edge.visibility,
          provider: targets[edge.provider].name(),
        })
        .collect(),
      properties: plan.properties.effective(target.name()),
    })
    .collect()
}

pub fn cmd_plan(global: &GlobalArgs, goals: Vec<String>) -> Result<()> {
  let workspace = workspace(global)?;
  let options = options(global, goals, ExecuteConfig::default());
  let plan = plan_workspace(workspace, &options).context("Failed to resolve goals")?;

  let output = PlanOutput {
    project: &plan.workspace.project.name,
    configuration: plan.workspace.configuration.as_deref(),
    build_root: plan.build_root.path(),
    targets: planned_targets(&plan),
  };

  if global.output.is_json() {
    return print_json(&output);
  }

  println!("Plan: {}", options.goals.join(", "));
  print_stat("Project", output.project);
  print_stat("Configuration", output.configuration.unwrap_or("none"));
  print_stat("Build root", &output.build_root.display().to_string());
  println!();

  for (i, target) in output.targets.iter().enumerate() {
    let name = if target.goal {
      format!("{} (goal)", target.name)
    } else {
      target.name.to_string()
    };
    println!(
      "{:>3}. {}",
      i + 1,
      name.if_supports_color(Stream::Stdout, |s| s.bold())
    );

    if !target.actions.is_empty() {
      println!("       actions: {}", target.actions.join(", "));
    }
    for edge in &target.edges {
      println!(
        "       {} {} {} ({})",
        symbols::ARROW,
        edge.capability,
        edge.provider,
        edge.visibility
      );
    }
    if let Some(properties) = target.properties {
      for (key, values) in properties.iter().filter(|(_, v)| !v.is_empty()) {
        println!("       {} = {}", key, values.join(" "));
      }
    }
  }

  Ok(())
}
