use anyhow::Result;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use kiln_lib::decl::{DependencyEdge, PlatformScope, TargetDecl, Visibility};

use super::workspace;
use crate::GlobalArgs;
use crate::output::{print_info, print_json};

#[derive(Serialize)]
struct TargetEntry<'a> {
  name: &'a str,
  package_path: String,
  provides: Vec<&'a str>,
  depends: &'a [DependencyEdge],
  actions: Vec<&'static str>,
}

impl<'a> From<&'a TargetDecl> for TargetEntry<'a> {
  fn from(decl: &'a TargetDecl) -> Self {
    Self {
      name: &decl.name,
      package_path: decl.package_path.display().to_string(),
      provides: decl.provides.iter().map(|p| p.name.as_str()).collect(),
      depends: &decl.depends,
      actions: decl.actions.iter().map(|a| a.kind()).collect(),
    }
  }
}

fn describe_edge(edge: &DependencyEdge) -> String {
  let mut text = edge.capability.clone();
  if edge.visibility == Visibility::Private {
    text.push_str(" (private)");
  }
  if let PlatformScope::Only(platform) = &edge.platform {
    text.push_str(&format!(" [{}]", platform));
  }
  text
}

/// List every declared target in declaration order.
pub fn cmd_targets(global: &GlobalArgs) -> Result<()> {
  let workspace = workspace(global)?;
  let entries: Vec<TargetEntry> = workspace.declarations.targets().iter().map(TargetEntry::from).collect();

  if global.output.is_json() {
    return print_json(&entries);
  }

  if entries.is_empty() {
    print_info("No targets declared");
    return Ok(());
  }

  for entry in &entries {
    println!("{}", entry.name.if_supports_color(Stream::Stdout, |s| s.bold()));
    if !entry.provides.is_empty() {
      println!("  provides: {}", entry.provides.join(", "));
    }
    if !entry.depends.is_empty() {
      let depends: Vec<String> = entry.depends.iter().map(describe_edge).collect();
      println!("  depends:  {}", depends.join(", "));
    }
    if !entry.actions.is_empty() {
      println!("  actions:  {}", entry.actions.join(", "));
    }
  }

  Ok(())
}
