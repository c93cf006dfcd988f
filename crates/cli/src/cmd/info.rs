use anyhow::Result;
use serde::Serialize;

use kiln_lib::platform::platform_triple;
use kiln_lib::store::BuildRoot;

use super::workspace;
use crate::GlobalArgs;
use crate::output::{print_json, print_stat};

#[derive(Serialize)]
struct WorkspaceInfo {
  manifest: String,
  project: String,
  configuration: Option<String>,
  packages: Vec<String>,
  targets: usize,
  build_root: String,
  cxx: String,
  ar: String,
  shell: String,
}

#[derive(Serialize)]
struct Info {
  version: &'static str,
  platform: String,
  workspace: Option<WorkspaceInfo>,
}

/// Print platform details, plus workspace details when a manifest is present.
pub fn cmd_info(global: &GlobalArgs) -> Result<()> {
  let platform = global.platform.clone().unwrap_or_else(platform_triple);

  let workspace = if global.manifest.is_file() {
    let workspace = workspace(global)?;
    let build_root = match &global.build_root {
      Some(path) => BuildRoot::new(path),
      None => BuildRoot::for_project(&workspace.root.dir),
    };
    Some(WorkspaceInfo {
      manifest: workspace.root.path.display().to_string(),
      project: workspace.project.name.clone(),
      configuration: workspace.configuration.clone(),
      targets: workspace.declarations.len(),
      build_root: build_root.path().display().to_string(),
      cxx: workspace.toolchain.cxx.clone(),
      ar: workspace.toolchain.ar.clone(),
      shell: workspace.toolchain.shell.clone(),
      packages: workspace.packages,
    })
  } else {
    None
  };

  let info = Info {
    version: env!("CARGO_PKG_VERSION"),
    platform,
    workspace,
  };

  if global.output.is_json() {
    return print_json(&info);
  }

  println!("kiln {}", info.version);
  print_stat("Platform", &info.platform);

  let Some(workspace) = info.workspace else {
    print_stat("Manifest", &format!("{} (not found)", global.manifest.display()));
    return Ok(());
  };

  print_stat("Manifest", &workspace.manifest);
  print_stat("Project", &workspace.project);
  print_stat("Configuration", workspace.configuration.as_deref().unwrap_or("none"));
  let packages = if workspace.packages.is_empty() {
    "none".to_string()
  } else {
    workspace.packages.join(", ")
  };
  print_stat("Packages", &packages);
  print_stat("Targets", &workspace.targets.to_string());
  print_stat("Build root", &workspace.build_root);
  print_stat("C++ compiler", &workspace.cxx);
  print_stat("Archiver", &workspace.ar);
  print_stat("Shell", &workspace.shell);

  Ok(())
}
