//! One orchestration run.
//!
//! configuration -> packages -> declarations -> graph -> properties -> execution
//!
//! Everything before execution is side-effect free, so configuration and
//! graph errors abort before any action runs.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::ConfigError;
use crate::consts::ENV_CONFIGURATION;
use crate::decl::{DeclError, Declarations, Project};
use crate::execute::{self, ActionRunner, CommandRunner, ExecuteConfig, ExecuteError, ExecutionReport, Toolchain};
use crate::graph::{self, GraphError, ResolutionContext, ResolvedGraph};
use crate::manifest::{Manifest, ManifestError};
use crate::propagate::{self, PropertyError, PropertyMap};
use crate::store::BuildRoot;

/// Capability prefix that marks test targets.
pub const TEST_CAPABILITY_PREFIX: &str = "Test/";

#[derive(Debug, Error)]
pub enum OrchestrateError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Decl(#[from] DeclError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Property(#[from] PropertyError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),
}

/// Options for a run.
#[derive(Debug, Clone, Default)]
pub struct OrchestrateOptions {
  /// Path to the root `kiln.toml`.
  pub manifest: PathBuf,
  /// Configuration to apply; falls back to `KILN_CONFIGURATION`, then the
  /// first declared configuration.
  pub configuration: Option<String>,
  pub goals: Vec<String>,
  /// Platform triple override; the detected platform otherwise.
  pub platform: Option<String>,
  /// Build root override; `KILN_BUILD_ROOT` or `<project>/.kiln/build` otherwise.
  pub build_root: Option<PathBuf>,
  pub execute: ExecuteConfig,
}

/// The root manifest together with every package it requires.
#[derive(Debug, Clone)]
pub struct Workspace {
  pub root: Manifest,
  pub project: Project,
  /// The configuration that was applied, if any.
  pub configuration: Option<String>,
  /// Loaded packages in load order.
  pub packages: Vec<String>,
  pub declarations: Declarations,
  pub toolchain: Toolchain,
}

impl Workspace {
  /// Names of every target that provides a `Test/*` capability.
  pub fn test_goals(&self) -> Vec<String> {
    self
      .declarations
      .targets()
      .iter()
      .filter(|t| t.provides.iter().any(|p| p.name.starts_with(TEST_CAPABILITY_PREFIX)))
      .map(|t| t.name.clone())
      .collect()
  }
}

/// A resolved run, ready to execute.
#[derive(Debug, Clone)]
pub struct Plan {
  pub workspace: Workspace,
  pub build_root: BuildRoot,
  pub graph: ResolvedGraph,
  pub properties: PropertyMap,
}

/// The outcome of a full run.
#[derive(Debug, Clone)]
pub struct Orchestration {
  pub plan: Plan,
  pub report: ExecutionReport,
}

/// Load the root manifest and the packages its configuration requires.
///
/// Public configurations of loaded packages add their own requirements; each
/// package is loaded once, in first-requested order.
pub fn load_workspace(manifest_path: &Path, configuration: Option<&str>) -> Result<Workspace, OrchestrateError> {
  let root = Manifest::load(manifest_path)?;
  let configurations = root.configurations();

  let selected = configuration
    .map(str::to_string)
    .or_else(|| std::env::var(ENV_CONFIGURATION).ok().filter(|s| !s.is_empty()))
    .or_else(|| configurations.default_name().map(str::to_string));

  let mut queue: VecDeque<String> = match &selected {
    Some(name) => configurations.resolve(name)?.into(),
    None => VecDeque::new(),
  };

  let packages_dir = root.packages_dir();
  let mut seen: HashSet<String> = queue.iter().cloned().collect();
  let mut packages = Vec::new();
  let mut manifests = Vec::new();

  while let Some(name) = queue.pop_front() {
    let package = Manifest::load_package(&packages_dir, &name)?;
    let package_configurations = package.configurations();

    for public in package_configurations.public() {
      for required in package_configurations.resolve(&public.name)? {
        if seen.insert(required.clone()) {
          debug!(package = %name, configuration = %public.name, required = %required, "public requirement");
          queue.push_back(required);
        }
      }
    }

    packages.push(name);
    manifests.push(package);
  }

  let mut project = root.file.project.clone().unwrap_or_default();
  if project.name.is_empty() {
    project.name = root
      .dir
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
  }

  let mut declarations = Declarations::new(project.clone());
  for manifest in std::iter::once(&root).chain(&manifests) {
    for target in manifest.targets()? {
      declarations.add_target(target)?;
    }
  }

  let toolchain = root.file.toolchain.clone().unwrap_or_default().with_env_overrides();

  info!(
    project = %project.name,
    configuration = ?selected,
    packages = packages.len(),
    targets = declarations.len(),
    "loaded workspace"
  );

  Ok(Workspace {
    root,
    project,
    configuration: selected,
    packages,
    declarations,
    toolchain,
  })
}

/// Resolve the graph and properties for `options.goals` without running anything.
pub fn plan(options: &OrchestrateOptions) -> Result<Plan, OrchestrateError> {
  let workspace = load_workspace(&options.manifest, options.configuration.as_deref())?;
  plan_workspace(workspace, options)
}

/// Resolve an already loaded workspace.
pub fn plan_workspace(workspace: Workspace, options: &OrchestrateOptions) -> Result<Plan, OrchestrateError> {
  let build_root = match &options.build_root {
    Some(path) => BuildRoot::new(path),
    None => BuildRoot::for_project(&workspace.root.dir),
  };

  let mut context = ResolutionContext::new(build_root.clone());
  if let Some(platform) = &options.platform {
    context = context.with_platform(platform);
  }

  let graph = graph::resolve(&workspace.declarations, &options.goals, &context)?;
  let properties = propagate::propagate(&graph)?;

  Ok(Plan {
    workspace,
    build_root,
    graph,
    properties,
  })
}

/// Run `options.goals` with the default command runner.
pub async fn orchestrate(options: &OrchestrateOptions) -> Result<Orchestration, OrchestrateError> {
  let plan = plan(options)?;
  let runner = Arc::new(CommandRunner::new(plan.workspace.toolchain.clone()));
  Ok(run_plan(plan, runner, &options.execute).await)
}

/// Execute a plan with the given runner.
pub async fn run_plan<R: ActionRunner>(plan: Plan, runner: Arc<R>, config: &ExecuteConfig) -> Orchestration {
  let report = execute::execute(&plan.graph, &plan.properties, runner, config).await;
  Orchestration { plan, report }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::consts::{ENV_PACKAGES, MANIFEST_FILE};
  use serial_test::serial;
  use tempfile::TempDir;

  fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
  }

  fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    write(
      temp.path(),
      MANIFEST_FILE,
      r#"
[project]
name = "numerics"

[[target]]
name = "numerics-library"
depends = ["Platform/Host"]
provides = [{ name = "Library/Numerics" }]

[[target]]
name = "numerics-tests"
depends = ["Library/Numerics", "Library/UnitTest"]
provides = [{ name = "Test/Numerics" }]

[[configuration]]
name = "development"
requires = ["platforms", "unit-test"]

[[configuration]]
name = "bare"
"#,
    );
    write(
      temp.path(),
      "packages/platforms/kiln.toml",
      r#"
[[target]]
name = "platform-host"
provides = [{ name = "Platform/Host", append = { cxxflags = ["-DHOST"] } }]

[[configuration]]
name = "platforms"
public = true
requires = ["build-files"]
"#,
    );
    write(
      temp.path(),
      "packages/unit-test/kiln.toml",
      r#"
[[target]]
name = "unit-test"
provides = [{ name = "Library/UnitTest" }]
"#,
    );
    write(
      temp.path(),
      "packages/build-files/kiln.toml",
      r#"
[[target]]
name = "build-files"
provides = [{ name = "Build/Files" }]
"#,
    );
    temp
  }

  #[test]
  #[serial]
  fn loads_packages_from_default_configuration() {
    let temp = project();
    temp_env::with_vars([(ENV_CONFIGURATION, None::<&str>), (ENV_PACKAGES, None)], || {
      let workspace = load_workspace(&temp.path().join(MANIFEST_FILE), None).unwrap();

      assert_eq!(workspace.configuration.as_deref(), Some("development"));
      assert_eq!(workspace.packages, vec!["platforms", "unit-test", "build-files"]);
      let names: Vec<&str> = workspace.declarations.targets().iter().map(|t| t.name.as_str()).collect();
      assert_eq!(
        names,
        vec!["numerics-library", "numerics-tests", "platform-host", "unit-test", "build-files"]
      );
      assert_eq!(workspace.test_goals(), vec!["numerics-tests"]);
    });
  }

  #[test]
  #[serial]
  fn configuration_from_env() {
    let temp = project();
    temp_env::with_vars([(ENV_CONFIGURATION, Some("bare")), (ENV_PACKAGES, None)], || {
      let workspace = load_workspace(&temp.path().join(MANIFEST_FILE), None).unwrap();
      assert_eq!(workspace.configuration.as_deref(), Some("bare"));
      assert!(workspace.packages.is_empty());
    });
  }

  #[test]
  #[serial]
  fn unknown_configuration_aborts() {
    let temp = project();
    temp_env::with_var(ENV_PACKAGES, None::<&str>, || {
      let err = load_workspace(&temp.path().join(MANIFEST_FILE), Some("release")).unwrap_err();
      assert!(matches!(err, OrchestrateError::Config(ConfigError::UnknownConfiguration(name)) if name == "release"));
    });
  }

  #[test]
  #[serial]
  fn missing_package_aborts() {
    let temp = project();
    std::fs::remove_dir_all(temp.path().join("packages/unit-test")).unwrap();
    temp_env::with_var(ENV_PACKAGES, None::<&str>, || {
      let err = load_workspace(&temp.path().join(MANIFEST_FILE), None).unwrap_err();
      assert!(matches!(
        err,
        OrchestrateError::Manifest(ManifestError::PackageNotFound { ref name, .. }) if name == "unit-test"
      ));
    });
  }

  #[test]
  #[serial]
  fn duplicate_target_across_packages() {
    let temp = project();
    write(
      temp.path(),
      "packages/unit-test/kiln.toml",
      "[[target]]\nname = \"numerics-library\"\n",
    );
    temp_env::with_var(ENV_PACKAGES, None::<&str>, || {
      let err = load_workspace(&temp.path().join(MANIFEST_FILE), None).unwrap_err();
      assert!(matches!(err, OrchestrateError::Decl(DeclError::DuplicateTargetName(_))));
    });
  }

  #[test]
  #[serial]
  fn plan_resolves_goals_and_properties() {
    let temp = project();
    temp_env::with_var(ENV_PACKAGES, None::<&str>, || {
      let options = OrchestrateOptions {
        manifest: temp.path().join(MANIFEST_FILE),
        goals: vec!["numerics-tests".to_string()],
        build_root: Some(temp.path().join("out")),
        ..Default::default()
      };

      let plan = plan(&options).unwrap();
      assert_eq!(
        plan.graph.order(),
        vec!["platform-host", "numerics-library", "unit-test", "numerics-tests"]
      );
      assert_eq!(
        plan.properties.effective("numerics-tests").unwrap().get("cxxflags"),
        ["-DHOST"]
      );
      assert_eq!(plan.build_root.path(), temp.path().join("out"));
    });
  }
}
