use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::outputs;
use crate::placeholder::{self, PlaceholderError, Resolver};

/// Project identity. Loaded once from the root manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
  pub name: String,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub summary: Option<String>,
  #[serde(default)]
  pub license: Option<String>,
  #[serde(default)]
  pub version: Option<String>,
  #[serde(default)]
  pub authors: Vec<Author>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
  pub name: String,
  #[serde(default)]
  pub email: Option<String>,
}

/// Whether a dependency's exported properties travel past the dependent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
  #[default]
  Public,
  Private,
}

impl fmt::Display for Visibility {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Visibility::Public => write!(f, "public"),
      Visibility::Private => write!(f, "private"),
    }
  }
}

/// The platforms a dependency edge applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformScope {
  #[default]
  Any,
  Only(String),
}

impl PlatformScope {
  /// Check the scope against a platform triple such as `x86_64-linux`.
  ///
  /// A bare OS (`linux`) or architecture (`x86_64`) matches the corresponding
  /// component of the triple.
  pub fn matches(&self, platform: &str) -> bool {
    match self {
      PlatformScope::Any => true,
      PlatformScope::Only(wanted) => {
        wanted == platform || platform.split('-').any(|component| component == wanted.as_str())
      }
    }
  }
}

/// A dependency from a target on a named capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
  pub capability: String,
  pub visibility: Visibility,
  pub platform: PlatformScope,
}

impl DependencyEdge {
  pub fn public(capability: impl Into<String>) -> Self {
    Self {
      capability: capability.into(),
      visibility: Visibility::Public,
      platform: PlatformScope::Any,
    }
  }

  pub fn private(capability: impl Into<String>) -> Self {
    Self {
      capability: capability.into(),
      visibility: Visibility::Private,
      platform: PlatformScope::Any,
    }
  }

  pub fn on_platform(mut self, platform: impl Into<String>) -> Self {
    self.platform = PlatformScope::Only(platform.into());
    self
  }
}

/// A symbolic build action with already-expanded inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildAction {
  /// Copy header files into `<out>/include`, keeping their path relative to `root`.
  CopyHeaders { root: PathBuf, files: Vec<PathBuf> },
  StaticLibrary { name: String, sources: Vec<PathBuf> },
  Executable { name: String, sources: Vec<PathBuf> },
  /// Build a test binary from `sources` and run it.
  Tests {
    name: String,
    sources: Vec<PathBuf>,
    arguments: Vec<String>,
  },
  /// Run an executable published through the `executables` property.
  RunExecutable { name: String, arguments: Vec<String> },
  Shell { cmd: String, env: BTreeMap<String, String> },
}

impl BuildAction {
  /// Human-readable action kind, as it appears in logs and reports.
  pub fn kind(&self) -> &'static str {
    match self {
      BuildAction::CopyHeaders { .. } => "copy headers",
      BuildAction::StaticLibrary { .. } => "build static_library",
      BuildAction::Executable { .. } => "build executable",
      BuildAction::Tests { .. } => "run tests",
      BuildAction::RunExecutable { .. } => "run executable",
      BuildAction::Shell { .. } => "shell",
    }
  }

  /// Actions whose result is fully described by their inputs and outputs.
  pub fn is_cacheable(&self) -> bool {
    matches!(
      self,
      BuildAction::CopyHeaders { .. } | BuildAction::StaticLibrary { .. } | BuildAction::Executable { .. }
    )
  }

  /// Test and run actions receive the caller's arguments.
  pub fn forwards_arguments(&self) -> bool {
    matches!(self, BuildAction::Tests { .. } | BuildAction::RunExecutable { .. })
  }

  /// Input files read by the action.
  pub fn inputs(&self) -> &[PathBuf] {
    match self {
      BuildAction::CopyHeaders { files, .. } => files,
      BuildAction::StaticLibrary { sources, .. }
      | BuildAction::Executable { sources, .. }
      | BuildAction::Tests { sources, .. } => sources,
      BuildAction::RunExecutable { .. } | BuildAction::Shell { .. } => &[],
    }
  }

  /// Named outputs the action produces inside `out_dir`.
  pub fn outputs(&self, out_dir: &Path) -> Vec<(&'static str, PathBuf)> {
    match self {
      BuildAction::CopyHeaders { .. } => vec![(outputs::HEADERS, out_dir.join("include"))],
      BuildAction::StaticLibrary { name, .. } => {
        vec![(outputs::LIBRARY, out_dir.join("lib").join(format!("lib{}.a", name)))]
      }
      BuildAction::Executable { name, .. } => vec![(outputs::EXECUTABLE, out_dir.join("bin").join(name))],
      BuildAction::Tests { name, .. } => vec![(outputs::TEST_EXECUTABLE, out_dir.join("tests").join(name))],
      BuildAction::RunExecutable { .. } | BuildAction::Shell { .. } => Vec::new(),
    }
  }
}

/// Ordered key -> values bag of build properties.
///
/// Values are lists, not sets: flags may repeat and their order carries
/// precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertySet(BTreeMap<String, Vec<String>>);

impl PropertySet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.0.entry(key.into()).or_default().push(value.into());
  }

  /// Append every list of `other` after the existing values for the same key.
  pub fn extend(&mut self, other: &PropertySet) {
    for (key, values) in &other.0 {
      self.0.entry(key.clone()).or_default().extend(values.iter().cloned());
    }
  }

  pub fn get(&self, key: &str) -> &[String] {
    self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
    self.0.iter()
  }

  pub fn is_empty(&self) -> bool {
    self.0.values().all(Vec::is_empty)
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertySet {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut set = PropertySet::new();
    for (key, value) in iter {
      set.append(key, value);
    }
    set
  }
}

/// The outputs a target realizes, known before it runs.
///
/// Output locations are derived from the target name and action kinds, so
/// they can be handed to contribution functions ahead of execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutputs {
  pub out_dir: PathBuf,
  pub package_path: PathBuf,
  pub outputs: BTreeMap<String, PathBuf>,
}

impl TargetOutputs {
  pub fn plan(decl: &TargetDecl, out_dir: PathBuf) -> Self {
    let outputs = decl
      .actions
      .iter()
      .flat_map(|action| action.outputs(&out_dir))
      .map(|(name, path)| (name.to_string(), path))
      .collect();

    Self {
      package_path: decl.package_path.clone(),
      out_dir,
      outputs,
    }
  }

  pub fn output(&self, name: &str) -> Option<&Path> {
    self.outputs.get(name).map(PathBuf::as_path)
  }
}

fn path_str(path: &Path) -> Result<&str, PlaceholderError> {
  path
    .to_str()
    .ok_or_else(|| PlaceholderError::NonUtf8Path(path.display().to_string()))
}

impl Resolver for TargetOutputs {
  fn resolve_out(&self) -> Result<&str, PlaceholderError> {
    path_str(&self.out_dir)
  }

  fn resolve_output(&self, name: &str) -> Result<&str, PlaceholderError> {
    let path = self
      .outputs
      .get(name)
      .ok_or_else(|| PlaceholderError::UnresolvedOutput(name.to_string()))?;
    path_str(path)
  }

  fn resolve_package(&self) -> Result<&str, PlaceholderError> {
    path_str(&self.package_path)
  }
}

/// Failure while evaluating a contribution function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContributionError {
  #[error(transparent)]
  Placeholder(#[from] PlaceholderError),

  #[error("{0}")]
  Message(String),
}

type ContributeFn = dyn Fn(&TargetOutputs) -> Result<Vec<(String, String)>, ContributionError> + Send + Sync;

/// Deferred computation of the properties a provision hands to dependents.
///
/// Evaluated by the property propagator with the provider's realized outputs.
#[derive(Clone)]
pub struct Contribution(Arc<ContributeFn>);

impl Contribution {
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(&TargetOutputs) -> Result<Vec<(String, String)>, ContributionError> + Send + Sync + 'static,
  {
    Self(Arc::new(f))
  }

  /// A contribution that appends nothing.
  pub fn none() -> Self {
    Self::new(|_| Ok(Vec::new()))
  }

  /// Append `(key, template)` pairs, substituting `$${out}`, `$${output:NAME}`
  /// and `$${package}` from the provider's outputs.
  pub fn templates(entries: Vec<(String, String)>) -> Self {
    Self::new(move |outputs| {
      entries
        .iter()
        .map(|(key, template)| Ok((key.clone(), placeholder::substitute(template, outputs)?)))
        .collect()
    })
  }

  pub fn evaluate(&self, outputs: &TargetOutputs) -> Result<Vec<(String, String)>, ContributionError> {
    (self.0)(outputs)
  }
}

impl fmt::Debug for Contribution {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Contribution(..)")
  }
}

/// A capability a target exposes to its dependents.
#[derive(Debug, Clone)]
pub struct Provision {
  pub name: String,
  pub contribution: Contribution,
}

impl Provision {
  pub fn new(name: impl Into<String>, contribution: Contribution) -> Self {
    Self {
      name: name.into(),
      contribution,
    }
  }

  pub fn bare(name: impl Into<String>) -> Self {
    Self::new(name, Contribution::none())
  }
}

/// A declared target, before graph resolution.
#[derive(Debug, Clone, Default)]
pub struct TargetDecl {
  pub name: String,
  pub package_path: PathBuf,
  pub actions: Vec<BuildAction>,
  pub depends: Vec<DependencyEdge>,
  pub provides: Vec<Provision>,
  /// Properties that apply to this target's own actions only.
  pub properties: PropertySet,
}

impl TargetDecl {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  pub fn with_package_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.package_path = path.into();
    self
  }

  pub fn with_action(mut self, action: BuildAction) -> Self {
    self.actions.push(action);
    self
  }

  pub fn depends(mut self, edge: DependencyEdge) -> Self {
    self.depends.push(edge);
    self
  }

  pub fn provides(mut self, provision: Provision) -> Self {
    self.provides.push(provision);
    self
  }

  pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.properties.append(key, value);
    self
  }

  pub fn provision(&self, capability: &str) -> Option<&Provision> {
    self.provides.iter().find(|p| p.name == capability)
  }
}
