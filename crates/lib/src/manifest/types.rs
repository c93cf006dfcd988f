//! Serde schema of `kiln.toml`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::config::Configuration;
use crate::decl::Project;
use crate::execute::Toolchain;

/// One parsed manifest file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestFile {
  pub project: Option<Project>,
  pub toolchain: Option<Toolchain>,
  #[serde(default)]
  pub workspace: WorkspaceSpec,
  #[serde(default, rename = "target")]
  pub targets: Vec<TargetSpec>,
  #[serde(default, rename = "configuration")]
  pub configurations: Vec<Configuration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceSpec {
  /// Package directory, relative to the manifest.
  pub packages: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
  pub name: String,
  #[serde(default)]
  pub depends: Vec<DependSpec>,
  #[serde(default)]
  pub provides: Vec<ProvideSpec>,
  #[serde(default)]
  pub properties: BTreeMap<String, Vec<String>>,
  #[serde(default, rename = "action")]
  pub actions: Vec<ActionSpec>,
}

/// `"Library/Foo"` or `{ name = "Library/Foo", private = true, platform = "linux" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DependSpec {
  Name(String),
  Detailed(DependDetail),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependDetail {
  pub name: String,
  #[serde(default)]
  pub private: bool,
  #[serde(default)]
  pub platform: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvideSpec {
  pub name: String,
  /// Property templates appended to every dependent.
  #[serde(default)]
  pub append: BTreeMap<String, Vec<String>>,
}

/// Actions as written; file sets are expanded on conversion.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpec {
  CopyHeaders {
    root: Option<PathBuf>,
    files: Vec<String>,
  },
  StaticLibrary {
    name: String,
    root: Option<PathBuf>,
    files: Vec<String>,
  },
  Executable {
    name: String,
    root: Option<PathBuf>,
    files: Vec<String>,
  },
  Tests {
    name: String,
    root: Option<PathBuf>,
    files: Vec<String>,
    #[serde(default)]
    arguments: Vec<String>,
  },
  RunExecutable {
    name: String,
    #[serde(default)]
    arguments: Vec<String>,
  },
  Shell {
    cmd: String,
    #[serde(default)]
    env: BTreeMap<String, String>,
  },
}
