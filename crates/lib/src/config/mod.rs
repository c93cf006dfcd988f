//! Named configurations and their flattening into required packages.
//!
//! A configuration imports other configurations and requires packages.
//! Resolving one walks its imports depth-first (imports before the
//! configuration's own requirements) and keeps the first occurrence of every
//! package.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("unknown configuration: {0}")]
  UnknownConfiguration(String),

  #[error("cyclic configuration import: {}", .path.join(" -> "))]
  CyclicImport { path: Vec<String> },
}

/// A named, composable bundle of required packages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
  pub name: String,
  #[serde(default)]
  pub imports: Vec<String>,
  #[serde(default)]
  pub requires: Vec<String>,
  /// Public configurations of a package apply to every project requiring it.
  #[serde(default)]
  pub public: bool,
  /// Free-form settings, e.g. `source`.
  #[serde(default)]
  pub options: BTreeMap<String, String>,
}

impl Configuration {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  pub fn import(mut self, name: impl Into<String>) -> Self {
    self.imports.push(name.into());
    self
  }

  pub fn require(mut self, package: impl Into<String>) -> Self {
    self.requires.push(package.into());
    self
  }

  pub fn public(mut self) -> Self {
    self.public = true;
    self
  }
}

/// All configurations known to one manifest, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationSet {
  configurations: Vec<Configuration>,
  index: HashMap<String, usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
  Visiting,
  Visited,
}

impl ConfigurationSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a configuration. A later definition with the same name replaces
  /// the earlier one but keeps its position.
  pub fn insert(&mut self, configuration: Configuration) {
    match self.index.get(&configuration.name) {
      Some(&i) => self.configurations[i] = configuration,
      None => {
        self.index.insert(configuration.name.clone(), self.configurations.len());
        self.configurations.push(configuration);
      }
    }
  }

  pub fn get(&self, name: &str) -> Option<&Configuration> {
    self.index.get(name).map(|&i| &self.configurations[i])
  }

  /// The first declared configuration, used when none is requested.
  pub fn default_name(&self) -> Option<&str> {
    self.configurations.first().map(|c| c.name.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = &Configuration> {
    self.configurations.iter()
  }

  pub fn public(&self) -> impl Iterator<Item = &Configuration> {
    self.configurations.iter().filter(|c| c.public)
  }

  pub fn is_empty(&self) -> bool {
    self.configurations.is_empty()
  }

  /// Flatten `name` into an ordered, duplicate-free list of required packages.
  pub fn resolve(&self, name: &str) -> Result<Vec<String>, ConfigError> {
    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    let mut seen = HashSet::new();
    let mut packages = Vec::new();

    self.visit(name, &mut marks, &mut stack, &mut seen, &mut packages)?;

    debug!(configuration = %name, packages = ?packages, "resolved configuration");
    Ok(packages)
  }

  fn visit<'a>(
    &'a self,
    name: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
    seen: &mut HashSet<&'a str>,
    packages: &mut Vec<String>,
  ) -> Result<(), ConfigError> {
    match marks.get(name) {
      Some(Mark::Visited) => return Ok(()),
      Some(Mark::Visiting) => {
        let start = stack.iter().position(|n| *n == name).unwrap_or(0);
        let mut path: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
        path.push(name.to_string());
        return Err(ConfigError::CyclicImport { path });
      }
      None => {}
    }

    let configuration = self
      .get(name)
      .ok_or_else(|| ConfigError::UnknownConfiguration(name.to_string()))?;

    marks.insert(name, Mark::Visiting);
    stack.push(name);

    for import in &configuration.imports {
      trace!(configuration = %name, import = %import, "following import");
      self.visit(import, marks, stack, seen, packages)?;
    }

    for package in &configuration.requires {
      if seen.insert(package.as_str()) {
        packages.push(package.clone());
      }
    }

    stack.pop();
    marks.insert(name, Mark::Visited);
    Ok(())
  }
}

impl FromIterator<Configuration> for ConfigurationSet {
  fn from_iter<I: IntoIterator<Item = Configuration>>(iter: I) -> Self {
    let mut set = ConfigurationSet::new();
    for configuration in iter {
      set.insert(configuration);
    }
    set
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn imports_come_before_own_requirements() {
    let set: ConfigurationSet = vec![
      Configuration::new("development")
        .import("numerics")
        .require("platforms")
        .require("unit-test"),
      Configuration::new("numerics").public().require("build-files"),
    ]
    .into_iter()
    .collect();

    assert_eq!(
      set.resolve("development").unwrap(),
      vec!["build-files", "platforms", "unit-test"]
    );
  }

  #[test]
  fn first_occurrence_wins() {
    let set: ConfigurationSet = vec![
      Configuration::new("top").import("a").import("b").require("x"),
      Configuration::new("a").require("x").require("y"),
      Configuration::new("b").require("z").require("y"),
    ]
    .into_iter()
    .collect();

    assert_eq!(set.resolve("top").unwrap(), vec!["x", "y", "z"]);
  }

  #[test]
  fn diamond_import_is_not_a_cycle() {
    let set: ConfigurationSet = vec![
      Configuration::new("top").import("left").import("right"),
      Configuration::new("left").import("base"),
      Configuration::new("right").import("base"),
      Configuration::new("base").require("platforms"),
    ]
    .into_iter()
    .collect();

    assert_eq!(set.resolve("top").unwrap(), vec!["platforms"]);
  }

  #[test]
  fn unknown_configuration() {
    let set: ConfigurationSet = vec![Configuration::new("a").import("missing")].into_iter().collect();

    assert_eq!(
      set.resolve("b").unwrap_err(),
      ConfigError::UnknownConfiguration("b".to_string())
    );
    assert_eq!(
      set.resolve("a").unwrap_err(),
      ConfigError::UnknownConfiguration("missing".to_string())
    );
  }

  #[test]
  fn cyclic_import_reports_path() {
    let set: ConfigurationSet = vec![Configuration::new("A").import("B"), Configuration::new("B").import("A")]
      .into_iter()
      .collect();

    let err = set.resolve("A").unwrap_err();
    assert_eq!(
      err,
      ConfigError::CyclicImport {
        path: vec!["A".to_string(), "B".to_string(), "A".to_string()]
      }
    );
    assert_eq!(err.to_string(), "cyclic configuration import: A -> B -> A");
  }

  #[test]
  fn cycle_path_starts_at_repeated_configuration() {
    let set: ConfigurationSet = vec![
      Configuration::new("root").import("A"),
      Configuration::new("A").import("B"),
      Configuration::new("B").import("A"),
    ]
    .into_iter()
    .collect();

    assert_eq!(
      set.resolve("root").unwrap_err(),
      ConfigError::CyclicImport {
        path: vec!["A".to_string(), "B".to_string(), "A".to_string()]
      }
    );
  }

  #[test]
  fn default_is_first_declared() {
    let set: ConfigurationSet = vec![Configuration::new("development"), Configuration::new("numerics")]
      .into_iter()
      .collect();
    assert_eq!(set.default_name(), Some("development"));
  }
}
