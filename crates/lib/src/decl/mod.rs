//! In-memory declaration model.
//!
//! Targets are collected into [`Declarations`] in the order they were
//! declared. That order is the tie-break for every later stage, which keeps
//! resolution and build logs reproducible.

mod types;

use std::collections::HashMap;

use thiserror::Error;
use tracing::trace;

pub use types::{
  Author, BuildAction, Contribution, ContributionError, DependencyEdge, PlatformScope, Project, PropertySet,
  Provision, TargetDecl, TargetOutputs, Visibility,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclError {
  #[error("duplicate target name: {0}")]
  DuplicateTargetName(String),

  #[error("invalid target name '{0}': only ASCII letters, digits, '.', '_' and '-' are allowed")]
  InvalidTargetName(String),
}

/// The full, visible set of target declarations for one run.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
  pub project: Project,
  targets: Vec<TargetDecl>,
  index: HashMap<String, usize>,
}

impl Declarations {
  pub fn new(project: Project) -> Self {
    Self {
      project,
      targets: Vec::new(),
      index: HashMap::new(),
    }
  }

  /// Add a target, rejecting name collisions.
  pub fn add_target(&mut self, decl: TargetDecl) -> Result<(), DeclError> {
    if !is_valid_target_name(&decl.name) {
      return Err(DeclError::InvalidTargetName(decl.name));
    }
    if self.index.contains_key(&decl.name) {
      return Err(DeclError::DuplicateTargetName(decl.name));
    }

    trace!(target = %decl.name, position = self.targets.len(), "declared target");
    self.index.insert(decl.name.clone(), self.targets.len());
    self.targets.push(decl);
    Ok(())
  }

  /// Build a declaration set from targets in order.
  pub fn from_targets(project: Project, targets: impl IntoIterator<Item = TargetDecl>) -> Result<Self, DeclError> {
    let mut decls = Self::new(project);
    for target in targets {
      decls.add_target(target)?;
    }
    Ok(decls)
  }

  pub fn get(&self, name: &str) -> Option<&TargetDecl> {
    self.index.get(name).map(|&i| &self.targets[i])
  }

  /// Declaration position of a target.
  pub fn position(&self, name: &str) -> Option<usize> {
    self.index.get(name).copied()
  }

  pub fn targets(&self) -> &[TargetDecl] {
    &self.targets
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }
}

fn is_valid_target_name(name: &str) -> bool {
  !name.is_empty()
    && name != "."
    && name != ".."
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
