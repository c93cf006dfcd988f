//! Target output locations and rebuild signatures.
//!
//! Every target writes into `<build_root>/<target name>/`. Target names are
//! unique and path-safe, so concurrently running targets never share an
//! output path.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, trace};

use crate::consts::{DEFAULT_BUILD_DIR, ENV_BUILD_ROOT, SIGNATURE_FILE};
use crate::decl::{BuildAction, PropertySet, TargetOutputs};
use crate::util::hash::{self, ContentHash, HashError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRoot(PathBuf);

impl BuildRoot {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self(path.into())
  }

  /// `KILN_BUILD_ROOT` if set, otherwise `<project_root>/.kiln/build`.
  pub fn for_project(project_root: &Path) -> Self {
    if let Ok(path) = std::env::var(ENV_BUILD_ROOT) {
      return Self::new(path);
    }
    Self::new(project_root.join(DEFAULT_BUILD_DIR))
  }

  pub fn path(&self) -> &Path {
    &self.0
  }

  pub fn target_dir(&self, target: &str) -> PathBuf {
    self.0.join(target)
  }
}

#[derive(Serialize)]
struct SignatureInput<'a> {
  target: &'a str,
  actions: &'a [BuildAction],
  properties: &'a PropertySet,
  inputs: Vec<(String, ContentHash)>,
  dependencies: &'a [ContentHash],
  toolchain: Option<&'a ContentHash>,
}

/// Compute the rebuild signature of a target.
///
/// Covers the action declarations, the content of every input file, the
/// effective properties, the signatures of the dependencies, and the
/// fingerprint of the tools that run the actions.
pub async fn compute_signature(
  target: &str,
  actions: &[BuildAction],
  properties: &PropertySet,
  dependencies: &[ContentHash],
  toolchain: Option<&ContentHash>,
) -> Result<ContentHash, HashError> {
  let mut inputs = Vec::new();
  for action in actions {
    for path in action.inputs() {
      inputs.push((path.display().to_string(), hash::hash_file(path).await?));
    }
  }

  hash::hash_json(&SignatureInput {
    target,
    actions,
    properties,
    inputs,
    dependencies,
    toolchain,
  })
}

/// A target is fresh when its stored signature matches and all outputs exist.
pub async fn is_fresh(outputs: &TargetOutputs, signature: &ContentHash) -> bool {
  let marker = outputs.out_dir.join(SIGNATURE_FILE);
  let Ok(stored) = tokio::fs::read_to_string(&marker).await else {
    trace!(marker = %marker.display(), "no signature recorded");
    return false;
  };

  if stored.trim() != signature.0 {
    debug!(out_dir = %outputs.out_dir.display(), "signature changed");
    return false;
  }

  for path in outputs.outputs.values() {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
      debug!(output = %path.display(), "output missing");
      return false;
    }
  }
  true
}

pub async fn write_signature(out_dir: &Path, signature: &ContentHash) -> std::io::Result<()> {
  tokio::fs::create_dir_all(out_dir).await?;
  tokio::fs::write(out_dir.join(SIGNATURE_FILE), &signature.0).await
}

/// Remove a recorded signature so the next run rebuilds.
pub async fn clear_signature(out_dir: &Path) -> std::io::Result<()> {
  match tokio::fs::remove_file(out_dir.join(SIGNATURE_FILE)).await {
    Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}
