use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;

use crate::decl::{BuildAction, PropertySet};
use crate::execute::types::{ActionOutput, ExecuteError};
use crate::util::hash::ContentHash;

/// Everything an action needs, captured when its target becomes ready.
#[derive(Debug, Clone)]
pub struct ActionRequest {
  pub target: String,
  pub action: BuildAction,
  /// The target's private output directory.
  pub out_dir: PathBuf,
  /// Directory of the manifest that declared the target.
  pub package_path: PathBuf,
  /// Planned named outputs of the target.
  pub outputs: BTreeMap<String, PathBuf>,
  /// The target's effective property set.
  pub properties: PropertySet,
  /// Caller arguments, set only for test and run actions of goal targets.
  pub arguments: Vec<String>,
}

/// Executes one build action.
///
/// The scheduler treats runners as black boxes: an `Ok` output with a
/// non-zero status fails the target the same way an `Err` does.
pub trait ActionRunner: Send + Sync + 'static {
  fn run(&self, request: ActionRequest) -> impl Future<Output = Result<ActionOutput, ExecuteError>> + Send;

  /// Identifies the external tools behind this runner.
  ///
  /// Folded into every rebuild signature, so changing tools rebuilds
  /// cached targets.
  fn fingerprint(&self) -> Option<ContentHash> {
    None
  }
}
