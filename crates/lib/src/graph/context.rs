use crate::platform::platform_triple;
use crate::store::BuildRoot;

/// Everything a resolution pass depends on besides the declarations.
///
/// Passed explicitly to each stage instead of living in shared state, so two
/// runs over the same declarations and context resolve identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
  /// Platform triple that platform-scoped dependency edges are matched against.
  pub platform: String,
  pub build_root: BuildRoot,
}

impl ResolutionContext {
  pub fn new(build_root: BuildRoot) -> Self {
    Self {
      platform: platform_triple(),
      build_root,
    }
  }

  pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
    self.platform = platform.into();
    self
  }
}
