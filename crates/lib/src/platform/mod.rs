use std::fmt;

/// Platform identifier combining architecture and OS (e.g., "aarch64-darwin").
///
/// Dependency edges scoped to a platform are matched against this triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: String,
  pub os: String,
}

impl Platform {
  pub fn new(arch: impl Into<String>, os: impl Into<String>) -> Self {
    Self {
      arch: arch.into(),
      os: os.into(),
    }
  }

  /// Detect the platform the orchestrator runs on.
  pub fn current() -> Self {
    let os = match std::env::consts::OS {
      "macos" => "darwin",
      other => other,
    };
    Self::new(std::env::consts::ARCH, os)
  }

  /// Returns the platform triple string (e.g., "aarch64-darwin")
  pub fn triple(&self) -> String {
    format!("{}-{}", self.arch, self.os)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}

/// Returns the platform triple for the current system.
pub fn platform_triple() -> String {
  Platform::current().triple()
}
