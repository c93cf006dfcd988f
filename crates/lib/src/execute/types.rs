//! Types for target execution.
//!
//! This module defines the error type, the per-target outcome records, the
//! run report, and the configuration for executing a resolved graph.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::consts::ENV_JOBS;
use crate::placeholder::PlaceholderError;
use crate::util::hash::HashError;

/// Errors that can occur while executing a target.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// An action ran but exited unsuccessfully.
  #[error("{action} failed for '{target}' with exit code {}", .status.map_or_else(|| "none".to_string(), |c| c.to_string()))]
  ActionExecutionError {
    target: String,
    action: &'static str,
    status: Option<i32>,
  },

  /// A run action named an executable no dependency publishes.
  #[error("executable '{0}' not found in the 'executables' property")]
  ExecutableNotFound(String),

  /// A build action had nothing to compile.
  #[error("'{0}' has no source files")]
  NoSources(String),

  #[error("placeholder error: {0}")]
  Placeholder(#[from] PlaceholderError),

  #[error("signature error: {0}")]
  Signature(#[from] HashError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The worker task running the target panicked or was cancelled.
  #[error("worker task aborted: {0}")]
  TaskAborted(String),
}

/// Captured result of one action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
  /// Exit status; `None` when the process was terminated by a signal.
  pub status: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl ActionOutput {
  pub fn success(stdout: impl Into<String>) -> Self {
    Self {
      status: Some(0),
      stdout: stdout.into(),
      stderr: String::new(),
    }
  }

  pub fn is_success(&self) -> bool {
    self.status == Some(0)
  }
}

/// Lifecycle of a target within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
  Pending,
  Running,
  Succeeded,
  Failed,
  Skipped,
}

impl TargetState {
  pub fn is_terminal(self) -> bool {
    matches!(self, TargetState::Succeeded | TargetState::Failed | TargetState::Skipped)
  }
}

impl fmt::Display for TargetState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      TargetState::Pending => "pending",
      TargetState::Running => "running",
      TargetState::Succeeded => "succeeded",
      TargetState::Failed => "failed",
      TargetState::Skipped => "skipped",
    };
    f.write_str(s)
  }
}

/// Outcome of a single target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
  pub name: String,
  pub state: TargetState,
  /// Succeeded by reusing the outputs of an earlier run.
  pub cached: bool,
  pub duration: Duration,
  pub stdout: String,
  pub stderr: String,
  pub error: Option<String>,
  /// The failed dependency that caused a skip.
  pub failed_dependency: Option<String>,
}

impl TargetReport {
  pub(crate) fn pending(name: &str) -> Self {
    Self {
      name: name.to_string(),
      state: TargetState::Pending,
      cached: false,
      duration: Duration::ZERO,
      stdout: String::new(),
      stderr: String::new(),
      error: None,
      failed_dependency: None,
    }
  }
}

/// The first failure observed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
  pub target: String,
  pub error: String,
  pub stdout: String,
  pub stderr: String,
}

/// Result of executing a resolved graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
  /// Per-target outcomes in build order.
  pub targets: Vec<TargetReport>,
  pub first_failure: Option<FailureSummary>,
}

impl ExecutionReport {
  /// Returns true if every target succeeded.
  pub fn is_success(&self) -> bool {
    self.targets.iter().all(|t| t.state == TargetState::Succeeded)
  }

  /// Process exit code for the run: 0 on success, 1 otherwise.
  pub fn exit_code(&self) -> i32 {
    if self.is_success() { 0 } else { 1 }
  }

  pub fn get(&self, name: &str) -> Option<&TargetReport> {
    self.targets.iter().find(|t| t.name == name)
  }

  pub fn count(&self, state: TargetState) -> usize {
    self.targets.iter().filter(|t| t.state == state).count()
  }

  pub fn cached(&self) -> usize {
    self.targets.iter().filter(|t| t.cached).count()
  }
}

/// Configuration for target execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of targets to execute in parallel.
  pub parallelism: usize,

  /// Arguments forwarded to the test and run actions of goal targets.
  pub arguments: Vec<String>,

  /// Rebuild targets even when their signature is unchanged.
  pub force: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: default_parallelism(),
      arguments: Vec::new(),
      force: false,
    }
  }
}

/// `KILN_JOBS` if set to a positive number, otherwise the number of CPUs.
fn default_parallelism() -> usize {
  std::env::var(ENV_JOBS)
    .ok()
    .and_then(|v| v.parse::<usize>().ok())
    .filter(|&n| n > 0)
    .unwrap_or_else(num_cpus)
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  fn report(name: &str, state: TargetState) -> TargetReport {
    TargetReport {
      state,
      ..TargetReport::pending(name)
    }
  }

  #[test]
  fn empty_report_is_success() {
    let result = ExecutionReport::default();
    assert!(result.is_success());
    assert_eq!(result.exit_code(), 0);
  }

  #[test]
  fn any_non_success_fails_the_run() {
    let mut result = ExecutionReport::default();
    result.targets.push(report("lib", TargetState::Succeeded));
    result.targets.push(report("test", TargetState::Skipped));

    assert!(!result.is_success());
    assert_eq!(result.exit_code(), 1);
    assert_eq!(result.count(TargetState::Skipped), 1);
    assert_eq!(result.get("lib").map(|t| t.state), Some(TargetState::Succeeded));
  }

  #[test]
  fn action_error_display() {
    let err = ExecuteError::ActionExecutionError {
      target: "numerics-tests".to_string(),
      action: "run tests",
      status: Some(2),
    };
    assert_eq!(err.to_string(), "run tests failed for 'numerics-tests' with exit code 2");

    let killed = ExecuteError::ActionExecutionError {
      target: "app".to_string(),
      action: "run executable",
      status: None,
    };
    assert_eq!(killed.to_string(), "run executable failed for 'app' with exit code none");
  }

  #[test]
  fn terminal_states() {
    assert!(!TargetState::Pending.is_terminal());
    assert!(!TargetState::Running.is_terminal());
    assert!(TargetState::Skipped.is_terminal());
  }

  #[test]
  #[serial]
  fn parallelism_from_env() {
    temp_env::with_var(ENV_JOBS, Some("3"), || {
      assert_eq!(ExecuteConfig::default().parallelism, 3);
    });
    temp_env::with_var(ENV_JOBS, Some("0"), || {
      assert!(ExecuteConfig::default().parallelism >= 1);
    });
  }
}
