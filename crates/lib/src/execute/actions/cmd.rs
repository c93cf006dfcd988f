//! Process execution for actions.
//!
//! Shell commands run with a reduced environment: only `PATH` and `HOME` are
//! inherited, everything else comes from the target.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Output;

use tokio::process::Command;
use tracing::{debug, info};

use crate::execute::types::{ActionOutput, ExecuteError};

/// Execute a shell command.
///
/// The environment is cleared except for `PATH` and `HOME`; `out`,
/// `TMPDIR` and the entries of `env` are set on top.
///
/// # Arguments
///
/// * `cmd` - The command string to execute
/// * `env` - Environment variables for the command
/// * `cwd` - Working directory
/// * `out_dir` - The target's output directory
/// * `shell` - The shell to run the command with
pub async fn execute_cmd(
  cmd: &str,
  env: &BTreeMap<String, String>,
  cwd: &Path,
  out_dir: &Path,
  shell: &str,
) -> Result<ActionOutput, ExecuteError> {
  info!(cmd = %cmd, "executing command");

  let tmp_dir = out_dir.join("tmp");
  tokio::fs::create_dir_all(&tmp_dir).await?;

  let (shell_cmd, shell_args) = get_shell(shell);

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(cmd)
    .current_dir(cwd)
    .env_clear()
    .env("TMPDIR", &tmp_dir)
    .env("out", out_dir)
    .env("LANG", "C")
    .env("LC_ALL", "C");

  for inherited in ["PATH", "HOME"] {
    if let Some(value) = std::env::var_os(inherited) {
      command.env(inherited, value);
    }
  }

  for (key, value) in env {
    command.env(key, value);
  }

  debug!(shell = %shell_cmd, working_dir = ?cwd, "spawning process");
  collect(command.output().await?)
}

/// Execute a program directly, without a shell.
pub async fn execute_program<I, S>(program: &OsStr, args: I, cwd: &Path) -> Result<ActionOutput, ExecuteError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  let mut command = Command::new(program);
  command.args(args).current_dir(cwd);

  debug!(program = ?program, working_dir = ?cwd, "spawning process");
  collect(command.output().await?)
}

fn collect(output: Output) -> Result<ActionOutput, ExecuteError> {
  let result = ActionOutput {
    status: output.status.code(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
  };

  if !result.is_success() {
    if !result.stderr.is_empty() {
      debug!(stderr = %result.stderr, "command stderr");
    }
    if !result.stdout.is_empty() {
      debug!(stdout = %result.stdout, "command stdout");
    }
  }

  Ok(result)
}

/// Get the shell command and the arguments that precede the command string.
fn get_shell(shell: &str) -> (String, Vec<String>) {
  let args = if shell.contains("powershell") || shell.contains("pwsh") {
    vec!["-NoProfile".to_string(), "-Command".to_string()]
  } else if shell.ends_with("cmd") || shell.ends_with("cmd.exe") {
    vec!["/C".to_string()]
  } else {
    vec!["-c".to_string()]
  };
  (shell.to_string(), args)
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use tempfile::TempDir;

  async fn sh(cmd: &str, env: &BTreeMap<String, String>, out_dir: &Path) -> ActionOutput {
    execute_cmd(cmd, env, out_dir, out_dir, "/bin/sh").await.unwrap()
  }

  #[tokio::test]
  async fn execute_simple_command() {
    let temp_dir = TempDir::new().unwrap();

    let result = sh("echo hello", &BTreeMap::new(), temp_dir.path()).await;

    assert!(result.is_success());
    assert_eq!(result.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn execute_command_with_env() {
    let temp_dir = TempDir::new().unwrap();
    let env = BTreeMap::from([("MY_VAR".to_string(), "my_value".to_string())]);

    let result = sh("echo $MY_VAR", &env, temp_dir.path()).await;

    assert_eq!(result.stdout.trim(), "my_value");
  }

  #[tokio::test]
  async fn execute_command_out_env_set() {
    let temp_dir = TempDir::new().unwrap();

    let result = sh("echo $out", &BTreeMap::new(), temp_dir.path()).await;

    assert_eq!(result.stdout.trim(), temp_dir.path().to_string_lossy());
  }

  #[test]
  #[serial_test::serial]
  fn execute_command_drops_unrelated_env() {
    let temp_dir = TempDir::new().unwrap();

    let result = temp_env::with_var("KILN_LEAK_CHECK", Some("leaked"), || {
      tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(sh("echo \"[$KILN_LEAK_CHECK]\"", &BTreeMap::new(), temp_dir.path()))
    });

    assert_eq!(result.stdout.trim(), "[]");
  }

  #[tokio::test]
  async fn execute_command_failure_keeps_status_and_output() {
    let temp_dir = TempDir::new().unwrap();

    let result = sh("echo broken >&2; exit 3", &BTreeMap::new(), temp_dir.path()).await;

    assert_eq!(result.status, Some(3));
    assert!(!result.is_success());
    assert_eq!(result.stderr.trim(), "broken");
  }

  #[tokio::test]
  async fn execute_command_creates_tmp_dir() {
    let temp_dir = TempDir::new().unwrap();

    sh("echo $TMPDIR", &BTreeMap::new(), temp_dir.path()).await;

    assert!(temp_dir.path().join("tmp").exists());
  }

  #[tokio::test]
  async fn execute_command_with_cwd() {
    let temp_dir = TempDir::new().unwrap();
    let sub_dir = temp_dir.path().join("subdir");
    tokio::fs::create_dir(&sub_dir).await.unwrap();

    execute_cmd("touch cwd_marker", &BTreeMap::new(), &sub_dir, temp_dir.path(), "/bin/sh")
      .await
      .unwrap();

    assert!(sub_dir.join("cwd_marker").exists());
  }

  #[tokio::test]
  async fn execute_program_passes_arguments() {
    let temp_dir = TempDir::new().unwrap();

    let result = execute_program(OsStr::new("echo"), ["--verbose", "a b"], temp_dir.path())
      .await
      .unwrap();

    assert_eq!(result.stdout.trim(), "--verbose a b");
  }

  #[tokio::test]
  async fn execute_missing_program_is_io_error() {
    let temp_dir = TempDir::new().unwrap();

    let result = execute_program(OsStr::new("/nonexistent/kiln-tool"), Vec::<&str>::new(), temp_dir.path()).await;

    assert!(matches!(result, Err(ExecuteError::Io(_))));
  }

  #[test]
  fn get_shell_detects_arguments() {
    assert_eq!(get_shell("/usr/bin/bash"), ("/usr/bin/bash".to_string(), vec!["-c".to_string()]));
    assert_eq!(get_shell("pwsh").1, vec!["-NoProfile", "-Command"]);
    assert_eq!(get_shell("cmd.exe").1, vec!["/C"]);
  }
}
