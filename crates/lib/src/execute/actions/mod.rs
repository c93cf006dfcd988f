//! The default action runner.
//!
//! Compiles, archives and links with an external toolchain, runs test
//! binaries and executables, copies headers, and runs shell commands.

pub mod cmd;
mod cxx;

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::{ENV_AR, ENV_CXX, ENV_SHELL, props};
use crate::decl::{BuildAction, TargetOutputs};
use crate::execute::runner::{ActionRequest, ActionRunner};
use crate::execute::types::{ActionOutput, ExecuteError};
use crate::placeholder;
use crate::util::hash::{self, ContentHash};

pub use cmd::{execute_cmd, execute_program};

/// External tools used by [`CommandRunner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
  pub cxx: String,
  pub ar: String,
  pub shell: String,
}

impl Default for Toolchain {
  fn default() -> Self {
    Self {
      cxx: "c++".to_string(),
      ar: "ar".to_string(),
      shell: default_shell().to_string(),
    }
  }
}

impl Toolchain {
  /// Apply `KILN_CXX`, `KILN_AR` and `KILN_SHELL` on top of `self`.
  pub fn with_env_overrides(mut self) -> Self {
    for (var, slot) in [
      (ENV_CXX, &mut self.cxx),
      (ENV_AR, &mut self.ar),
      (ENV_SHELL, &mut self.shell),
    ] {
      if let Ok(value) = std::env::var(var)
        && !value.is_empty()
      {
        *slot = value;
      }
    }
    self
  }

  /// Hash of the tool names, NUL-separated.
  pub fn fingerprint(&self) -> ContentHash {
    hash::hash_bytes(format!("{}\0{}\0{}", self.cxx, self.ar, self.shell).as_bytes())
  }
}

/// Use the system shell rather than `$SHELL`, which may source user profiles.
fn default_shell() -> &'static str {
  if cfg!(windows) { "powershell.exe" } else { "/bin/sh" }
}

/// Accumulated output of a multi-step action.
pub(crate) struct Steps {
  output: ActionOutput,
}

impl Steps {
  fn new() -> Self {
    Self {
      output: ActionOutput::success(""),
    }
  }

  /// Record one step. Returns whether it succeeded.
  fn record(&mut self, step: ActionOutput) -> bool {
    self.output.stdout.push_str(&step.stdout);
    self.output.stderr.push_str(&step.stderr);
    self.output.status = step.status;
    step.is_success()
  }

  fn finish(self) -> ActionOutput {
    self.output
  }
}

/// Runs actions as external processes.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
  toolchain: Toolchain,
}

impl CommandRunner {
  pub fn new(toolchain: Toolchain) -> Self {
    Self { toolchain }
  }

  pub fn toolchain(&self) -> &Toolchain {
    &self.toolchain
  }
}

impl ActionRunner for CommandRunner {
  async fn run(&self, request: ActionRequest) -> Result<ActionOutput, ExecuteError> {
    info!(target = %request.target, action = request.action.kind(), "running action");

    let cwd = working_dir(&request);
    let mut steps = Steps::new();

    match &request.action {
      BuildAction::CopyHeaders { root, files } => {
        let count = copy_headers(root, files, &request.out_dir.join("include")).await?;
        debug!(target = %request.target, count, "copied headers");
      }

      BuildAction::StaticLibrary { name, sources } => {
        let library = request.out_dir.join("lib").join(format!("lib{name}.a"));
        if let Some(objects) = cxx::compile(&self.toolchain, &request, sources, &cwd, &mut steps).await? {
          cxx::archive(&self.toolchain, &library, &objects, &cwd, &mut steps).await?;
        }
      }

      BuildAction::Executable { name, sources } => {
        let binary = request.out_dir.join("bin").join(name);
        if let Some(objects) = cxx::compile(&self.toolchain, &request, sources, &cwd, &mut steps).await? {
          cxx::link(&self.toolchain, &request, &binary, &objects, &cwd, &mut steps).await?;
        }
      }

      BuildAction::Tests {
        name,
        sources,
        arguments,
      } => {
        let binary = request.out_dir.join("tests").join(name);
        if let Some(objects) = cxx::compile(&self.toolchain, &request, sources, &cwd, &mut steps).await?
          && cxx::link(&self.toolchain, &request, &binary, &objects, &cwd, &mut steps).await?
        {
          let args = arguments.iter().chain(&request.arguments);
          steps.record(execute_program(binary.as_os_str(), args, &cwd).await?);
        }
      }

      BuildAction::RunExecutable { name, arguments } => {
        let binary = find_executable(&request, name)?;
        let args = arguments.iter().chain(&request.arguments);
        steps.record(execute_program(binary.as_os_str(), args, &cwd).await?);
      }

      BuildAction::Shell { cmd, env } => {
        let own = TargetOutputs {
          out_dir: request.out_dir.clone(),
          package_path: request.package_path.clone(),
          outputs: request.outputs.clone(),
        };

        let cmd = placeholder::substitute(cmd, &own)?;
        let mut vars = BTreeMap::new();
        vars.insert("KILN_TARGET".to_string(), request.target.clone());
        for (key, values) in request.properties.iter() {
          vars.insert(property_var(key), values.join(" "));
        }
        for (key, value) in env {
          vars.insert(key.clone(), placeholder::substitute(value, &own)?);
        }

        steps.record(execute_cmd(&cmd, &vars, &cwd, &request.out_dir, &self.toolchain.shell).await?);
      }
    }

    Ok(steps.finish())
  }

  fn fingerprint(&self) -> Option<ContentHash> {
    Some(self.toolchain.fingerprint())
  }
}

/// Actions run from the declaring package, or the output directory for
/// targets declared without one.
fn working_dir(request: &ActionRequest) -> PathBuf {
  if request.package_path.as_os_str().is_empty() {
    request.out_dir.clone()
  } else {
    request.package_path.clone()
  }
}

/// `KILN_PROP_<KEY>`, upper-cased, with non-alphanumerics replaced by `_`.
fn property_var(key: &str) -> String {
  let key: String = key
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
    .collect();
  format!("KILN_PROP_{key}")
}

/// Copy headers into `include`, keeping their path relative to `root`.
///
/// `include` is rebuilt from scratch so headers removed from the source
/// tree stop being exported.
async fn copy_headers(root: &Path, files: &[PathBuf], include: &Path) -> Result<usize, ExecuteError> {
  match tokio::fs::remove_dir_all(include).await {
    Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
    _ => {}
  }
  tokio::fs::create_dir_all(include).await?;

  for file in files {
    let relative = match file.strip_prefix(root) {
      Ok(relative) => relative,
      Err(_) => Path::new(file.file_name().unwrap_or(file.as_os_str())),
    };
    let dest = include.join(relative);
    if let Some(parent) = dest.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(file, &dest).await?;
  }

  Ok(files.len())
}

/// Find an executable published through the `executables` property.
fn find_executable(request: &ActionRequest, name: &str) -> Result<PathBuf, ExecuteError> {
  request
    .properties
    .get(props::EXECUTABLES)
    .iter()
    .map(PathBuf::from)
    .find(|path| path.file_name() == Some(OsStr::new(name)))
    .ok_or_else(|| ExecuteError::ExecutableNotFound(name.to_string()))
}
