//! Compiler and archiver invocations.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Steps;
use super::cmd::execute_program;
use crate::consts::props;
use crate::execute::runner::ActionRequest;
use crate::execute::types::ExecuteError;
use crate::execute::Toolchain;

/// Compile every source into `<out>/obj`.
///
/// Returns `None` as soon as one compilation fails.
pub(super) async fn compile(
  toolchain: &Toolchain,
  request: &ActionRequest,
  sources: &[PathBuf],
  cwd: &Path,
  steps: &mut Steps,
) -> Result<Option<Vec<PathBuf>>, ExecuteError> {
  if sources.is_empty() {
    return Err(ExecuteError::NoSources(request.target.clone()));
  }

  let obj_dir = request.out_dir.join("obj");
  tokio::fs::create_dir_all(&obj_dir).await?;

  let mut objects = Vec::with_capacity(sources.len());
  for (i, source) in sources.iter().enumerate() {
    let stem = source.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let object = obj_dir.join(format!("{i}-{stem}.o"));

    let mut args: Vec<OsString> = vec!["-c".into(), source.into(), "-o".into(), object.clone().into()];
    args.extend(request.properties.get(props::CXXFLAGS).iter().map(OsString::from));
    args.extend(
      request
        .properties
        .get(props::HEADER_SEARCH_PATHS)
        .iter()
        .map(|path| OsString::from(format!("-I{path}"))),
    );

    debug!(target = %request.target, source = %source.display(), "compiling");
    if !steps.record(execute_program(toolchain.cxx.as_ref(), &args, cwd).await?) {
      return Ok(None);
    }
    objects.push(object);
  }

  Ok(Some(objects))
}

/// Archive objects into a static library, replacing any previous archive.
pub(super) async fn archive(
  toolchain: &Toolchain,
  library: &Path,
  objects: &[PathBuf],
  cwd: &Path,
  steps: &mut Steps,
) -> Result<bool, ExecuteError> {
  if let Some(parent) = library.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  match tokio::fs::remove_file(library).await {
    Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
    _ => {}
  }

  let mut args: Vec<OsString> = vec!["rcs".into(), library.into()];
  args.extend(objects.iter().map(OsString::from));

  Ok(steps.record(execute_program(toolchain.ar.as_ref(), &args, cwd).await?))
}

/// Link objects into a binary with the target's `linkflags`.
pub(super) async fn link(
  toolchain: &Toolchain,
  request: &ActionRequest,
  binary: &Path,
  objects: &[PathBuf],
  cwd: &Path,
  steps: &mut Steps,
) -> Result<bool, ExecuteError> {
  if let Some(parent) = binary.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }

  let mut args: Vec<OsString> = objects.iter().map(OsString::from).collect();
  args.push("-o".into());
  args.push(binary.into());
  args.extend(request.properties.get(props::LINKFLAGS).iter().map(OsString::from));

  debug!(target = %request.target, binary = %binary.display(), "linking");
  Ok(steps.record(execute_program(toolchain.cxx.as_ref(), &args, cwd).await?))
}
