//! Glob expansion of manifest file sets.
//!
//! Supported syntax: `*` and `?` within one path component, `**` across
//! components, and `{a,b}` alternatives. Patterns are matched against paths
//! relative to the set's root, using `/` as separator.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use super::ManifestError;

/// Translate a glob pattern into an anchored regular expression.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, ManifestError> {
  let mut re = String::from("^");
  let mut chars = pattern.chars().peekable();
  let mut in_group = false;

  while let Some(c) = chars.next() {
    match c {
      '*' if chars.peek() == Some(&'*') => {
        chars.next();
        if chars.peek() == Some(&'/') {
          chars.next();
          re.push_str("(?:.*/)?");
        } else {
          re.push_str(".*");
        }
      }
      '*' => re.push_str("[^/]*"),
      '?' => re.push_str("[^/]"),
      '{' if !in_group => {
        in_group = true;
        re.push_str("(?:");
      }
      ',' if in_group => re.push('|'),
      '}' if in_group => {
        in_group = false;
        re.push(')');
      }
      other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
    }
  }

  if in_group {
    return Err(ManifestError::InvalidGlob {
      pattern: pattern.to_string(),
      message: "unclosed '{'".to_string(),
    });
  }

  re.push('$');
  Regex::new(&re).map_err(|e| ManifestError::InvalidGlob {
    pattern: pattern.to_string(),
    message: e.to_string(),
  })
}

fn is_literal(pattern: &str) -> bool {
  !pattern.contains(['*', '?', '{'])
}

/// Expand `patterns` under `root` into a sorted, duplicate-free file list.
///
/// A pattern without wildcards names one file, which must exist.
pub fn expand(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, ManifestError> {
  let mut files = BTreeSet::new();
  let mut globs = Vec::new();

  for pattern in patterns {
    if is_literal(pattern) {
      let path = root.join(pattern);
      if !path.is_file() {
        return Err(ManifestError::MissingFile(path));
      }
      files.insert(path);
    } else {
      globs.push(glob_to_regex(pattern)?);
    }
  }

  if !globs.is_empty() {
    for entry in WalkDir::new(root).sort_by_file_name() {
      let entry = entry.map_err(|e| ManifestError::WalkDir {
        path: root.to_path_buf(),
        source: e,
      })?;
      if !entry.file_type().is_file() {
        continue;
      }

      let Ok(relative) = entry.path().strip_prefix(root) else {
        continue;
      };
      let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

      if globs.iter().any(|re| re.is_match(&relative)) {
        files.insert(entry.path().to_path_buf());
      }
    }
  }

  Ok(files.into_iter().collect())
}
