//! `kiln.toml` loading.
//!
//! A manifest declares the project, its targets and its configurations.
//! Packages are directories under the packages root, each with its own
//! manifest; relative paths in a manifest are relative to its directory.

mod fileset;
mod types;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::ConfigurationSet;
use crate::consts::{DEFAULT_PACKAGES_DIR, ENV_PACKAGES, MANIFEST_FILE};
use crate::decl::{BuildAction, Contribution, DependencyEdge, PropertySet, Provision, TargetDecl};
use crate::placeholder::{self, PlaceholderError, Resolver};

pub use fileset::{expand, glob_to_regex};
pub use types::{ActionSpec, DependDetail, DependSpec, ManifestFile, ProvideSpec, TargetSpec, WorkspaceSpec};

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("package '{name}' not found (looked for {path})")]
  PackageNotFound { name: String, path: PathBuf },

  #[error("invalid glob '{pattern}': {message}")]
  InvalidGlob { pattern: String, message: String },

  #[error("file not found: {0}")]
  MissingFile(PathBuf),

  #[error("failed to walk {path}: {source}")]
  WalkDir {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("property '{key}' of target '{target}': {source}")]
  Property {
    target: String,
    key: String,
    #[source]
    source: PlaceholderError,
  },
}

/// A parsed manifest and the directory it lives in.
#[derive(Debug, Clone)]
pub struct Manifest {
  pub path: PathBuf,
  pub dir: PathBuf,
  pub file: ManifestFile,
}

impl Manifest {
  /// Read and parse a manifest file.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;
    let manifest = Self::parse(path, &content)?;

    debug!(path = %path.display(), targets = manifest.file.targets.len(), "loaded manifest");
    Ok(manifest)
  }

  /// Parse manifest text as if it had been read from `path`.
  pub fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
    let file: ManifestFile = toml::from_str(content).map_err(|e| ManifestError::Parse {
      path: path.to_path_buf(),
      source: e,
    })?;

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let dir = std::path::absolute(&dir).unwrap_or(dir);

    Ok(Self {
      path: path.to_path_buf(),
      dir,
      file,
    })
  }

  /// Load `<packages_dir>/<name>/kiln.toml`.
  pub fn load_package(packages_dir: &Path, name: &str) -> Result<Self, ManifestError> {
    let path = packages_dir.join(name).join(MANIFEST_FILE);
    if !path.is_file() {
      return Err(ManifestError::PackageNotFound {
        name: name.to_string(),
        path,
      });
    }

    info!(package = %name, "loading package");
    Self::load(&path)
  }

  /// Package directory for a root manifest: `KILN_PACKAGES`, then
  /// `[workspace] packages`, then `<dir>/packages`.
  pub fn packages_dir(&self) -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_PACKAGES) {
      return PathBuf::from(dir);
    }
    match &self.file.workspace.packages {
      Some(dir) => self.dir.join(dir),
      None => self.dir.join(DEFAULT_PACKAGES_DIR),
    }
  }

  pub fn configurations(&self) -> ConfigurationSet {
    self.file.configurations.iter().cloned().collect()
  }

  /// Convert the declared targets, expanding file sets.
  pub fn targets(&self) -> Result<Vec<TargetDecl>, ManifestError> {
    self.file.targets.iter().map(|spec| self.target(spec)).collect()
  }

  fn target(&self, spec: &TargetSpec) -> Result<TargetDecl, ManifestError> {
    let mut decl = TargetDecl::new(&spec.name).with_package_path(&self.dir);

    for depend in &spec.depends {
      decl = decl.depends(match depend {
        DependSpec::Name(name) => DependencyEdge::public(name),
        DependSpec::Detailed(DependDetail {
          name,
          private,
          platform,
        }) => {
          let edge = if *private {
            DependencyEdge::private(name)
          } else {
            DependencyEdge::public(name)
          };
          match platform {
            Some(platform) => edge.on_platform(platform),
            None => edge,
          }
        }
      });
    }

    for provide in &spec.provides {
      let templates = provide
        .append
        .iter()
        .flat_map(|(key, values)| values.iter().map(move |v| (key.clone(), v.clone())))
        .collect();
      decl = decl.provides(Provision::new(&provide.name, Contribution::templates(templates)));
    }

    decl.properties = self.own_properties(spec)?;

    for action in &spec.actions {
      decl = decl.with_action(self.action(action)?);
    }

    Ok(decl)
  }

  /// A target's own properties may refer to `$${package}`.
  fn own_properties(&self, spec: &TargetSpec) -> Result<PropertySet, ManifestError> {
    let resolver = PackageResolver {
      package: self.dir.to_string_lossy().into_owned(),
    };

    let mut properties = PropertySet::new();
    for (key, values) in &spec.properties {
      for value in values {
        let value = placeholder::substitute(value, &resolver).map_err(|e| ManifestError::Property {
          target: spec.name.clone(),
          key: key.clone(),
          source: e,
        })?;
        properties.append(key, value);
      }
    }
    Ok(properties)
  }

  fn action(&self, spec: &ActionSpec) -> Result<BuildAction, ManifestError> {
    let root = |root: &Option<PathBuf>| match root {
      Some(root) => self.dir.join(root),
      None => self.dir.clone(),
    };

    Ok(match spec {
      ActionSpec::CopyHeaders { root: r, files } => {
        let root = root(r);
        BuildAction::CopyHeaders {
          files: expand(&root, files)?,
          root,
        }
      }
      ActionSpec::StaticLibrary { name, root: r, files } => BuildAction::StaticLibrary {
        name: name.clone(),
        sources: expand(&root(r), files)?,
      },
      ActionSpec::Executable { name, root: r, files } => BuildAction::Executable {
        name: name.clone(),
        sources: expand(&root(r), files)?,
      },
      ActionSpec::Tests {
        name,
        root: r,
        files,
        arguments,
      } => BuildAction::Tests {
        name: name.clone(),
        sources: expand(&root(r), files)?,
        arguments: arguments.clone(),
      },
      ActionSpec::RunExecutable { name, arguments } => BuildAction::RunExecutable {
        name: name.clone(),
        arguments: arguments.clone(),
      },
      ActionSpec::Shell { cmd, env } => BuildAction::Shell {
        cmd: cmd.clone(),
        env: env.clone(),
      },
    })
  }
}

/// Resolves only `$${package}`; outputs do not exist yet at load time.
struct PackageResolver {
  package: String,
}

impl Resolver for PackageResolver {
  fn resolve_out(&self) -> Result<&str, PlaceholderError> {
    Err(PlaceholderError::Malformed(
      "$${out} is only available in provided properties".to_string(),
    ))
  }

  fn resolve_output(&self, name: &str) -> Result<&str, PlaceholderError> {
    Err(PlaceholderError::UnresolvedOutput(name.to_string()))
  }

  fn resolve_package(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.package)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decl::{PlatformScope, TargetOutputs, Visibility};
  use serial_test::serial;
  use tempfile::TempDir;

  const NUMERICS: &str = r#"
[project]
name = "numerics"
version = "0.1.0"
authors = [{ name = "Ada", email = "ada@example.com" }]

[toolchain]
cxx = "clang++"

[[target]]
name = "numerics-library"
depends = ["Build/Clang", { name = "Language/C++14", private = true }, { name = "Build/MSVC", platform = "windows" }]
provides = [{ name = "Library/Numerics", append = { linkflags = ["$${output:library}"], header_search_paths = ["$${output:headers}"] } }]
properties = { cxxflags = ["-I$${package}/source", "-O2"] }

[[target.action]]
kind = "copy_headers"
root = "source"
files = ["Numerics/**/*.hpp"]

[[target.action]]
kind = "static_library"
name = "Numerics"
root = "source"
files = ["Numerics/**/*.cpp"]

[[target]]
name = "numerics-tests"
depends = ["Library/Numerics"]

[[target.action]]
kind = "tests"
name = "numerics-tests"
files = ["test/*.cpp"]
arguments = ["--verbose"]

[[configuration]]
name = "development"
imports = ["local"]
requires = ["platforms", "unit-test"]

[[configuration]]
name = "local"
public = true
requires = ["build-files"]
options = { source = "https://example.com/packages" }
"#;

  fn package() -> TempDir {
    let temp = TempDir::new().unwrap();
    for file in [
      "source/Numerics/Vector.hpp",
      "source/Numerics/Vector.cpp",
      "source/Numerics/Linear/Matrix.cpp",
      "test/Vector.cpp",
    ] {
      let path = temp.path().join(file);
      std::fs::create_dir_all(path.parent().unwrap()).unwrap();
      std::fs::write(path, "").unwrap();
    }
    std::fs::write(temp.path().join(MANIFEST_FILE), NUMERICS).unwrap();
    temp
  }

  #[test]
  fn parses_project_and_toolchain() {
    let temp = package();
    let manifest = Manifest::load(&temp.path().join(MANIFEST_FILE)).unwrap();

    let project = manifest.file.project.as_ref().unwrap();
    assert_eq!(project.name, "numerics");
    assert_eq!(project.authors[0].email.as_deref(), Some("ada@example.com"));
    let toolchain = manifest.file.toolchain.as_ref().unwrap();
    assert_eq!(toolchain.cxx, "clang++");
    assert_eq!(toolchain.ar, "ar");
  }

  #[test]
  fn converts_targets() {
    let temp = package();
    let manifest = Manifest::load(&temp.path().join(MANIFEST_FILE)).unwrap();
    let targets = manifest.targets().unwrap();
    let dir = &manifest.dir;

    let lib = &targets[0];
    assert_eq!(lib.name, "numerics-library");
    assert_eq!(lib.package_path, *dir);
    assert_eq!(lib.depends[0], DependencyEdge::public("Build/Clang"));
    assert_eq!(lib.depends[1].visibility, Visibility::Private);
    assert_eq!(lib.depends[2].platform, PlatformScope::Only("windows".to_string()));
    assert_eq!(
      lib.properties.get("cxxflags"),
      [format!("-I{}/source", dir.display()), "-O2".to_string()]
    );

    match &lib.actions[1] {
      BuildAction::StaticLibrary { name, sources } => {
        assert_eq!(name, "Numerics");
        assert_eq!(
          sources,
          &vec![
            dir.join("source/Numerics/Linear/Matrix.cpp"),
            dir.join("source/Numerics/Vector.cpp"),
          ]
        );
      }
      other => panic!("unexpected action {other:?}"),
    }

    match &targets[1].actions[0] {
      BuildAction::Tests { sources, arguments, .. } => {
        assert_eq!(sources, &vec![dir.join("test/Vector.cpp")]);
        assert_eq!(arguments, &vec!["--verbose".to_string()]);
      }
      other => panic!("unexpected action {other:?}"),
    }
  }

  #[test]
  fn provided_templates_resolve_against_provider_outputs() {
    let temp = package();
    let manifest = Manifest::load(&temp.path().join(MANIFEST_FILE)).unwrap();
    let lib = manifest.targets().unwrap().remove(0);

    let outputs = TargetOutputs::plan(&lib, PathBuf::from("/build/numerics-library"));
    let provision = lib.provision("Library/Numerics").unwrap();
    let values = provision.contribution.evaluate(&outputs).unwrap();

    assert_eq!(
      values,
      vec![
        (
          "header_search_paths".to_string(),
          "/build/numerics-library/include".to_string()
        ),
        (
          "linkflags".to_string(),
          "/build/numerics-library/lib/libNumerics.a".to_string()
        ),
      ]
    );
  }

  #[test]
  fn configurations_keep_options() {
    let temp = package();
    let manifest = Manifest::load(&temp.path().join(MANIFEST_FILE)).unwrap();
    let configurations = manifest.configurations();

    assert_eq!(configurations.default_name(), Some("development"));
    assert_eq!(
      configurations.resolve("development").unwrap(),
      vec!["build-files", "platforms", "unit-test"]
    );
    let local = configurations.get("local").unwrap();
    assert!(local.public);
    assert_eq!(local.options["source"], "https://example.com/packages");
  }

  #[test]
  fn own_properties_cannot_use_outputs() {
    let content = r#"
[[target]]
name = "lib"
properties = { linkflags = ["$${output:library}"] }
"#;
    let manifest = Manifest::parse(Path::new("/project/kiln.toml"), content).unwrap();
    let err = manifest.targets().unwrap_err();
    assert!(matches!(err, ManifestError::Property { ref target, .. } if target == "lib"));
  }

  #[test]
  fn parse_errors_name_the_file() {
    let err = Manifest::parse(Path::new("/project/kiln.toml"), "[[target]]\nname = 3\n").unwrap_err();
    assert!(err.to_string().starts_with("failed to parse /project/kiln.toml"));
  }

  #[test]
  fn unknown_action_kind_is_a_parse_error() {
    let content = r#"
[[target]]
name = "lib"

[[target.action]]
kind = "fetch_url"
"#;
    let err = Manifest::parse(Path::new("/project/kiln.toml"), content).unwrap_err();
    assert!(matches!(err, ManifestError::Parse { .. }));
  }

  #[test]
  fn misspelled_keys_are_parse_errors() {
    for content in [
      "[[target]]\nname = \"lib\"\ndepends = [{ name = \"Language/C++14\", privat = true }]\n",
      "[[target]]\nname = \"lib\"\nprovides = [{ name = \"Library/Foo\", apend = { cxxflags = [\"-O2\"] } }]\n",
      "[[target]]\nname = \"lib\"\ndepend = [\"Library/Foo\"]\n",
    ] {
      let err = Manifest::parse(Path::new("/project/kiln.toml"), content).unwrap_err();
      assert!(matches!(err, ManifestError::Parse { .. }), "{content}");
    }
  }

  #[test]
  fn missing_package() {
    let temp = TempDir::new().unwrap();
    let err = Manifest::load_package(temp.path(), "unit-test").unwrap_err();
    assert!(matches!(err, ManifestError::PackageNotFound { ref name, .. } if name == "unit-test"));
  }

  #[test]
  #[serial]
  fn packages_dir_resolution() {
    let manifest = Manifest::parse(Path::new("/project/kiln.toml"), "").unwrap();
    let custom = Manifest::parse(Path::new("/project/kiln.toml"), "[workspace]\npackages = \"deps\"\n").unwrap();

    temp_env::with_var(ENV_PACKAGES, None::<&str>, || {
      assert_eq!(manifest.packages_dir(), PathBuf::from("/project/packages"));
      assert_eq!(custom.packages_dir(), PathBuf::from("/project/deps"));
    });
    temp_env::with_var(ENV_PACKAGES, Some("/shared/packages"), || {
      assert_eq!(custom.packages_dir(), PathBuf::from("/shared/packages"));
    });
  }
}
