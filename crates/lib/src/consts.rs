/// Manifest file looked up in the project root and in every package directory.
pub const MANIFEST_FILE: &str = "kiln.toml";

/// Marker written into a target's output directory after a successful build.
pub const SIGNATURE_FILE: &str = ".kiln-signature";

/// Default build root, relative to the project root.
pub const DEFAULT_BUILD_DIR: &str = ".kiln/build";

/// Default package directory, relative to the project root.
pub const DEFAULT_PACKAGES_DIR: &str = "packages";

pub const ENV_BUILD_ROOT: &str = "KILN_BUILD_ROOT";
pub const ENV_PACKAGES: &str = "KILN_PACKAGES";
pub const ENV_CONFIGURATION: &str = "KILN_CONFIGURATION";
pub const ENV_CXX: &str = "KILN_CXX";
pub const ENV_AR: &str = "KILN_AR";
pub const ENV_SHELL: &str = "KILN_SHELL";
pub const ENV_JOBS: &str = "KILN_JOBS";

/// Property keys understood by the default action runner.
pub mod props {
  pub const CXXFLAGS: &str = "cxxflags";
  pub const LINKFLAGS: &str = "linkflags";
  pub const HEADER_SEARCH_PATHS: &str = "header_search_paths";
  pub const EXECUTABLES: &str = "executables";
}

/// Named outputs produced by build actions.
pub mod outputs {
  pub const HEADERS: &str = "headers";
  pub const LIBRARY: &str = "library";
  pub const EXECUTABLE: &str = "executable";
  pub const TEST_EXECUTABLE: &str = "test-executable";
}
