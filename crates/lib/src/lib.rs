//! kiln-lib: build-target dependency-graph orchestration.
//!
//! The pipeline for one run:
//! - `config`: flatten the requested configuration into required packages
//! - `manifest`: load `kiln.toml` files into [`decl::Declarations`]
//! - `graph`: resolve capabilities, reject cycles, order the targets a goal needs
//! - `propagate`: compute each target's effective property set
//! - `execute`: run build/test/run actions with dependency-gated parallelism

pub mod config;
pub mod consts;
pub mod decl;
pub mod execute;
pub mod graph;
pub mod manifest;
pub mod orchestrate;
pub mod placeholder;
pub mod platform;
pub mod propagate;
pub mod store;
pub mod util;

pub use orchestrate::{
  OrchestrateError, OrchestrateOptions, Orchestration, Plan, Workspace, load_workspace, orchestrate, plan, plan_workspace,
  run_plan,
};
