//! Target execution.
//!
//! Runs a resolved graph with bounded parallelism:
//! - A readiness counter per target; a target is spawned as soon as its
//!   last dependency succeeds
//! - A failure skips every transitive dependent; independent targets go on
//! - Unchanged artifact-producing targets are reused through their signature

pub mod actions;
pub mod runner;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

use crate::decl::{BuildAction, PropertySet, TargetOutputs};
use crate::graph::ResolvedGraph;
use crate::propagate::PropertyMap;
use crate::store;
use crate::util::hash::ContentHash;

pub use actions::{CommandRunner, Toolchain};
pub use runner::{ActionRequest, ActionRunner};
pub use types::{
  ActionOutput, ExecuteConfig, ExecuteError, ExecutionReport, FailureSummary, TargetReport, TargetState,
};

/// Everything a worker task needs, detached from the graph.
struct TargetJob {
  index: usize,
  name: String,
  actions: Vec<BuildAction>,
  outputs: TargetOutputs,
  properties: PropertySet,
  arguments: Vec<String>,
  /// Signatures of all dependencies, or `None` if any of them has none.
  dependency_signatures: Option<Vec<ContentHash>>,
  /// Fingerprint of the runner's tools.
  toolchain: Option<ContentHash>,
  force: bool,
}

struct JobOutcome {
  result: Result<(), ExecuteError>,
  cached: bool,
  signature: Option<ContentHash>,
  stdout: String,
  stderr: String,
  duration: std::time::Duration,
}

/// Execute every target of `graph` in dependency order.
///
/// Never fails as a whole: per-target failures are recorded in the report.
pub async fn execute<R: ActionRunner>(
  graph: &ResolvedGraph,
  properties: &PropertyMap,
  runner: Arc<R>,
  config: &ExecuteConfig,
) -> ExecutionReport {
  info!(
    targets = graph.len(),
    parallelism = config.parallelism,
    "starting execution"
  );

  let mut scheduler = Scheduler::new(graph, properties, runner, config);
  scheduler.run().await;
  let report = scheduler.finish();

  info!(
    succeeded = report.count(TargetState::Succeeded),
    cached = report.cached(),
    failed = report.count(TargetState::Failed),
    skipped = report.count(TargetState::Skipped),
    "execution complete"
  );

  report
}

struct Scheduler<'a, R> {
  graph: &'a ResolvedGraph,
  properties: &'a PropertyMap,
  runner: Arc<R>,
  config: &'a ExecuteConfig,
  semaphore: Arc<Semaphore>,
  toolchain: Option<ContentHash>,
  join_set: JoinSet<(usize, JobOutcome)>,
  tasks: HashMap<Id, usize>,
  remaining: Vec<usize>,
  signatures: Vec<Option<ContentHash>>,
  reports: Vec<TargetReport>,
  first_failure: Option<FailureSummary>,
}

impl<'a, R: ActionRunner> Scheduler<'a, R> {
  fn new(graph: &'a ResolvedGraph, properties: &'a PropertyMap, runner: Arc<R>, config: &'a ExecuteConfig) -> Self {
    let targets = graph.targets();
    Self {
      graph,
      properties,
      toolchain: runner.fingerprint(),
      runner,
      config,
      semaphore: Arc::new(Semaphore::new(config.parallelism.max(1))),
      join_set: JoinSet::new(),
      tasks: HashMap::new(),
      remaining: targets.iter().map(|t| t.dependencies.len()).collect(),
      signatures: vec![None; targets.len()],
      reports: targets.iter().map(|t| TargetReport::pending(t.name())).collect(),
      first_failure: None,
    }
  }

  async fn run(&mut self) {
    for index in 0..self.remaining.len() {
      if self.remaining[index] == 0 {
        self.spawn(index);
      }
    }

    while let Some(joined) = self.join_set.join_next_with_id().await {
      match joined {
        Ok((id, (index, outcome))) => {
          self.tasks.remove(&id);
          self.complete(index, outcome);
        }
        Err(e) => {
          let Some(index) = self.tasks.remove(&e.id()) else {
            error!(error = %e, "unknown worker task aborted");
            continue;
          };
          error!(target = %self.reports[index].name, error = %e, "worker task panicked");
          self.fail(index, ExecuteError::TaskAborted(e.to_string()), String::new(), String::new());
        }
      }
    }
  }

  fn spawn(&mut self, index: usize) {
    let graph = self.graph;
    let target = &graph.targets()[index];
    let forward = target.goal && !self.config.arguments.is_empty();

    let dependency_signatures = target
      .dependencies
      .iter()
      .map(|&dep| self.signatures[dep].clone())
      .collect::<Option<Vec<_>>>();

    let job = TargetJob {
      index,
      name: target.name().to_string(),
      actions: target.decl.actions.clone(),
      outputs: target.outputs.clone(),
      properties: self.properties.effective(target.name()).cloned().unwrap_or_default(),
      arguments: if forward { self.config.arguments.clone() } else { Vec::new() },
      dependency_signatures,
      toolchain: self.toolchain.clone(),
      force: self.config.force,
    };

    debug!(target = %job.name, "target ready");
    self.reports[index].state = TargetState::Running;

    let runner = self.runner.clone();
    let semaphore = self.semaphore.clone();
    let handle = self.join_set.spawn(async move {
      let index = job.index;
      let outcome = match semaphore.acquire_owned().await {
        Ok(_permit) => run_target(job, runner.as_ref()).await,
        Err(e) => JobOutcome {
          result: Err(ExecuteError::TaskAborted(e.to_string())),
          cached: false,
          signature: None,
          stdout: String::new(),
          stderr: String::new(),
          duration: std::time::Duration::ZERO,
        },
      };
      (index, outcome)
    });
    self.tasks.insert(handle.id(), index);
  }

  fn complete(&mut self, index: usize, outcome: JobOutcome) {
    {
      let report = &mut self.reports[index];
      report.duration = outcome.duration;
      report.cached = outcome.cached;
      report.stdout = outcome.stdout.clone();
      report.stderr = outcome.stderr.clone();
    }

    match outcome.result {
      Ok(()) => {
        info!(target = %self.reports[index].name, cached = outcome.cached, "target succeeded");
        self.reports[index].state = TargetState::Succeeded;
        self.signatures[index] = outcome.signature;

        let graph = self.graph;
        for &dependent in &graph.targets()[index].dependents {
          self.remaining[dependent] -= 1;
          if self.remaining[dependent] == 0 && self.reports[dependent].state == TargetState::Pending {
            self.spawn(dependent);
          }
        }
      }
      Err(e) => {
        error!(target = %self.reports[index].name, error = %e, "target failed");
        self.fail(index, e, outcome.stdout, outcome.stderr);
      }
    }
  }

  /// Mark a target failed and skip everything that depends on it.
  fn fail(&mut self, index: usize, error: ExecuteError, stdout: String, stderr: String) {
    let name = self.reports[index].name.clone();
    let message = error.to_string();

    let report = &mut self.reports[index];
    report.state = TargetState::Failed;
    report.error = Some(message.clone());

    if self.first_failure.is_none() {
      self.first_failure = Some(FailureSummary {
        target: name.clone(),
        error: message,
        stdout,
        stderr,
      });
    }

    let graph = self.graph;
    let mut stack: Vec<usize> = graph.targets()[index].dependents.clone();
    while let Some(dependent) = stack.pop() {
      let report = &mut self.reports[dependent];
      if report.state != TargetState::Pending {
        continue;
      }
      warn!(target = %report.name, failed_dep = %name, "skipping target due to failed dependency");
      report.state = TargetState::Skipped;
      report.failed_dependency = Some(name.clone());
      stack.extend(graph.targets()[dependent].dependents.iter().copied());
    }
  }

  fn finish(mut self) -> ExecutionReport {
    for report in &mut self.reports {
      if report.state == TargetState::Running {
        report.state = TargetState::Failed;
        report.error.get_or_insert_with(|| "target did not complete".to_string());
      }
    }

    ExecutionReport {
      targets: self.reports,
      first_failure: self.first_failure,
    }
  }
}

/// Run all actions of one target, or reuse its previous outputs.
async fn run_target<R: ActionRunner>(job: TargetJob, runner: &R) -> JobOutcome {
  let started = Instant::now();
  let mut stdout = String::new();
  let mut stderr = String::new();

  let result = run_actions(&job, runner, &mut stdout, &mut stderr).await;
  let (result, cached, signature) = match result {
    Ok((cached, signature)) => (Ok(()), cached, signature),
    Err(e) => (Err(e), false, None),
  };

  JobOutcome {
    result,
    cached,
    signature,
    stdout,
    stderr,
    duration: started.elapsed(),
  }
}

async fn run_actions<R: ActionRunner>(
  job: &TargetJob,
  runner: &R,
  stdout: &mut String,
  stderr: &mut String,
) -> Result<(bool, Option<ContentHash>), ExecuteError> {
  let signature = match &job.dependency_signatures {
    Some(deps) if job.actions.iter().all(BuildAction::is_cacheable) => Some(
      store::compute_signature(&job.name, &job.actions, &job.properties, deps, job.toolchain.as_ref()).await?,
    ),
    _ => None,
  };

  if let Some(signature) = &signature
    && !job.force
    && store::is_fresh(&job.outputs, signature).await
  {
    info!(target = %job.name, "up to date");
    return Ok((true, Some(signature.clone())));
  }

  tokio::fs::create_dir_all(&job.outputs.out_dir).await?;
  store::clear_signature(&job.outputs.out_dir).await?;

  for action in &job.actions {
    let request = ActionRequest {
      target: job.name.clone(),
      action: action.clone(),
      out_dir: job.outputs.out_dir.clone(),
      package_path: job.outputs.package_path.clone(),
      outputs: job.outputs.outputs.clone(),
      properties: job.properties.clone(),
      arguments: if action.forwards_arguments() {
        job.arguments.clone()
      } else {
        Vec::new()
      },
    };

    let output = runner.run(request).await?;
    stdout.push_str(&output.stdout);
    stderr.push_str(&output.stderr);

    if !output.is_success() {
      return Err(ExecuteError::ActionExecutionError {
        target: job.name.clone(),
        action: action.kind(),
        status: output.status,
      });
    }
  }

  if let Some(signature) = &signature {
    store::write_signature(&job.outputs.out_dir, signature).await?;
  }

  Ok((false, signature))
}
