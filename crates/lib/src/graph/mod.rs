//! Target graph resolution.
//!
//! Turns declarations into a frozen [`ResolvedGraph`]:
//! 1. Index capabilities by providing target
//! 2. Add an edge from each provider to its dependent (platform-filtered)
//! 3. Reject any dependency cycle
//! 4. Keep only the targets reachable from the requested goals
//! 5. Order them with Kahn's algorithm, declaration order breaking ties

mod context;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::decl::{Declarations, TargetDecl, TargetOutputs, Visibility};

pub use context::ResolutionContext;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("unknown goal '{0}': no target or capability with that name")]
  UnknownGoal(String),

  #[error("target '{target}' depends on '{capability}', which no target provides")]
  UnresolvedCapability { target: String, capability: String },

  #[error("capability '{capability}' required by '{target}' is provided by several targets: {}", .providers.join(", "))]
  AmbiguousCapability {
    target: String,
    capability: String,
    providers: Vec<String>,
  },

  #[error("dependency cycle: {}", .path.join(" -> "))]
  CyclicDependency { path: Vec<String> },
}

/// A dependency edge bound to its provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEdge {
  pub capability: String,
  pub visibility: Visibility,
  /// Position of the provider in [`ResolvedGraph::targets`].
  pub provider: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedTarget {
  pub decl: TargetDecl,
  pub outputs: TargetOutputs,
  /// Active edges in declaration order.
  pub edges: Vec<ResolvedEdge>,
  /// Distinct providers, ascending by position.
  pub dependencies: Vec<usize>,
  /// Distinct dependents, ascending by position.
  pub dependents: Vec<usize>,
  /// Whether the target was requested directly.
  pub goal: bool,
}

impl ResolvedTarget {
  pub fn name(&self) -> &str {
    &self.decl.name
  }
}

/// The ordered, frozen snapshot of one resolution pass.
///
/// Every target appears after all of its dependencies.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
  targets: Vec<ResolvedTarget>,
  index: HashMap<String, usize>,
}

impl ResolvedGraph {
  pub fn targets(&self) -> &[ResolvedTarget] {
    &self.targets
  }

  pub fn get(&self, name: &str) -> Option<&ResolvedTarget> {
    self.index.get(name).map(|&i| &self.targets[i])
  }

  pub fn position(&self, name: &str) -> Option<usize> {
    self.index.get(name).copied()
  }

  /// Target names in build order.
  pub fn order(&self) -> Vec<&str> {
    self.targets.iter().map(ResolvedTarget::name).collect()
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }
}

/// Resolve the targets needed for `goals` into build order.
///
/// A goal names a target or a capability. Capability problems are reported
/// only for targets the goals need; cycles are rejected anywhere in the
/// declarations.
pub fn resolve(
  declarations: &Declarations,
  goals: &[String],
  context: &ResolutionContext,
) -> Result<ResolvedGraph, GraphError> {
  let decls = declarations.targets();

  let mut providers: HashMap<&str, Vec<usize>> = HashMap::new();
  for (i, decl) in decls.iter().enumerate() {
    for provision in &decl.provides {
      let entry = providers.entry(provision.name.as_str()).or_default();
      if entry.last() != Some(&i) {
        entry.push(i);
      }
    }
  }

  let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(decls.len(), 0);
  for i in 0..decls.len() {
    graph.add_node(i);
  }

  // (capability, visibility, provider declaration index) per target
  let mut bound: Vec<Vec<(String, Visibility, usize)>> = vec![Vec::new(); decls.len()];
  let mut problems: Vec<Option<GraphError>> = vec![None; decls.len()];

  for (i, decl) in decls.iter().enumerate() {
    for edge in &decl.depends {
      if !edge.platform.matches(&context.platform) {
        trace!(target = %decl.name, capability = %edge.capability, "edge inactive on this platform");
        continue;
      }

      match providers.get(edge.capability.as_str()).map(Vec::as_slice) {
        Some([provider]) => {
          graph.update_edge(NodeIndex::new(*provider), NodeIndex::new(i), ());
          bound[i].push((edge.capability.clone(), edge.visibility, *provider));
        }
        Some(many) if many.len() > 1 => {
          problems[i].get_or_insert_with(|| GraphError::AmbiguousCapability {
            target: decl.name.clone(),
            capability: edge.capability.clone(),
            providers: many.iter().map(|&p| decls[p].name.clone()).collect(),
          });
        }
        _ => {
          problems[i].get_or_insert_with(|| GraphError::UnresolvedCapability {
            target: decl.name.clone(),
            capability: edge.capability.clone(),
          });
        }
      }
    }
  }

  if let Some(path) = find_cycle(&graph) {
    let path = path.into_iter().map(|i| decls[i].name.clone()).collect();
    return Err(GraphError::CyclicDependency { path });
  }

  let roots = resolve_goals(declarations, &providers, goals)?;

  // Reachability from the goals through dependency edges
  let mut reachable = vec![false; decls.len()];
  let mut stack = roots.clone();
  while let Some(i) = stack.pop() {
    if std::mem::replace(&mut reachable[i], true) {
      continue;
    }
    stack.extend(bound[i].iter().map(|(_, _, provider)| *provider));
  }

  for (i, problem) in problems.into_iter().enumerate() {
    if reachable[i]
      && let Some(err) = problem
    {
      return Err(err);
    }
  }

  let order = topological_order(&graph, &reachable);
  debug!(order = ?order.iter().map(|&i| decls[i].name.as_str()).collect::<Vec<_>>(), "resolved build order");

  let position: HashMap<usize, usize> = order.iter().enumerate().map(|(pos, &i)| (i, pos)).collect();
  let goal_set: HashSet<usize> = roots.into_iter().collect();

  let mut targets: Vec<ResolvedTarget> = order
    .iter()
    .map(|&i| {
      let decl = decls[i].clone();
      let edges: Vec<ResolvedEdge> = bound[i]
        .iter()
        .map(|(capability, visibility, provider)| ResolvedEdge {
          capability: capability.clone(),
          visibility: *visibility,
          provider: position[provider],
        })
        .collect();

      let mut dependencies: Vec<usize> = edges.iter().map(|e| e.provider).collect();
      dependencies.sort_unstable();
      dependencies.dedup();

      ResolvedTarget {
        outputs: TargetOutputs::plan(&decl, context.build_root.target_dir(&decl.name)),
        decl,
        edges,
        dependencies,
        dependents: Vec::new(),
        goal: goal_set.contains(&i),
      }
    })
    .collect();

  for pos in 0..targets.len() {
    for dep in targets[pos].dependencies.clone() {
      targets[dep].dependents.push(pos);
    }
  }

  info!(goals = ?goals, targets = targets.len(), "resolved target graph");

  let index = targets
    .iter()
    .enumerate()
    .map(|(pos, t)| (t.decl.name.clone(), pos))
    .collect();

  Ok(ResolvedGraph { targets, index })
}

/// Map each goal to a declaration index, by target name first, then by capability.
fn resolve_goals(
  declarations: &Declarations,
  providers: &HashMap<&str, Vec<usize>>,
  goals: &[String],
) -> Result<Vec<usize>, GraphError> {
  let mut roots = Vec::new();

  for goal in goals {
    if let Some(i) = declarations.position(goal) {
      roots.push(i);
      continue;
    }

    match providers.get(goal.as_str()).map(Vec::as_slice) {
      Some([provider]) => roots.push(*provider),
      Some(many) if many.len() > 1 => {
        return Err(GraphError::AmbiguousCapability {
          target: goal.clone(),
          capability: goal.clone(),
          providers: many.iter().map(|&p| declarations.targets()[p].name.clone()).collect(),
        });
      }
      _ => return Err(GraphError::UnknownGoal(goal.clone())),
    }
  }

  Ok(roots)
}

/// Kahn's algorithm over the reachable nodes; the lowest declaration index
/// among ready nodes goes first.
fn topological_order(graph: &DiGraph<usize, ()>, reachable: &[bool]) -> Vec<usize> {
  let mut in_degree: Vec<usize> = graph
    .node_indices()
    .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
    .collect();

  let mut ready: BinaryHeap<Reverse<usize>> = graph
    .node_indices()
    .filter(|idx| reachable[graph[*idx]] && in_degree[idx.index()] == 0)
    .map(|idx| Reverse(graph[idx]))
    .collect();

  let mut order = Vec::new();
  while let Some(Reverse(i)) = ready.pop() {
    order.push(i);
    for dependent in graph.neighbors_directed(NodeIndex::new(i), Direction::Outgoing) {
      let degree = &mut in_degree[dependent.index()];
      *degree -= 1;
      if *degree == 0 && reachable[graph[dependent]] {
        ready.push(Reverse(graph[dependent]));
      }
    }
  }

  order
}

/// Find a dependency cycle, starting from the earliest declared target on one.
///
/// The returned path follows "depends on" edges and ends where it started.
fn find_cycle(graph: &DiGraph<usize, ()>) -> Option<Vec<usize>> {
  let start = tarjan_scc(graph)
    .into_iter()
    .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
    .filter_map(|scc| scc.into_iter().min())
    .min()?;

  let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
  let mut visited: HashSet<NodeIndex> = HashSet::new();
  let mut queue = VecDeque::from([start]);

  while let Some(node) = queue.pop_front() {
    let mut providers: Vec<NodeIndex> = graph.neighbors_directed(node, Direction::Incoming).collect();
    providers.sort_unstable();
    providers.dedup();

    for provider in providers {
      if provider == start {
        let mut path = vec![node];
        let mut current = node;
        while current != start {
          current = parent[&current];
          path.push(current);
        }
        path.reverse();
        path.push(start);
        return Some(path.into_iter().map(|idx| graph[idx]).collect());
      }
      if visited.insert(provider) {
        parent.insert(provider, node);
        queue.push_back(provider);
      }
    }
  }

  Some(vec![graph[start], graph[start]])
}
