//! Scoped property propagation over a resolved graph.
//!
//! Walks targets in build order. Each dependency edge contributes the
//! provider's evaluated provision; public edges also carry along what the
//! provider itself exported, which makes public propagation transitive.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, trace};

use crate::decl::{ContributionError, PropertySet, Visibility};
use crate::graph::ResolvedGraph;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
  #[error("contribution of '{capability}' from '{provider}' to '{target}' failed: {source}")]
  PropertyContributionError {
    target: String,
    capability: String,
    provider: String,
    #[source]
    source: ContributionError,
  },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Scoped {
  effective: PropertySet,
  exported: PropertySet,
}

/// Effective and exported property sets per resolved target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
  sets: HashMap<String, Scoped>,
}

impl PropertyMap {
  /// Properties visible to the target's own actions.
  pub fn effective(&self, target: &str) -> Option<&PropertySet> {
    self.sets.get(target).map(|s| &s.effective)
  }

  /// Properties the target passes on through public edges.
  pub fn exported(&self, target: &str) -> Option<&PropertySet> {
    self.sets.get(target).map(|s| &s.exported)
  }

  pub fn len(&self) -> usize {
    self.sets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sets.is_empty()
  }
}

/// Compute the effective property set of every target in `graph`.
pub fn propagate(graph: &ResolvedGraph) -> Result<PropertyMap, PropertyError> {
  let targets = graph.targets();
  let mut scoped: Vec<Scoped> = Vec::with_capacity(targets.len());

  for target in targets {
    let mut exported = PropertySet::new();
    let mut effective = PropertySet::new();

    for edge in &target.edges {
      let provider = &targets[edge.provider];
      let contributed: PropertySet = match provider.decl.provision(&edge.capability) {
        Some(provision) => provision
          .contribution
          .evaluate(&provider.outputs)
          .map_err(|source| PropertyError::PropertyContributionError {
            target: target.name().to_string(),
            capability: edge.capability.clone(),
            provider: provider.name().to_string(),
            source,
          })?
          .into_iter()
          .collect(),
        None => PropertySet::new(),
      };

      trace!(
        target = %target.name(),
        provider = %provider.name(),
        capability = %edge.capability,
        visibility = %edge.visibility,
        "applying edge"
      );

      // Providers always precede their dependents in build order
      if edge.visibility == Visibility::Public {
        let inherited = &scoped[edge.provider].exported;
        exported.extend(inherited);
        exported.extend(&contributed);
        effective.extend(inherited);
      }
      effective.extend(&contributed);
    }

    effective.extend(&target.decl.properties);
    debug!(target = %target.name(), properties = ?effective, "effective properties");

    scoped.push(Scoped { effective, exported });
  }

  let sets = targets
    .iter()
    .zip(scoped)
    .map(|(target, s)| (target.name().to_string(), s))
    .collect();

  Ok(PropertyMap { sets })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decl::{
    BuildAction, Contribution, Declarations, DependencyEdge, Project, Provision, TargetDecl,
  };
  use crate::graph::{ResolutionContext, resolve};
  use crate::placeholder::PlaceholderError;
  use crate::store::BuildRoot;

  fn flags(key: &str, value: &str) -> Contribution {
    Contribution::templates(vec![(key.to_string(), value.to_string())])
  }

  fn run(targets: Vec<TargetDecl>, goals: &[&str]) -> Result<PropertyMap, PropertyError> {
    let decls = Declarations::from_targets(Project::default(), targets).unwrap();
    let goals: Vec<String> = goals.iter().map(|s| s.to_string()).collect();
    let context = ResolutionContext::new(BuildRoot::new("/build")).with_platform("x86_64-linux");
    let graph = resolve(&decls, &goals, &context).unwrap();
    propagate(&graph)
  }

  #[test]
  fn public_edges_are_transitive() {
    let map = run(
      vec![
        TargetDecl::new("platform").provides(Provision::new("platform", flags("cxxflags", "-DPLATFORM"))),
        TargetDecl::new("lib")
          .with_action(BuildAction::StaticLibrary {
            name: "Foo".to_string(),
            sources: vec![],
          })
          .depends(DependencyEdge::public("platform"))
          .provides(Provision::new("Library/Foo", flags("linkflags", "$${output:library}"))),
        TargetDecl::new("test").depends(DependencyEdge::public("Library/Foo")),
        TargetDecl::new("exe").depends(DependencyEdge::public("Library/Foo")),
      ],
      &["test"],
    )
    .unwrap();

    let test = map.effective("test").unwrap();
    assert_eq!(test.get("cxxflags"), ["-DPLATFORM"]);
    assert_eq!(test.get("linkflags"), ["/build/lib/lib/libFoo.a"]);
    assert!(map.effective("exe").is_none());
  }

  #[test]
  fn private_edges_stop_at_the_dependent() {
    let map = run(
      vec![
        TargetDecl::new("cxx14").provides(Provision::new("Language/C++14", flags("cxxflags", "-std=c++14"))),
        TargetDecl::new("lib")
          .depends(DependencyEdge::private("Language/C++14"))
          .provides(Provision::bare("Library/Foo")),
        TargetDecl::new("app").depends(DependencyEdge::public("Library/Foo")),
      ],
      &["app"],
    )
    .unwrap();

    assert_eq!(map.effective("lib").unwrap().get("cxxflags"), ["-std=c++14"]);
    assert!(map.exported("lib").unwrap().is_empty());
    assert!(map.effective("app").unwrap().get("cxxflags").is_empty());
  }

  #[test]
  fn private_edge_to_public_chain_keeps_provider_exports() {
    let map = run(
      vec![
        TargetDecl::new("base").provides(Provision::new("Base", flags("cxxflags", "-DBASE"))),
        TargetDecl::new("mid")
          .depends(DependencyEdge::public("Base"))
          .provides(Provision::new("Mid", flags("cxxflags", "-DMID"))),
        TargetDecl::new("top").depends(DependencyEdge::private("Mid")),
        TargetDecl::new("outer").depends(DependencyEdge::public("Mid")),
      ],
      &["top", "outer"],
    )
    .unwrap();

    assert_eq!(map.effective("top").unwrap().get("cxxflags"), ["-DMID"]);
    assert_eq!(map.exported("mid").unwrap().get("cxxflags"), ["-DBASE"]);
    assert_eq!(map.effective("outer").unwrap().get("cxxflags"), ["-DBASE", "-DMID"]);
  }

  #[test]
  fn order_follows_edges_then_own_properties() {
    let map = run(
      vec![
        TargetDecl::new("a").provides(Provision::new("A", flags("cxxflags", "-DA"))),
        TargetDecl::new("b").provides(Provision::new("B", flags("cxxflags", "-DB"))),
        TargetDecl::new("top")
          .depends(DependencyEdge::public("B"))
          .depends(DependencyEdge::private("A"))
          .with_property("cxxflags", "-O2"),
      ],
      &["top"],
    )
    .unwrap();

    let top = map.effective("top").unwrap();
    assert_eq!(top.get("cxxflags"), ["-DB", "-DA", "-O2"]);
    assert_eq!(map.exported("top").unwrap().get("cxxflags"), ["-DB"]);
  }

  #[test]
  fn own_properties_do_not_leak() {
    let map = run(
      vec![
        TargetDecl::new("lib")
          .with_property("cxxflags", "-Werror")
          .provides(Provision::bare("Library/Foo")),
        TargetDecl::new("app").depends(DependencyEdge::public("Library/Foo")),
      ],
      &["app"],
    )
    .unwrap();

    assert_eq!(map.effective("lib").unwrap().get("cxxflags"), ["-Werror"]);
    assert!(map.effective("app").unwrap().is_empty());
  }

  #[test]
  fn duplicates_are_kept() {
    let map = run(
      vec![
        TargetDecl::new("a").provides(Provision::new("A", flags("linkflags", "-lm"))),
        TargetDecl::new("b").provides(Provision::new("B", flags("linkflags", "-lm"))),
        TargetDecl::new("top")
          .depends(DependencyEdge::public("A"))
          .depends(DependencyEdge::public("B")),
      ],
      &["top"],
    )
    .unwrap();

    assert_eq!(map.effective("top").unwrap().get("linkflags"), ["-lm", "-lm"]);
  }

  #[test]
  fn failing_contribution_is_reported() {
    let err = run(
      vec![
        TargetDecl::new("lib").provides(Provision::new("Library/Foo", flags("linkflags", "$${output:library}"))),
        TargetDecl::new("app").depends(DependencyEdge::public("Library/Foo")),
      ],
      &["app"],
    )
    .unwrap_err();

    assert_eq!(
      err,
      PropertyError::PropertyContributionError {
        target: "app".to_string(),
        capability: "Library/Foo".to_string(),
        provider: "lib".to_string(),
        source: ContributionError::Placeholder(PlaceholderError::UnresolvedOutput("library".to_string())),
      }
    );
  }

  #[test]
  fn propagation_is_deterministic() {
    let targets = || {
      vec![
        TargetDecl::new("a").provides(Provision::new("A", flags("cxxflags", "-DA"))),
        TargetDecl::new("b")
          .depends(DependencyEdge::public("A"))
          .provides(Provision::new("B", flags("cxxflags", "-DB"))),
        TargetDecl::new("c").depends(DependencyEdge::public("B")),
      ]
    };

    assert_eq!(run(targets(), &["c"]).unwrap(), run(targets(), &["c"]).unwrap());
  }
}
