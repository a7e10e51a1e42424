//! Dependency graph between VPC resources
//!
//! Built fresh at every discovery from live topology and queried during
//! teardown; never persisted. Edges are symmetric: inserting `a -> b` also
//! records `b -> a`, and duplicate inserts are no-ops.

use crate::resource::vpc::VpcResourceKind;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Stable identity of a resource inside one VPC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VpcResourceId {
    pub kind: VpcResourceKind,
    pub id: String,
}

impl VpcResourceId {
    pub fn new(kind: VpcResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for VpcResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Undirected adjacency between resources that block each other's deletion.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<VpcResourceId, BTreeSet<VpcResourceId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `a` cannot be deleted while `b` exists, and vice versa.
    /// Idempotent; self-edges are ignored.
    pub fn add_dependency(&mut self, a: VpcResourceId, b: VpcResourceId) {
        if a == b {
            return;
        }
        self.edges.entry(a.clone()).or_default().insert(b.clone());
        self.edges.entry(b).or_default().insert(a);
    }

    /// Direct dependencies of a resource, in stable order.
    pub fn dependencies_of(&self, id: &VpcResourceId) -> impl Iterator<Item = &VpcResourceId> {
        self.edges.get(id).into_iter().flatten()
    }

    pub fn has_dependencies(&self, id: &VpcResourceId) -> bool {
        self.edges.get(id).is_some_and(|deps| !deps.is_empty())
    }

    /// Keep only edges whose both endpoints satisfy the predicate.
    pub fn retain_nodes(&self, keep: impl Fn(&VpcResourceId) -> bool) -> Self {
        let mut restricted = Self::new();
        for (node, deps) in &self.edges {
            if !keep(node) {
                continue;
            }
            for dep in deps {
                if keep(dep) {
                    restricted.add_dependency(node.clone(), dep.clone());
                }
            }
        }
        restricted
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum::<usize>() / 2
    }
}
