//! Per-VPC aggregate of discovered resources
//!
//! A collection pairs the discovered resources of one VPC with their
//! dependency graph. Filtering returns a new collection with the graph
//! restricted to surviving endpoints; the original is never mutated.

use crate::resource::vpc::graph::{DependencyGraph, VpcResourceId};
use crate::resource::vpc::VpcResource;
use crate::resource::{Eligibility, Resource};
use crate::tags::TagFilter;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct VpcResourceCollection {
    vpc_id: String,
    resources: Vec<Arc<dyn VpcResource>>,
    graph: DependencyGraph,
}

impl VpcResourceCollection {
    pub fn new(vpc_id: impl Into<String>) -> Self {
        Self {
            vpc_id: vpc_id.into(),
            resources: Vec::new(),
            graph: DependencyGraph::new(),
        }
    }

    pub fn vpc_id(&self) -> &str {
        &self.vpc_id
    }

    pub fn push(&mut self, resource: Arc<dyn VpcResource>) {
        self.resources.push(resource);
    }

    pub fn add_dependency(&mut self, a: VpcResourceId, b: VpcResourceId) {
        self.graph.add_dependency(a, b);
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn VpcResource>> {
        self.resources.iter()
    }

    pub fn get(&self, id: &VpcResourceId) -> Option<&Arc<dyn VpcResource>> {
        self.resources.iter().find(|r| &r.vpc_resource_id() == id)
    }

    /// Resources matching the tag filter, with the graph restricted to
    /// surviving endpoints. An empty filter keeps everything.
    pub fn filter_by_tags(&self, filter: &TagFilter) -> Self {
        self.filtered(|r| filter.matches(r.tags()))
    }

    /// Drop provider-managed default resources (default security group,
    /// default subnets). These must never be deleted.
    pub fn exclude_default_resources(&self) -> Self {
        self.filtered(|r| !r.is_default_resource())
    }

    fn filtered(&self, keep: impl Fn(&Arc<dyn VpcResource>) -> bool) -> Self {
        let resources: Vec<_> = self.resources.iter().filter(|r| keep(*r)).cloned().collect();
        let surviving: HashSet<VpcResourceId> =
            resources.iter().map(|r| r.vpc_resource_id()).collect();
        Self {
            vpc_id: self.vpc_id.clone(),
            graph: self.graph.retain_nodes(|id| surviving.contains(id)),
            resources,
        }
    }

    /// Resources in teardown order: ascending kind priority, discovery order
    /// within a kind.
    pub fn ordered(&self) -> Vec<Arc<dyn VpcResource>> {
        let mut ordered = self.resources.clone();
        ordered.sort_by_key(|r| r.kind().teardown_priority());
        ordered
    }

    /// First direct dependency of `id` that is still alive, ignoring anything
    /// in `assumed_gone`. Liveness is checked against the provider.
    pub async fn first_live_dependency(
        &self,
        id: &VpcResourceId,
        assumed_gone: &HashSet<VpcResourceId>,
    ) -> Option<VpcResourceId> {
        for dep in self.graph.dependencies_of(id) {
            if assumed_gone.contains(dep) {
                continue;
            }
            match self.get(dep) {
                Some(resource) => {
                    if resource.exists().await {
                        return Some(dep.clone());
                    }
                }
                // Edge to something outside the collection: trust the edge.
                None => return Some(dep.clone()),
            }
        }
        None
    }

    /// Combined deletion eligibility of one resource: its own state checks
    /// plus the liveness of its direct graph dependencies. This is the answer
    /// `scan` reports; a subnet with a live interface in it is not deletable
    /// no matter what its own state says.
    pub async fn eligibility_of(
        &self,
        id: &VpcResourceId,
        assumed_gone: &HashSet<VpcResourceId>,
    ) -> Eligibility {
        let Some(resource) = self.get(id) else {
            return Eligibility::blocked("not part of this collection");
        };
        if let Eligibility::Blocked(reason) = resource.can_delete() {
            return Eligibility::Blocked(reason);
        }
        match self.first_live_dependency(id, assumed_gone).await {
            Some(blocker) => Eligibility::blocked(format!("live dependency {blocker}")),
            None => Eligibility::Eligible,
        }
    }
}
