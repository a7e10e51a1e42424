//! Teardown orchestration
//!
//! Single-resource removal propagates errors; batch removal attempts every
//! resource in input order, logging and counting failures, and always ends
//! with a tally. VPC teardown walks the collection in priority order,
//! refusing any resource whose direct dependencies are still alive.

use crate::context::ExecutionContext;
use crate::resource::vpc::collection::VpcResourceCollection;
use crate::resource::{RemoveOutcome, Resource};
use anyhow::Result;
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Outcome counters for a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &RemoveOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else if outcome.is_skip() {
            self.skipped += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    fn log_tally(&self) {
        if self.skipped > 0 {
            info!(
                "{} succeeded, {} failed ({} skipped)",
                self.succeeded, self.failed, self.skipped
            );
        } else {
            info!("{} succeeded, {} failed", self.succeeded, self.failed);
        }
    }
}

/// Clean and remove one resource, propagating any error.
pub async fn remove_one<R: Resource + ?Sized>(
    resource: &R,
    ctx: &ExecutionContext,
) -> Result<RemoveOutcome> {
    info!(arn = %resource.arn(), "processing");
    resource.clean(ctx).await?;
    resource.remove(ctx).await
}

/// Clean and remove each resource in input order. Failures are logged and
/// counted, never abort the batch.
pub async fn remove_batch(
    resources: &[Box<dyn Resource>],
    ctx: &ExecutionContext,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    if resources.is_empty() {
        info!("no resources to process");
        return summary;
    }

    for resource in resources {
        match remove_one(resource.as_ref(), ctx).await {
            Ok(outcome) => {
                if let RemoveOutcome::Blocked(reason) = &outcome {
                    warn!(arn = %resource.arn(), reason = %reason, "skipped");
                }
                summary.record(&outcome);
            }
            Err(err) => {
                error!(arn = %resource.arn(), error = ?err, "removal failed");
                summary.record_failure();
            }
        }
    }
    summary.log_tally();
    summary
}

/// Tear down a VPC's resources in dependency-aware order.
///
/// Resources are visited by ascending teardown priority. Before each
/// deletion the direct dependencies recorded in the graph are checked for
/// liveness; anything removed earlier in this run is assumed gone without a
/// provider round trip. A dry-run marks its would-be removals as gone so the
/// full plan is reported instead of cascading blocks.
pub async fn teardown_vpc(
    collection: &VpcResourceCollection,
    ctx: &ExecutionContext,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    if collection.is_empty() {
        info!("no resources to process");
        return summary;
    }

    info!(
        vpc = %collection.vpc_id(),
        resources = collection.len(),
        "{}tearing down VPC",
        ctx.log_prefix()
    );

    let mut assumed_gone = HashSet::new();
    for resource in collection.ordered() {
        let id = resource.vpc_resource_id();
        info!(arn = %resource.arn(), "processing");

        if let Some(blocker) = collection.first_live_dependency(&id, &assumed_gone).await {
            warn!(
                resource = %id,
                blocked_by = %blocker,
                "live dependency, skipping"
            );
            summary.record(&RemoveOutcome::Blocked(format!(
                "live dependency {blocker}"
            )));
            continue;
        }

        match remove_one(resource.as_ref(), ctx).await {
            Ok(outcome) => {
                if outcome.is_success() {
                    assumed_gone.insert(id);
                } else if let RemoveOutcome::Blocked(reason) = &outcome {
                    warn!(arn = %resource.arn(), reason = %reason, "skipped");
                }
                summary.record(&outcome);
            }
            Err(err) => {
                error!(arn = %resource.arn(), error = ?err, "removal failed");
                summary.record_failure();
            }
        }
    }
    summary.log_tally();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::vpc::{VpcResource, VpcResourceKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubResource {
        arn: String,
        fail: bool,
        removals: Arc<AtomicUsize>,
    }

    impl StubResource {
        fn new(arn: &str, fail: bool, removals: Arc<AtomicUsize>) -> Box<dyn Resource> {
            Box::new(Self {
                arn: arn.to_string(),
                fail,
                removals,
            })
        }
    }

    #[async_trait]
    impl Resource for StubResource {
        fn arn(&self) -> &str {
            &self.arn
        }

        fn resource_type(&self) -> &'static str {
            "stub"
        }

        async fn exists(&self) -> bool {
            true
        }

        async fn remove(&self, _ctx: &ExecutionContext) -> Result<RemoveOutcome> {
            self.removals.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("simulated provider failure");
            }
            Ok(RemoveOutcome::Removed)
        }
    }

    fn auto_ctx() -> ExecutionContext {
        ExecutionContext {
            auto_approve: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let summary = remove_batch(&[], &auto_ctx()).await;
        assert_eq!(summary, BatchSummary::default());
    }

    #[tokio::test]
    async fn batch_attempts_every_resource_and_counts_failures() {
        let removals = Arc::new(AtomicUsize::new(0));
        let resources = vec![
            StubResource::new("arn:aws:s3:::a", false, removals.clone()),
            StubResource::new("arn:aws:s3:::b", true, removals.clone()),
            StubResource::new("arn:aws:s3:::c", false, removals.clone()),
            StubResource::new("arn:aws:s3:::d", true, removals.clone()),
        ];
        let summary = remove_batch(&resources, &auto_ctx()).await;
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(removals.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn single_removal_propagates_errors() {
        let removals = Arc::new(AtomicUsize::new(0));
        let failing = StubResource::new("arn:aws:s3:::a", true, removals);
        assert!(remove_one(failing.as_ref(), &auto_ctx()).await.is_err());
    }

    struct StubVpcResource {
        arn: String,
        id: String,
        kind: VpcResourceKind,
        alive: bool,
        removals: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Resource for StubVpcResource {
        fn arn(&self) -> &str {
            &self.arn
        }

        fn resource_type(&self) -> &'static str {
            "stub"
        }

        async fn exists(&self) -> bool {
            self.alive
        }

        async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
            if ctx.dry_run {
                return Ok(RemoveOutcome::DryRun);
            }
            self.removals.fetch_add(1, Ordering::SeqCst);
            Ok(RemoveOutcome::Removed)
        }
    }

    impl VpcResource for StubVpcResource {
        fn vpc_id(&self) -> &str {
            "vpc-0abc"
        }

        fn kind(&self) -> VpcResourceKind {
            self.kind
        }

        fn resource_id(&self) -> &str {
            &self.id
        }
    }

    fn vpc_stub(
        kind: VpcResourceKind,
        id: &str,
        alive: bool,
        removals: &Arc<AtomicUsize>,
    ) -> Arc<StubVpcResource> {
        Arc::new(StubVpcResource {
            arn: format!("arn:aws:ec2:eu-west-1:123456789012:{}/{id}", kind.label()),
            id: id.to_string(),
            kind,
            alive,
            removals: removals.clone(),
        })
    }

    #[tokio::test]
    async fn teardown_removes_dependencies_before_dependents() {
        use crate::resource::vpc::graph::VpcResourceId;

        let removals = Arc::new(AtomicUsize::new(0));
        let mut collection = VpcResourceCollection::new("vpc-0abc");
        // Discovery order is subnet first; teardown order must still delete
        // the interface before the subnet.
        collection.push(vpc_stub(VpcResourceKind::Subnet, "subnet-1", true, &removals));
        collection.push(vpc_stub(
            VpcResourceKind::NetworkInterface,
            "eni-1",
            true,
            &removals,
        ));
        collection.add_dependency(
            VpcResourceId::new(VpcResourceKind::Subnet, "subnet-1"),
            VpcResourceId::new(VpcResourceKind::NetworkInterface, "eni-1"),
        );

        let summary = teardown_vpc(&collection, &auto_ctx()).await;
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(removals.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn live_external_dependency_blocks_without_failing() {
        use crate::resource::vpc::graph::VpcResourceId;

        let removals = Arc::new(AtomicUsize::new(0));
        let mut collection = VpcResourceCollection::new("vpc-0abc");
        collection.push(vpc_stub(VpcResourceKind::Subnet, "subnet-1", true, &removals));
        // Edge to a resource not in the collection: treated as live.
        collection.add_dependency(
            VpcResourceId::new(VpcResourceKind::Subnet, "subnet-1"),
            VpcResourceId::new(VpcResourceKind::NetworkInterface, "eni-external"),
        );

        let summary = teardown_vpc(&collection, &auto_ctx()).await;
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(removals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_collection_short_circuits() {
        let collection = VpcResourceCollection::new("vpc-0abc");
        let summary = teardown_vpc(&collection, &auto_ctx()).await;
        assert_eq!(summary, BatchSummary::default());
    }

    #[tokio::test]
    async fn dry_run_reports_full_plan() {
        use crate::resource::vpc::graph::VpcResourceId;

        let removals = Arc::new(AtomicUsize::new(0));
        let mut collection = VpcResourceCollection::new("vpc-0abc");
        collection.push(vpc_stub(VpcResourceKind::Subnet, "subnet-1", true, &removals));
        collection.push(vpc_stub(
            VpcResourceKind::NetworkInterface,
            "eni-1",
            true,
            &removals,
        ));
        collection.add_dependency(
            VpcResourceId::new(VpcResourceKind::Subnet, "subnet-1"),
            VpcResourceId::new(VpcResourceKind::NetworkInterface, "eni-1"),
        );

        let ctx = ExecutionContext {
            dry_run: true,
            ..Default::default()
        };
        let summary = teardown_vpc(&collection, &ctx).await;
        // Both resources reported as would-remove; nothing actually removed.
        assert_eq!(summary.succeeded, 2);
        assert_eq!(removals.load(Ordering::SeqCst), 0);
    }
}
