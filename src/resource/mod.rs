//! The resource abstraction
//!
//! Every deletable AWS object implements [`Resource`]. A resource knows its
//! ARN, can check whether it still exists, can clean out its inner content
//! (bucket objects, repository images) and can remove itself. Removal always
//! goes through [`execute_removal`], which applies the confirmation gate and
//! folds "already gone" service errors into a success-equivalent outcome.

pub mod cloudfront;
pub mod codebuild;
pub mod codepipeline;
pub mod dynamodb;
pub mod ec2;
pub mod ecr;
pub mod ecs;
pub mod iam;
pub mod s3;
pub mod vpc;

use crate::arn::Arn;
use crate::aws::{classify_anyhow_error, AwsError};
use crate::confirm;
use crate::context::ExecutionContext;
use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, info};

/// What happened when a resource was asked to remove itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The deletion call succeeded.
    Removed,
    /// The resource was gone before we got to it.
    AlreadyGone,
    /// Dry-run: the deletion was logged, not performed.
    DryRun,
    /// The operator answered no at the prompt.
    Declined,
    /// A pre-flight check refused the deletion; the reason says why.
    Blocked(String),
}

impl RemoveOutcome {
    /// Removed, already gone and dry-run all count as success for batch
    /// tallies; declined and blocked are skips, not failures.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RemoveOutcome::Removed | RemoveOutcome::AlreadyGone | RemoveOutcome::DryRun
        )
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, RemoveOutcome::Declined | RemoveOutcome::Blocked(_))
    }
}

/// Whether a resource may be deleted right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Deletion refused; the reason is logged and surfaced as
    /// [`RemoveOutcome::Blocked`].
    Blocked(String),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Eligibility::Blocked(reason.into())
    }
}

/// A deletable AWS resource.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Full ARN of the resource.
    fn arn(&self) -> &str;

    /// Short type label used in logs and error messages, e.g. `s3-bucket`.
    fn resource_type(&self) -> &'static str;

    /// Human-readable name, derived from the ARN's resource portion.
    fn name(&self) -> String {
        self.arn()
            .parse::<Arn>()
            .map(|arn| arn.resource_name().to_string())
            .unwrap_or_else(|_| self.arn().to_string())
    }

    /// Tags captured at discovery. Empty for resources built by name or ARN.
    fn tags(&self) -> &[crate::tags::Tag] {
        &[]
    }

    /// Provider-managed defaults (default security group, default subnet)
    /// that must never be deleted.
    fn is_default_resource(&self) -> bool {
        false
    }

    /// Whether deletion would be accepted right now, based on state captured
    /// at discovery. Liveness of graph dependencies is checked separately.
    fn can_delete(&self) -> Eligibility {
        Eligibility::Eligible
    }

    /// Whether the resource currently exists. Not-found means `false`; any
    /// other provider error is treated as "still exists" so a flaky check
    /// never unblocks a dependent deletion.
    async fn exists(&self) -> bool;

    /// Remove inner content that would otherwise block deletion. Default is
    /// a no-op for resource types with nothing to empty.
    async fn clean(&self, _ctx: &ExecutionContext) -> Result<()> {
        Ok(())
    }

    /// Remove the resource, honoring the confirmation gate.
    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome>;
}

/// Gate a deletion and run it.
///
/// The flow every `remove` implementation shares: consult the confirmation
/// gate (dry-run logs and skips, auto-approve logs and proceeds, otherwise
/// prompt), run the deletion, and classify failures. A not-found error means
/// someone else already deleted the resource and is treated as success.
pub async fn execute_removal<F, Fut>(
    ctx: &ExecutionContext,
    resource_type: &str,
    resource_id: &str,
    delete: F,
) -> Result<RemoveOutcome>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let operation = format!("remove {resource_type} {resource_id}");
    if !confirm::should_proceed(ctx, &operation)? {
        return Ok(if ctx.dry_run {
            RemoveOutcome::DryRun
        } else {
            RemoveOutcome::Declined
        });
    }

    match delete().await {
        Ok(()) => {
            info!(
                resource_type = %resource_type,
                resource_id = %resource_id,
                "{}removed",
                ctx.log_prefix()
            );
            Ok(RemoveOutcome::Removed)
        }
        Err(err) => match classify_anyhow_error(&err, resource_type, resource_id) {
            AwsError::NotFound { .. } => {
                debug!(
                    resource_type = %resource_type,
                    resource_id = %resource_id,
                    "already gone"
                );
                Ok(RemoveOutcome::AlreadyGone)
            }
            classified => Err(err.context(classified.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeResource {
        arn: String,
    }

    #[async_trait]
    impl Resource for FakeResource {
        fn arn(&self) -> &str {
            &self.arn
        }

        fn resource_type(&self) -> &'static str {
            "fake"
        }

        async fn exists(&self) -> bool {
            true
        }

        async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
            execute_removal(ctx, self.resource_type(), &self.name(), || async { Ok(()) }).await
        }
    }

    fn dry_run_ctx() -> ExecutionContext {
        ExecutionContext {
            dry_run: true,
            auto_approve: false,
            region: None,
            profile: None,
        }
    }

    fn auto_ctx() -> ExecutionContext {
        ExecutionContext {
            dry_run: false,
            auto_approve: true,
            region: None,
            profile: None,
        }
    }

    #[test]
    fn name_derives_from_arn() {
        let r = FakeResource {
            arn: "arn:aws:ec2:eu-west-1:123456789012:subnet/subnet-0abc".into(),
        };
        assert_eq!(r.name(), "subnet-0abc");
    }

    #[test]
    fn unparseable_arn_falls_back_to_raw_string() {
        let r = FakeResource {
            arn: "not-an-arn".into(),
        };
        assert_eq!(r.name(), "not-an-arn");
    }

    #[tokio::test]
    async fn dry_run_never_calls_delete() {
        let ctx = dry_run_ctx();
        let called = std::sync::atomic::AtomicBool::new(false);
        let outcome = execute_removal(&ctx, "fake", "f-1", || async {
            called.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(outcome, RemoveOutcome::DryRun);
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn auto_approve_runs_delete() {
        let ctx = auto_ctx();
        let outcome = execute_removal(&ctx, "fake", "f-1", || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(outcome, RemoveOutcome::Removed);
    }

    #[tokio::test]
    async fn not_found_is_success_equivalent() {
        let ctx = auto_ctx();
        let outcome = execute_removal(&ctx, "bucket", "b-1", || async {
            Err(anyhow::anyhow!("code: Some(\"NoSuchBucket\") gone"))
        })
        .await
        .unwrap();
        assert_eq!(outcome, RemoveOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn dependency_violation_propagates() {
        let ctx = auto_ctx();
        let result = execute_removal(&ctx, "subnet", "subnet-1", || async {
            Err(anyhow::anyhow!(
                "code: Some(\"DependencyViolation\") still referenced"
            ))
        })
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn outcome_classification() {
        assert!(RemoveOutcome::Removed.is_success());
        assert!(RemoveOutcome::AlreadyGone.is_success());
        assert!(RemoveOutcome::DryRun.is_success());
        assert!(RemoveOutcome::Declined.is_skip());
        assert!(RemoveOutcome::Blocked("eni attached".into()).is_skip());
        assert!(!RemoveOutcome::Blocked("eni attached".into()).is_success());
    }
}
