//! VPC endpoints
//!
//! Endpoints are deleted in batch form by the API; this resource wraps the
//! single-id case and surfaces per-id failures from the response. Deletion is
//! accepted in the available and failed states.

use crate::arn;
use crate::aws::{classify_anyhow_error, AwsContext};
use crate::context::ExecutionContext;
use crate::resource::vpc::{VpcResource, VpcResourceKind};
use crate::resource::{execute_removal, Eligibility, RemoveOutcome, Resource};
use crate::tags::{self, Tag};
use crate::wait::{wait_until, Probe, WaitConfig, WaitOutcome};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::types::{State, VpcEndpoint as DescribedEndpoint};
use tracing::warn;

/// Pure deletion-eligibility decision.
pub fn endpoint_eligibility(state: Option<&State>) -> Eligibility {
    match state {
        Some(State::Available) | Some(State::Failed) => Eligibility::Eligible,
        Some(State::Deleting) | Some(State::Deleted) | None => Eligibility::Eligible,
        Some(other) => Eligibility::blocked(format!("endpoint state {}", other.as_str())),
    }
}

pub struct VpcEndpoint {
    client: aws_sdk_ec2::Client,
    vpc_id: String,
    endpoint_id: String,
    arn: String,
    tags: Vec<Tag>,
    state: Option<State>,
}

impl VpcEndpoint {
    pub fn from_described(
        aws: &AwsContext,
        account: &str,
        described: &DescribedEndpoint,
    ) -> Result<Self> {
        let endpoint_id = described
            .vpc_endpoint_id()
            .context("Described VPC endpoint carries no id")?
            .to_string();
        let vpc_id = described
            .vpc_id()
            .context("Described VPC endpoint carries no VPC id")?
            .to_string();
        Ok(Self {
            client: aws.ec2_client(),
            arn: arn::ec2_resource(aws.region(), account, "vpc-endpoint", &endpoint_id),
            tags: tags::from_ec2_tags(described.tags()),
            state: described.state().cloned(),
            vpc_id,
            endpoint_id,
        })
    }

    async fn current_state(&self) -> Result<Option<State>> {
        let described = self
            .client
            .describe_vpc_endpoints()
            .vpc_endpoint_ids(&self.endpoint_id)
            .send()
            .await
            .with_context(|| format!("Failed to describe endpoint {}", self.endpoint_id))?;
        Ok(described
            .vpc_endpoints()
            .first()
            .and_then(|e| e.state())
            .cloned())
    }

    async fn await_deletion(&self) -> Result<()> {
        let outcome = wait_until(
            &format!("vpc-endpoint {} deletion", self.endpoint_id),
            WaitConfig::fast(),
            || async {
                let state = match self.current_state().await {
                    Ok(state) => state,
                    Err(err) => {
                        if classify_anyhow_error(&err, self.resource_type(), &self.endpoint_id)
                            .is_not_found()
                        {
                            return Ok(Probe::Done);
                        }
                        return Err(err);
                    }
                };
                Ok(match state {
                    Some(State::Deleted) | None => Probe::Done,
                    _ => Probe::Pending,
                })
            },
        )
        .await?;
        if outcome == WaitOutcome::TimedOut {
            warn!(endpoint = %self.endpoint_id, "deletion still in progress after wait budget");
        }
        Ok(())
    }
}

#[async_trait]
impl Resource for VpcEndpoint {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "vpc-endpoint"
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn can_delete(&self) -> Eligibility {
        endpoint_eligibility(self.state.as_ref())
    }

    async fn exists(&self) -> bool {
        match self.current_state().await {
            Ok(Some(State::Deleted)) | Ok(None) => false,
            Ok(Some(_)) => true,
            Err(err) => {
                if classify_anyhow_error(&err, self.resource_type(), &self.endpoint_id)
                    .is_not_found()
                {
                    false
                } else {
                    warn!(endpoint = %self.endpoint_id, error = %err, "existence check failed, assuming present");
                    true
                }
            }
        }
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        if let Eligibility::Blocked(reason) = self.can_delete() {
            warn!(endpoint = %self.endpoint_id, reason = %reason, "refusing to delete");
            return Ok(RemoveOutcome::Blocked(reason));
        }
        let outcome = execute_removal(ctx, self.resource_type(), &self.endpoint_id, || async {
            let response = self
                .client
                .delete_vpc_endpoints()
                .vpc_endpoint_ids(&self.endpoint_id)
                .send()
                .await
                .with_context(|| format!("Failed to delete endpoint {}", self.endpoint_id))?;
            if let Some(failure) = response.unsuccessful().first() {
                let detail = failure
                    .error()
                    .and_then(|e| e.message())
                    .unwrap_or("no detail");
                bail!("Endpoint {} deletion rejected: {detail}", self.endpoint_id);
            }
            Ok(())
        })
        .await?;

        if outcome == RemoveOutcome::Removed {
            self.await_deletion().await?;
        }
        Ok(outcome)
    }
}

impl VpcResource for VpcEndpoint {
    fn vpc_id(&self) -> &str {
        &self.vpc_id
    }

    fn kind(&self) -> VpcResourceKind {
        VpcResourceKind::VpcEndpoint
    }

    fn resource_id(&self) -> &str {
        &self.endpoint_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_and_failed_are_eligible() {
        assert!(endpoint_eligibility(Some(&State::Available)).is_eligible());
        assert!(endpoint_eligibility(Some(&State::Failed)).is_eligible());
    }

    #[test]
    fn pending_states_are_blocked() {
        assert!(!endpoint_eligibility(Some(&State::Pending)).is_eligible());
        assert!(!endpoint_eligibility(Some(&State::PendingAcceptance)).is_eligible());
    }

    #[tokio::test]
    async fn described_endpoint_maps_cleanly() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let described = DescribedEndpoint::builder()
            .vpc_endpoint_id("vpce-0abc")
            .vpc_id("vpc-0abc")
            .state(State::Available)
            .build();
        let endpoint = VpcEndpoint::from_described(&aws, "123456789012", &described).unwrap();
        assert_eq!(endpoint.resource_id(), "vpce-0abc");
        assert!(endpoint.can_delete().is_eligible());
    }
}
