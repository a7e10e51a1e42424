//! EC2 instances
//!
//! Removal means termination. A terminated instance is treated as already
//! gone; everything else (pending, running, stopping, stopped,
//! shutting-down) is fair game for `terminate_instances`.

use crate::arn;
use crate::aws::{classify_sdk_error, AwsContext};
use crate::context::ExecutionContext;
use crate::resource::{execute_removal, RemoveOutcome, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::types::InstanceStateName;
use tracing::warn;

/// Whether an instance in the given state still counts as existing.
pub fn instance_is_live(state: Option<&InstanceStateName>) -> bool {
    !matches!(state, Some(InstanceStateName::Terminated) | None)
}

pub struct Ec2Instance {
    client: aws_sdk_ec2::Client,
    instance_id: String,
    arn: String,
}

impl Ec2Instance {
    pub fn new(aws: &AwsContext, account: &str, instance_id: impl Into<String>) -> Self {
        let instance_id = instance_id.into();
        Self {
            client: aws.ec2_client(),
            arn: arn::ec2_resource(aws.region(), account, "instance", &instance_id),
            instance_id,
        }
    }
}

#[async_trait]
impl Resource for Ec2Instance {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "ec2-instance"
    }

    async fn exists(&self) -> bool {
        let result = self
            .client
            .describe_instances()
            .instance_ids(&self.instance_id)
            .send()
            .await;
        let described = match result {
            Ok(out) => out,
            Err(err) => {
                let classified =
                    classify_sdk_error(&err, self.resource_type(), &self.instance_id);
                if classified.is_not_found() {
                    return false;
                }
                warn!(instance = %self.instance_id, error = %classified, "existence check failed, assuming present");
                return true;
            }
        };

        described
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .any(|i| instance_is_live(i.state().and_then(|s| s.name())))
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.instance_id, || async {
            self.client
                .terminate_instances()
                .instance_ids(&self.instance_id)
                .send()
                .await
                .with_context(|| format!("Failed to terminate instance {}", self.instance_id))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminated_instances_are_not_live() {
        assert!(!instance_is_live(Some(&InstanceStateName::Terminated)));
        assert!(!instance_is_live(None));
    }

    #[test]
    fn running_and_stopped_instances_are_live() {
        for state in [
            InstanceStateName::Pending,
            InstanceStateName::Running,
            InstanceStateName::Stopping,
            InstanceStateName::Stopped,
        ] {
            assert!(instance_is_live(Some(&state)), "{state:?} should be live");
        }
    }

    #[tokio::test]
    async fn instance_arn_and_name() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let instance = Ec2Instance::new(&aws, "123456789012", "i-0abc123");
        assert_eq!(
            instance.arn(),
            "arn:aws:ec2:eu-west-1:123456789012:instance/i-0abc123"
        );
        assert_eq!(instance.name(), "i-0abc123");
    }
}
