//! Network interfaces
//!
//! Most teardown blockers bottom out here. Interfaces created by another
//! service (NAT gateways, endpoints, load balancers, Lambda, EFS) disappear
//! with their parent and are never deleted directly. A primary interface
//! (device index 0) belongs to its instance, and an interface attached to a
//! pending, running or stopping instance must be detached by termination
//! first.

use crate::arn;
use crate::aws::{classify_sdk_error, AwsContext};
use crate::confirm;
use crate::context::ExecutionContext;
use crate::resource::vpc::{VpcResource, VpcResourceKind};
use crate::resource::{execute_removal, Eligibility, RemoveOutcome, Resource};
use crate::tags::{self, Tag};
use crate::wait::{wait_until, Probe, WaitConfig, WaitOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::types::{NetworkInterface as DescribedInterface, NetworkInterfaceStatus};
use std::time::Duration;
use tracing::{debug, warn};

/// Interface types owned by another AWS service. Wire values as the EC2 API
/// reports them.
pub const MANAGED_INTERFACE_TYPES: &[&str] =
    &["natGateway", "vpc_endpoint", "load_balancer", "lambda", "efs"];

/// Instance states whose attachments block interface deletion.
const BLOCKING_INSTANCE_STATES: &[&str] = &["pending", "running", "stopping"];

/// Association ids of elastic IPs bound to the interface's private
/// addresses. Public IPs handed out by the provider carry no association id
/// and need no release.
pub fn eip_association_ids(described: &DescribedInterface) -> Vec<String> {
    described
        .private_ip_addresses()
        .iter()
        .filter_map(|ip| ip.association())
        .filter_map(|a| a.association_id())
        .map(String::from)
        .collect()
}

/// Attachment id to force-detach before deletion, if any. The primary
/// interface (device index 0) belongs to its instance and stays attached.
pub fn detachable_attachment(described: &DescribedInterface) -> Option<&str> {
    let attachment = described.attachment()?;
    if attachment.device_index()? == 0 {
        return None;
    }
    attachment.attachment_id()
}

/// Pure deletion-eligibility decision from state captured at discovery.
pub fn network_interface_eligibility(
    interface_type: &str,
    device_index: Option<i32>,
    attached_instance_state: Option<&str>,
) -> Eligibility {
    if MANAGED_INTERFACE_TYPES.contains(&interface_type) {
        return Eligibility::blocked(format!("managed by service ({interface_type})"));
    }
    if device_index == Some(0) && attached_instance_state.is_some() {
        return Eligibility::blocked("primary interface of an instance");
    }
    if let Some(state) = attached_instance_state {
        if BLOCKING_INSTANCE_STATES.contains(&state) {
            return Eligibility::blocked(format!("attached to {state} instance"));
        }
    }
    Eligibility::Eligible
}

pub struct NetworkInterface {
    client: aws_sdk_ec2::Client,
    vpc_id: String,
    interface_id: String,
    arn: String,
    tags: Vec<Tag>,
    interface_type: String,
    device_index: Option<i32>,
    attached_instance_state: Option<String>,
    attached_group_ids: Vec<String>,
    subnet_id: Option<String>,
}

impl NetworkInterface {
    /// Build from a described interface. `attached_instance_state` is the
    /// state of the attached instance, looked up by the factory when the
    /// attachment names one.
    pub fn from_described(
        aws: &AwsContext,
        account: &str,
        described: &DescribedInterface,
        attached_instance_state: Option<String>,
    ) -> Result<Self> {
        let interface_id = described
            .network_interface_id()
            .context("Described network interface carries no id")?
            .to_string();
        let vpc_id = described
            .vpc_id()
            .context("Described network interface carries no VPC id")?
            .to_string();
        Ok(Self {
            client: aws.ec2_client(),
            arn: arn::ec2_resource(aws.region(), account, "network-interface", &interface_id),
            tags: tags::from_ec2_tags(described.tag_set()),
            interface_type: described
                .interface_type()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            device_index: described.attachment().and_then(|a| a.device_index()),
            attached_group_ids: described
                .groups()
                .iter()
                .filter_map(|g| g.group_id())
                .map(String::from)
                .collect(),
            subnet_id: described.subnet_id().map(String::from),
            attached_instance_state,
            vpc_id,
            interface_id,
        })
    }

    /// Security groups attached to this interface, for graph construction.
    pub fn attached_group_ids(&self) -> &[String] {
        &self.attached_group_ids
    }

    /// Subnet this interface lives in, for graph construction.
    pub fn subnet_id(&self) -> Option<&str> {
        self.subnet_id.as_deref()
    }

    /// The interface as the provider sees it right now. `None` when gone.
    async fn describe_live(&self) -> Result<Option<DescribedInterface>> {
        match self
            .client
            .describe_network_interfaces()
            .network_interface_ids(&self.interface_id)
            .send()
            .await
        {
            Ok(out) => Ok(out.network_interfaces().first().cloned()),
            Err(err) => {
                let classified =
                    classify_sdk_error(&err, self.resource_type(), &self.interface_id);
                if classified.is_not_found() {
                    Ok(None)
                } else {
                    Err(anyhow::Error::from(err).context(classified.to_string()))
                }
            }
        }
    }

    /// Poll until the attachment is gone. Detachment is quick but not
    /// instantaneous; deleting too early fails with an in-use error.
    async fn await_detachment(&self) -> Result<()> {
        let outcome = wait_until(
            &format!("network-interface {} detachment", self.interface_id),
            WaitConfig::new(Duration::from_secs(2), 30),
            || async {
                Ok(match self.describe_live().await? {
                    None => Probe::Done,
                    Some(described) => match described.status() {
                        Some(NetworkInterfaceStatus::InUse) => Probe::Pending,
                        _ => Probe::Done,
                    },
                })
            },
        )
        .await?;
        if outcome == WaitOutcome::TimedOut {
            warn!(interface = %self.interface_id, "still attached after wait budget");
        }
        Ok(())
    }
}

#[async_trait]
impl Resource for NetworkInterface {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "network-interface"
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn can_delete(&self) -> Eligibility {
        network_interface_eligibility(
            &self.interface_type,
            self.device_index,
            self.attached_instance_state.as_deref(),
        )
    }

    async fn exists(&self) -> bool {
        let result = self
            .client
            .describe_network_interfaces()
            .network_interface_ids(&self.interface_id)
            .send()
            .await;
        match result {
            Ok(out) => !out.network_interfaces().is_empty(),
            Err(err) => {
                let classified =
                    classify_sdk_error(&err, self.resource_type(), &self.interface_id);
                if classified.is_not_found() {
                    false
                } else {
                    warn!(interface = %self.interface_id, error = %classified, "existence check failed, assuming present");
                    true
                }
            }
        }
    }

    /// Release elastic IP associations and force-detach a non-primary
    /// attachment so the delete call is accepted.
    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        if let Eligibility::Blocked(reason) = self.can_delete() {
            debug!(interface = %self.interface_id, reason = %reason, "not cleanable");
            return Ok(());
        }
        let Some(described) = self.describe_live().await? else {
            return Ok(());
        };

        for association_id in eip_association_ids(&described) {
            let operation = format!(
                "disassociate elastic IP {association_id} from {}",
                self.interface_id
            );
            if !confirm::should_proceed(ctx, &operation)? {
                continue;
            }
            if let Err(err) = self
                .client
                .disassociate_address()
                .association_id(&association_id)
                .send()
                .await
            {
                let classified = classify_sdk_error(&err, "address", &association_id);
                if classified.is_not_found() {
                    debug!(association = %association_id, "association already gone");
                    continue;
                }
                return Err(anyhow::Error::from(err).context(classified.to_string()));
            }
        }

        if let Some(attachment_id) = detachable_attachment(&described) {
            let operation = format!("force-detach interface {}", self.interface_id);
            if !confirm::should_proceed(ctx, &operation)? {
                return Ok(());
            }
            if let Err(err) = self
                .client
                .detach_network_interface()
                .attachment_id(attachment_id)
                .force(true)
                .send()
                .await
            {
                let classified =
                    classify_sdk_error(&err, self.resource_type(), &self.interface_id);
                if !classified.is_not_found() {
                    return Err(anyhow::Error::from(err).context(classified.to_string()));
                }
            } else {
                self.await_detachment().await?;
            }
        }
        Ok(())
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        if let Eligibility::Blocked(reason) = self.can_delete() {
            warn!(interface = %self.interface_id, reason = %reason, "refusing to delete");
            return Ok(RemoveOutcome::Blocked(reason));
        }
        execute_removal(ctx, self.resource_type(), &self.interface_id, || async {
            self.client
                .delete_network_interface()
                .network_interface_id(&self.interface_id)
                .send()
                .await
                .with_context(|| {
                    format!("Failed to delete network interface {}", self.interface_id)
                })?;
            Ok(())
        })
        .await
    }
}

impl VpcResource for NetworkInterface {
    fn vpc_id(&self) -> &str {
        &self.vpc_id
    }

    fn kind(&self) -> VpcResourceKind {
        VpcResourceKind::NetworkInterface
    }

    fn resource_id(&self) -> &str {
        &self.interface_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_interface_is_eligible() {
        assert!(network_interface_eligibility("interface", None, None).is_eligible());
    }

    #[test]
    fn managed_interfaces_are_blocked() {
        for kind in ["natGateway", "vpc_endpoint", "load_balancer", "lambda", "efs"] {
            assert!(
                !network_interface_eligibility(kind, None, None).is_eligible(),
                "{kind} should be blocked"
            );
        }
    }

    #[test]
    fn primary_interface_is_blocked() {
        let eligibility = network_interface_eligibility("interface", Some(0), Some("stopped"));
        assert!(!eligibility.is_eligible());
    }

    #[test]
    fn attachment_to_running_instance_blocks() {
        for state in ["pending", "running", "stopping"] {
            assert!(
                !network_interface_eligibility("interface", Some(1), Some(state)).is_eligible(),
                "{state} should block"
            );
        }
    }

    #[test]
    fn secondary_interface_on_stopped_instance_is_eligible() {
        assert!(network_interface_eligibility("interface", Some(1), Some("stopped")).is_eligible());
    }

    #[test]
    fn primary_attachment_is_not_detachable() {
        use aws_sdk_ec2::types::NetworkInterfaceAttachment;

        let primary = DescribedInterface::builder()
            .network_interface_id("eni-1")
            .attachment(
                NetworkInterfaceAttachment::builder()
                    .attachment_id("eni-attach-1")
                    .device_index(0)
                    .build(),
            )
            .build();
        assert_eq!(detachable_attachment(&primary), None);

        let secondary = DescribedInterface::builder()
            .network_interface_id("eni-2")
            .attachment(
                NetworkInterfaceAttachment::builder()
                    .attachment_id("eni-attach-2")
                    .device_index(1)
                    .build(),
            )
            .build();
        assert_eq!(detachable_attachment(&secondary), Some("eni-attach-2"));

        let detached = DescribedInterface::builder()
            .network_interface_id("eni-3")
            .build();
        assert_eq!(detachable_attachment(&detached), None);
    }

    #[test]
    fn only_associated_addresses_yield_association_ids() {
        use aws_sdk_ec2::types::{
            NetworkInterfaceAssociation, NetworkInterfacePrivateIpAddress,
        };

        let described = DescribedInterface::builder()
            .network_interface_id("eni-1")
            .private_ip_addresses(
                NetworkInterfacePrivateIpAddress::builder()
                    .private_ip_address("10.0.0.5")
                    .association(
                        NetworkInterfaceAssociation::builder()
                            .association_id("eipassoc-1")
                            .build(),
                    )
                    .build(),
            )
            .private_ip_addresses(
                NetworkInterfacePrivateIpAddress::builder()
                    .private_ip_address("10.0.0.6")
                    .build(),
            )
            .build();
        assert_eq!(eip_association_ids(&described), vec!["eipassoc-1"]);
    }

    #[tokio::test]
    async fn described_interface_maps_cleanly() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let described = DescribedInterface::builder()
            .network_interface_id("eni-0abc")
            .vpc_id("vpc-0abc")
            .subnet_id("subnet-0abc")
            .groups(
                aws_sdk_ec2::types::GroupIdentifier::builder()
                    .group_id("sg-0abc")
                    .build(),
            )
            .build();
        let eni =
            NetworkInterface::from_described(&aws, "123456789012", &described, None).unwrap();
        assert_eq!(eni.resource_id(), "eni-0abc");
        assert_eq!(eni.subnet_id(), Some("subnet-0abc"));
        assert_eq!(eni.attached_group_ids(), &["sg-0abc"]);
        assert!(eni.can_delete().is_eligible());
    }
}
