//! Subnets
//!
//! A subnet can only go once nothing lives in it: no network interfaces
//! (tracked through the dependency graph) and no instances that are pending,
//! running, stopping or stopped. Default-for-AZ subnets are never deleted.
//! The clean stage sweeps out leftover unmanaged interfaces and releases
//! explicit route table associations.

use crate::arn;
use crate::aws::{classify_sdk_error, AwsContext};
use crate::confirm;
use crate::context::ExecutionContext;
use crate::resource::vpc::network_interface::MANAGED_INTERFACE_TYPES;
use crate::resource::vpc::{VpcResource, VpcResourceKind};
use crate::resource::{execute_removal, Eligibility, RemoveOutcome, Resource};
use crate::tags::{self, Tag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::types::{Filter, NetworkInterfaceStatus, RouteTable};
use tracing::{debug, warn};

/// Pure deletion-eligibility decision from state captured at discovery.
/// Network interface liveness is the graph's job, not this function's.
pub fn subnet_eligibility(default_for_az: bool, live_instances: usize) -> Eligibility {
    if default_for_az {
        Eligibility::blocked("default subnet for its availability zone")
    } else if live_instances > 0 {
        Eligibility::blocked(format!("{live_instances} live instance(s) in subnet"))
    } else {
        Eligibility::Eligible
    }
}

/// What the clean stage does with an interface left in the subnet. Interfaces
/// owned by another service or attached to an instance go away with their
/// parent and are left alone here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceCleanup {
    Skip,
    Delete,
    DetachThenDelete,
}

pub fn interface_cleanup(
    interface_type: &str,
    attached_to_instance: bool,
    status: Option<&NetworkInterfaceStatus>,
) -> InterfaceCleanup {
    if MANAGED_INTERFACE_TYPES.contains(&interface_type) || attached_to_instance {
        InterfaceCleanup::Skip
    } else if status == Some(&NetworkInterfaceStatus::InUse) {
        InterfaceCleanup::DetachThenDelete
    } else {
        InterfaceCleanup::Delete
    }
}

/// Route table association ids to release before the subnet can go. The
/// implicit main table association stays.
pub fn removable_associations(subnet_id: &str, tables: &[RouteTable]) -> Vec<String> {
    tables
        .iter()
        .flat_map(|t| t.associations())
        .filter(|a| a.subnet_id() == Some(subnet_id) && !a.main().unwrap_or(false))
        .filter_map(|a| a.route_table_association_id())
        .map(String::from)
        .collect()
}

pub struct Subnet {
    client: aws_sdk_ec2::Client,
    vpc_id: String,
    subnet_id: String,
    arn: String,
    tags: Vec<Tag>,
    default_for_az: bool,
    live_instances: usize,
}

impl Subnet {
    /// Build from a described subnet. `live_instances` counts instances in
    /// the subnet that are pending, running, stopping or stopped.
    pub fn from_described(
        aws: &AwsContext,
        account: &str,
        described: &aws_sdk_ec2::types::Subnet,
        live_instances: usize,
    ) -> Result<Self> {
        let subnet_id = described
            .subnet_id()
            .context("Described subnet carries no id")?
            .to_string();
        let vpc_id = described
            .vpc_id()
            .context("Described subnet carries no VPC id")?
            .to_string();
        Ok(Self {
            client: aws.ec2_client(),
            arn: arn::ec2_resource(aws.region(), account, "subnet", &subnet_id),
            tags: tags::from_ec2_tags(described.tags()),
            default_for_az: described.default_for_az().unwrap_or(false),
            live_instances,
            vpc_id,
            subnet_id,
        })
    }

    /// Delete unmanaged interfaces still sitting in the subnet. In-use ones
    /// without an instance attachment are force-detached first.
    async fn clear_interfaces(&self, ctx: &ExecutionContext) -> Result<()> {
        let mut interfaces = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .describe_network_interfaces()
                .filters(
                    Filter::builder()
                        .name("subnet-id")
                        .values(&self.subnet_id)
                        .build(),
                )
                .set_next_token(next_token.take())
                .send()
                .await
                .with_context(|| {
                    format!("Failed to list interfaces in subnet {}", self.subnet_id)
                })?;
            interfaces.extend(page.network_interfaces().iter().cloned());
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }

        for interface in interfaces {
            let Some(interface_id) = interface.network_interface_id() else {
                continue;
            };
            let interface_type = interface
                .interface_type()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default();
            let attachment = interface.attachment();
            let attached_to_instance = attachment.is_some_and(|a| a.instance_id().is_some());
            let cleanup = interface_cleanup(
                &interface_type,
                attached_to_instance,
                interface.status(),
            );
            if cleanup == InterfaceCleanup::Skip {
                debug!(interface = %interface_id, "interface goes with its parent, leaving it");
                continue;
            }
            let operation = format!(
                "delete leftover interface {interface_id} in subnet {}",
                self.subnet_id
            );
            if !confirm::should_proceed(ctx, &operation)? {
                continue;
            }
            if cleanup == InterfaceCleanup::DetachThenDelete {
                if let Some(attachment_id) = attachment.and_then(|a| a.attachment_id()) {
                    if let Err(err) = self
                        .client
                        .detach_network_interface()
                        .attachment_id(attachment_id)
                        .force(true)
                        .send()
                        .await
                    {
                        let classified =
                            classify_sdk_error(&err, "network-interface", interface_id);
                        if !classified.is_not_found() {
                            return Err(anyhow::Error::from(err).context(classified.to_string()));
                        }
                    }
                }
            }
            if let Err(err) = self
                .client
                .delete_network_interface()
                .network_interface_id(interface_id)
                .send()
                .await
            {
                let classified = classify_sdk_error(&err, "network-interface", interface_id);
                if !classified.is_not_found() {
                    return Err(anyhow::Error::from(err).context(classified.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Release explicit route table associations pointing at the subnet.
    async fn release_route_associations(&self, ctx: &ExecutionContext) -> Result<()> {
        let mut tables = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .describe_route_tables()
                .filters(
                    Filter::builder()
                        .name("association.subnet-id")
                        .values(&self.subnet_id)
                        .build(),
                )
                .set_next_token(next_token.take())
                .send()
                .await
                .with_context(|| {
                    format!("Failed to list route tables for subnet {}", self.subnet_id)
                })?;
            tables.extend(page.route_tables().iter().cloned());
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }

        for association_id in removable_associations(&self.subnet_id, &tables) {
            let operation = format!(
                "disassociate route table association {association_id} from subnet {}",
                self.subnet_id
            );
            if !confirm::should_proceed(ctx, &operation)? {
                continue;
            }
            if let Err(err) = self
                .client
                .disassociate_route_table()
                .association_id(&association_id)
                .send()
                .await
            {
                let classified = classify_sdk_error(&err, "route-table", &association_id);
                if classified.is_not_found() {
                    debug!(association = %association_id, "association already gone");
                    continue;
                }
                return Err(anyhow::Error::from(err).context(classified.to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Resource for Subnet {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "subnet"
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn is_default_resource(&self) -> bool {
        self.default_for_az
    }

    fn can_delete(&self) -> Eligibility {
        subnet_eligibility(self.default_for_az, self.live_instances)
    }

    async fn exists(&self) -> bool {
        let result = self
            .client
            .describe_subnets()
            .subnet_ids(&self.subnet_id)
            .send()
            .await;
        match result {
            Ok(out) => !out.subnets().is_empty(),
            Err(err) => {
                let classified = classify_sdk_error(&err, self.resource_type(), &self.subnet_id);
                if classified.is_not_found() {
                    false
                } else {
                    warn!(subnet = %self.subnet_id, error = %classified, "existence check failed, assuming present");
                    true
                }
            }
        }
    }

    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        if self.default_for_az {
            return Ok(());
        }
        self.clear_interfaces(ctx).await?;
        self.release_route_associations(ctx).await
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        if let Eligibility::Blocked(reason) = self.can_delete() {
            warn!(subnet = %self.subnet_id, reason = %reason, "refusing to delete");
            return Ok(RemoveOutcome::Blocked(reason));
        }
        execute_removal(ctx, self.resource_type(), &self.subnet_id, || async {
            self.client
                .delete_subnet()
                .subnet_id(&self.subnet_id)
                .send()
                .await
                .with_context(|| format!("Failed to delete subnet {}", self.subnet_id))?;
            Ok(())
        })
        .await
    }
}

impl VpcResource for Subnet {
    fn vpc_id(&self) -> &str {
        &self.vpc_id
    }

    fn kind(&self) -> VpcResourceKind {
        VpcResourceKind::Subnet
    }

    fn resource_id(&self) -> &str {
        &self.subnet_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_subnet_is_eligible() {
        assert!(subnet_eligibility(false, 0).is_eligible());
    }

    #[test]
    fn default_subnet_is_blocked() {
        assert!(!subnet_eligibility(true, 0).is_eligible());
    }

    #[test]
    fn live_instances_block() {
        match subnet_eligibility(false, 2) {
            Eligibility::Blocked(reason) => assert!(reason.contains("2 live instance")),
            Eligibility::Eligible => panic!("expected blocked"),
        }
    }

    #[test]
    fn managed_and_instance_interfaces_are_left_alone() {
        assert_eq!(
            interface_cleanup("natGateway", false, Some(&NetworkInterfaceStatus::InUse)),
            InterfaceCleanup::Skip
        );
        assert_eq!(
            interface_cleanup("interface", true, Some(&NetworkInterfaceStatus::InUse)),
            InterfaceCleanup::Skip
        );
    }

    #[test]
    fn in_use_interfaces_are_detached_before_deletion() {
        assert_eq!(
            interface_cleanup("interface", false, Some(&NetworkInterfaceStatus::InUse)),
            InterfaceCleanup::DetachThenDelete
        );
        assert_eq!(
            interface_cleanup("interface", false, Some(&NetworkInterfaceStatus::Available)),
            InterfaceCleanup::Delete
        );
        assert_eq!(interface_cleanup("interface", false, None), InterfaceCleanup::Delete);
    }

    #[test]
    fn main_association_is_never_released() {
        use aws_sdk_ec2::types::RouteTableAssociation;

        let tables = vec![RouteTable::builder()
            .route_table_id("rtb-1")
            .associations(
                RouteTableAssociation::builder()
                    .route_table_association_id("rtbassoc-main")
                    .subnet_id("subnet-0abc")
                    .main(true)
                    .build(),
            )
            .associations(
                RouteTableAssociation::builder()
                    .route_table_association_id("rtbassoc-explicit")
                    .subnet_id("subnet-0abc")
                    .main(false)
                    .build(),
            )
            .associations(
                RouteTableAssociation::builder()
                    .route_table_association_id("rtbassoc-other")
                    .subnet_id("subnet-other")
                    .build(),
            )
            .build()];
        assert_eq!(
            removable_associations("subnet-0abc", &tables),
            vec!["rtbassoc-explicit"]
        );
    }

    #[tokio::test]
    async fn described_subnet_maps_cleanly() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let described = aws_sdk_ec2::types::Subnet::builder()
            .subnet_id("subnet-0abc")
            .vpc_id("vpc-0abc")
            .default_for_az(false)
            .tags(
                aws_sdk_ec2::types::Tag::builder()
                    .key("Team")
                    .value("A")
                    .build(),
            )
            .build();
        let subnet = Subnet::from_described(&aws, "123456789012", &described, 0).unwrap();
        assert_eq!(subnet.resource_id(), "subnet-0abc");
        assert_eq!(subnet.vpc_id(), "vpc-0abc");
        assert_eq!(subnet.name(), "subnet-0abc");
        assert_eq!(subnet.tags().len(), 1);
        assert!(subnet.can_delete().is_eligible());
    }

    #[tokio::test]
    async fn described_subnet_without_id_is_rejected() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let described = aws_sdk_ec2::types::Subnet::builder().vpc_id("vpc-0abc").build();
        assert!(Subnet::from_described(&aws, "123456789012", &described, 0).is_err());
    }
}
