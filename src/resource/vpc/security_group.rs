//! Security groups
//!
//! The group named `default` is provider-managed and never deleted. A group
//! referenced from rules in *other* groups rejects deletion until those rules
//! are gone; the clean stage revokes this group's own rules so the references
//! it holds stop blocking the rest of the teardown. Attached interfaces are
//! tracked through the dependency graph.

use crate::arn;
use crate::aws::{classify_sdk_error, retry_throttled, AwsContext};
use crate::confirm;
use crate::context::ExecutionContext;
use crate::resource::vpc::{VpcResource, VpcResourceKind};
use crate::resource::{execute_removal, Eligibility, RemoveOutcome, Resource};
use crate::tags::{self, Tag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::types::{Filter, IpPermission, SecurityGroup as DescribedGroup};
use tracing::{info, warn};

/// Groups whose rules reference `group_id`, excluding the group itself.
pub fn referencing_groups(group_id: &str, all_groups: &[DescribedGroup]) -> Vec<String> {
    let mut referencing = Vec::new();
    for group in all_groups {
        let Some(other_id) = group.group_id() else {
            continue;
        };
        if other_id == group_id {
            continue;
        }
        let references = group
            .ip_permissions()
            .iter()
            .chain(group.ip_permissions_egress())
            .flat_map(|p| p.user_id_group_pairs())
            .any(|pair| pair.group_id() == Some(group_id));
        if references {
            referencing.push(other_id.to_string());
        }
    }
    referencing
}

/// The egress rule every new group ships with: all protocols to 0.0.0.0/0.
/// It is left in place so repeated cleans stay no-ops on fresh groups.
fn is_stock_egress(permission: &IpPermission) -> bool {
    permission.ip_protocol() == Some("-1")
        && permission.user_id_group_pairs().is_empty()
        && permission.ipv6_ranges().is_empty()
        && permission.prefix_list_ids().is_empty()
        && permission.ip_ranges().len() == 1
        && permission.ip_ranges()[0].cidr_ip() == Some("0.0.0.0/0")
}

/// Egress rules worth revoking, i.e. everything except the stock allow-all.
pub fn revocable_egress(permissions: &[IpPermission]) -> Vec<IpPermission> {
    permissions
        .iter()
        .filter(|p| !is_stock_egress(p))
        .cloned()
        .collect()
}

/// Pure deletion-eligibility decision. Attached interfaces are the graph's
/// job.
pub fn security_group_eligibility(group_name: &str, referenced_by: &[String]) -> Eligibility {
    if group_name == "default" {
        Eligibility::blocked("default security group")
    } else if !referenced_by.is_empty() {
        Eligibility::blocked(format!(
            "referenced by rules in {}",
            referenced_by.join(", ")
        ))
    } else {
        Eligibility::Eligible
    }
}

pub struct SecurityGroup {
    client: aws_sdk_ec2::Client,
    vpc_id: String,
    group_id: String,
    group_name: String,
    arn: String,
    tags: Vec<Tag>,
    referenced_by: Vec<String>,
}

impl SecurityGroup {
    /// Build from a described group. `all_groups` is the full listing of the
    /// VPC, used to resolve cross-group rule references.
    pub fn from_described(
        aws: &AwsContext,
        account: &str,
        described: &DescribedGroup,
        all_groups: &[DescribedGroup],
    ) -> Result<Self> {
        let group_id = described
            .group_id()
            .context("Described security group carries no id")?
            .to_string();
        let vpc_id = described
            .vpc_id()
            .context("Described security group carries no VPC id")?
            .to_string();
        Ok(Self {
            client: aws.ec2_client(),
            arn: arn::ec2_resource(aws.region(), account, "security-group", &group_id),
            group_name: described.group_name().unwrap_or_default().to_string(),
            tags: tags::from_ec2_tags(described.tags()),
            referenced_by: referencing_groups(&group_id, all_groups),
            vpc_id,
            group_id,
        })
    }

    /// The group as the provider sees it right now. `None` when already gone.
    async fn describe_live(&self) -> Result<Option<DescribedGroup>> {
        match self
            .client
            .describe_security_groups()
            .group_ids(&self.group_id)
            .send()
            .await
        {
            Ok(out) => Ok(out.security_groups().first().cloned()),
            Err(err) => {
                let classified = classify_sdk_error(&err, self.resource_type(), &self.group_id);
                if classified.is_not_found() {
                    Ok(None)
                } else {
                    Err(anyhow::Error::from(err).context(classified.to_string()))
                }
            }
        }
    }

    /// Groups in the VPC whose rules still reference this one, read from the
    /// provider.
    async fn current_references(&self) -> Result<Vec<String>> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .describe_security_groups()
                .filters(Filter::builder().name("vpc-id").values(&self.vpc_id).build())
                .set_next_token(next_token.take())
                .send()
                .await
                .with_context(|| {
                    format!("Failed to list security groups in {}", self.vpc_id)
                })?;
            groups.extend(page.security_groups().iter().cloned());
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        Ok(referencing_groups(&self.group_id, &groups))
    }
}

#[async_trait]
impl Resource for SecurityGroup {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "security-group"
    }

    fn name(&self) -> String {
        self.group_name.clone()
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn is_default_resource(&self) -> bool {
        self.group_name == "default"
    }

    fn can_delete(&self) -> Eligibility {
        security_group_eligibility(&self.group_name, &self.referenced_by)
    }

    async fn exists(&self) -> bool {
        let result = self
            .client
            .describe_security_groups()
            .group_ids(&self.group_id)
            .send()
            .await;
        match result {
            Ok(out) => !out.security_groups().is_empty(),
            Err(err) => {
                let classified = classify_sdk_error(&err, self.resource_type(), &self.group_id);
                if classified.is_not_found() {
                    false
                } else {
                    warn!(group = %self.group_id, error = %classified, "existence check failed, assuming present");
                    true
                }
            }
        }
    }

    /// Revoke the group's own rules. Rules referencing other groups are what
    /// keep those groups undeletable, so they go before any group in the VPC
    /// is removed.
    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        if self.group_name == "default" {
            return Ok(());
        }
        let Some(group) = self.describe_live().await? else {
            return Ok(());
        };

        let ingress = group.ip_permissions().to_vec();
        if !ingress.is_empty() {
            let operation = format!(
                "revoke {} ingress rule(s) on {}",
                ingress.len(),
                self.group_id
            );
            if confirm::should_proceed(ctx, &operation)? {
                if let Err(err) = self
                    .client
                    .revoke_security_group_ingress()
                    .group_id(&self.group_id)
                    .set_ip_permissions(Some(ingress))
                    .send()
                    .await
                {
                    let classified =
                        classify_sdk_error(&err, self.resource_type(), &self.group_id);
                    if !classified.is_not_found() {
                        return Err(anyhow::Error::from(err).context(classified.to_string()));
                    }
                } else {
                    info!(group = %self.group_id, "{}revoked ingress rules", ctx.log_prefix());
                }
            }
        }

        let egress = revocable_egress(group.ip_permissions_egress());
        if !egress.is_empty() {
            let operation = format!(
                "revoke {} egress rule(s) on {}",
                egress.len(),
                self.group_id
            );
            if confirm::should_proceed(ctx, &operation)? {
                if let Err(err) = self
                    .client
                    .revoke_security_group_egress()
                    .group_id(&self.group_id)
                    .set_ip_permissions(Some(egress))
                    .send()
                    .await
                {
                    let classified =
                        classify_sdk_error(&err, self.resource_type(), &self.group_id);
                    if !classified.is_not_found() {
                        return Err(anyhow::Error::from(err).context(classified.to_string()));
                    }
                } else {
                    info!(group = %self.group_id, "{}revoked egress rules", ctx.log_prefix());
                }
            }
        }
        Ok(())
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        // Earlier clean stages revoke the rules that referenced this group,
        // so the snapshot captured at discovery is stale; re-read the
        // references. A dry-run counts them as already revoked.
        let referenced_by = if ctx.dry_run {
            Vec::new()
        } else {
            self.current_references().await?
        };
        if let Eligibility::Blocked(reason) =
            security_group_eligibility(&self.group_name, &referenced_by)
        {
            warn!(group = %self.group_id, reason = %reason, "refusing to delete");
            return Ok(RemoveOutcome::Blocked(reason));
        }
        execute_removal(ctx, self.resource_type(), &self.group_id, || async {
            retry_throttled("delete_security_group", || async {
                self.client
                    .delete_security_group()
                    .group_id(&self.group_id)
                    .send()
                    .await
                    .with_context(|| format!("Failed to delete security group {}", self.group_id))?;
                Ok(())
            })
            .await
        })
        .await
    }
}

impl VpcResource for SecurityGroup {
    fn vpc_id(&self) -> &str {
        &self.vpc_id
    }

    fn kind(&self) -> VpcResourceKind {
        VpcResourceKind::SecurityGroup
    }

    fn resource_id(&self) -> &str {
        &self.group_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::{IpPermission, UserIdGroupPair};

    fn group(id: &str, name: &str) -> DescribedGroup {
        DescribedGroup::builder()
            .group_id(id)
            .group_name(name)
            .vpc_id("vpc-0abc")
            .build()
    }

    fn group_referencing(id: &str, name: &str, target: &str) -> DescribedGroup {
        DescribedGroup::builder()
            .group_id(id)
            .group_name(name)
            .vpc_id("vpc-0abc")
            .ip_permissions(
                IpPermission::builder()
                    .user_id_group_pairs(UserIdGroupPair::builder().group_id(target).build())
                    .build(),
            )
            .build()
    }

    #[test]
    fn default_group_is_blocked() {
        assert!(!security_group_eligibility("default", &[]).is_eligible());
    }

    #[test]
    fn unreferenced_group_is_eligible() {
        assert!(security_group_eligibility("app", &[]).is_eligible());
    }

    #[test]
    fn referenced_group_is_blocked_with_reason() {
        match security_group_eligibility("app", &["sg-other".to_string()]) {
            Eligibility::Blocked(reason) => assert!(reason.contains("sg-other")),
            Eligibility::Eligible => panic!("expected blocked"),
        }
    }

    #[test]
    fn reference_resolution_skips_self_references() {
        let groups = vec![
            group_referencing("sg-1", "app", "sg-1"),
            group_referencing("sg-2", "db", "sg-1"),
            group("sg-3", "cache"),
        ];
        assert_eq!(referencing_groups("sg-1", &groups), vec!["sg-2"]);
        assert!(referencing_groups("sg-3", &groups).is_empty());
    }

    #[test]
    fn stock_egress_rule_is_not_revoked() {
        use aws_sdk_ec2::types::IpRange;

        let stock = IpPermission::builder()
            .ip_protocol("-1")
            .ip_ranges(IpRange::builder().cidr_ip("0.0.0.0/0").build())
            .build();
        let custom = IpPermission::builder()
            .ip_protocol("tcp")
            .from_port(443)
            .to_port(443)
            .ip_ranges(IpRange::builder().cidr_ip("10.0.0.0/8").build())
            .build();
        let group_rule = IpPermission::builder()
            .ip_protocol("-1")
            .user_id_group_pairs(UserIdGroupPair::builder().group_id("sg-other").build())
            .build();

        let revocable = revocable_egress(&[stock, custom.clone(), group_rule.clone()]);
        assert_eq!(revocable, vec![custom, group_rule]);
    }

    #[test]
    fn all_all_rule_with_extra_ranges_is_revoked() {
        use aws_sdk_ec2::types::IpRange;

        let widened = IpPermission::builder()
            .ip_protocol("-1")
            .ip_ranges(IpRange::builder().cidr_ip("0.0.0.0/0").build())
            .ip_ranges(IpRange::builder().cidr_ip("10.0.0.0/8").build())
            .build();
        assert_eq!(revocable_egress(&[widened.clone()]), vec![widened]);
    }

    #[tokio::test]
    async fn described_group_resolves_references() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let all = vec![
            group("sg-1", "app"),
            group_referencing("sg-2", "db", "sg-1"),
        ];
        let sg = SecurityGroup::from_described(&aws, "123456789012", &all[0], &all).unwrap();
        assert_eq!(sg.resource_id(), "sg-1");
        assert_eq!(sg.name(), "app");
        assert!(!sg.can_delete().is_eligible());
    }
}
