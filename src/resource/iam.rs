//! IAM roles, users, groups and customer-managed policies
//!
//! IAM rejects deletion while references remain: a role with attached or
//! inline policies or instance profile memberships, a group with member
//! users, a policy attached to any entity or carrying extra versions. Each
//! type's `clean` strips its own blockers.

use crate::arn;
use crate::aws::AwsContext;
use crate::confirm;
use crate::context::ExecutionContext;
use crate::resource::{execute_removal, RemoveOutcome, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

/// Marker for the next page of a truncated IAM listing. A truncated page
/// without a marker would otherwise loop on page one forever.
fn next_marker(truncated: bool, marker: Option<&str>) -> Option<String> {
    if truncated {
        marker.map(String::from)
    } else {
        None
    }
}

pub struct IamRole {
    client: aws_sdk_iam::Client,
    role: String,
    arn: String,
}

impl IamRole {
    pub fn new(aws: &AwsContext, account: &str, role: impl Into<String>) -> Self {
        let role = role.into();
        Self {
            client: aws.iam_client(),
            arn: arn::iam_role(account, &role),
            role,
        }
    }

    async fn detach_managed_policies(&self) -> Result<usize> {
        let mut detached = 0;
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .client
                .list_attached_role_policies()
                .role_name(&self.role)
                .set_marker(marker.take())
                .send()
                .await
                .with_context(|| format!("Failed to list policies on {}", self.role))?;

            for policy in page.attached_policies() {
                if let Some(policy_arn) = policy.policy_arn() {
                    self.client
                        .detach_role_policy()
                        .role_name(&self.role)
                        .policy_arn(policy_arn)
                        .send()
                        .await
                        .with_context(|| {
                            format!("Failed to detach {policy_arn} from {}", self.role)
                        })?;
                    detached += 1;
                }
            }
            marker = next_marker(page.is_truncated(), page.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(detached)
    }

    async fn delete_inline_policies(&self) -> Result<usize> {
        let mut deleted = 0;
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .client
                .list_role_policies()
                .role_name(&self.role)
                .set_marker(marker.take())
                .send()
                .await
                .with_context(|| format!("Failed to list inline policies on {}", self.role))?;

            for name in page.policy_names() {
                self.client
                    .delete_role_policy()
                    .role_name(&self.role)
                    .policy_name(name)
                    .send()
                    .await
                    .with_context(|| {
                        format!("Failed to delete inline policy {name} on {}", self.role)
                    })?;
                deleted += 1;
            }
            marker = next_marker(page.is_truncated(), page.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(deleted)
    }

    async fn remove_from_instance_profiles(&self) -> Result<usize> {
        let mut removed = 0;
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .client
                .list_instance_profiles_for_role()
                .role_name(&self.role)
                .set_marker(marker.take())
                .send()
                .await
                .with_context(|| format!("Failed to list instance profiles for {}", self.role))?;

            for profile in page.instance_profiles() {
                self.client
                    .remove_role_from_instance_profile()
                    .instance_profile_name(profile.instance_profile_name())
                    .role_name(&self.role)
                    .send()
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to remove {} from instance profile {}",
                            self.role,
                            profile.instance_profile_name()
                        )
                    })?;
                removed += 1;
            }
            marker = next_marker(page.is_truncated(), page.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl Resource for IamRole {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "iam-role"
    }

    async fn exists(&self) -> bool {
        match self.client.get_role().role_name(&self.role).send().await {
            Ok(_) => true,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception()) =>
            {
                false
            }
            Err(err) => {
                warn!(role = %self.role, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        if !confirm::should_proceed(ctx, &format!("strip policies from role {}", self.role))? {
            return Ok(());
        }
        let detached = self.detach_managed_policies().await?;
        let inline = self.delete_inline_policies().await?;
        let profiles = self.remove_from_instance_profiles().await?;
        if detached + inline + profiles > 0 {
            info!(
                role = %self.role,
                detached,
                inline,
                profiles,
                "{}stripped role",
                ctx.log_prefix()
            );
        }
        Ok(())
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.role, || async {
            self.client
                .delete_role()
                .role_name(&self.role)
                .send()
                .await
                .with_context(|| format!("Failed to delete role {}", self.role))?;
            Ok(())
        })
        .await
    }
}

pub struct IamUser {
    client: aws_sdk_iam::Client,
    user: String,
    arn: String,
}

impl IamUser {
    pub fn new(aws: &AwsContext, account: &str, user: impl Into<String>) -> Self {
        let user = user.into();
        Self {
            client: aws.iam_client(),
            arn: arn::iam_user(account, &user),
            user,
        }
    }
}

#[async_trait]
impl Resource for IamUser {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "iam-user"
    }

    async fn exists(&self) -> bool {
        match self.client.get_user().user_name(&self.user).send().await {
            Ok(_) => true,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception()) =>
            {
                false
            }
            Err(err) => {
                warn!(user = %self.user, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.user, || async {
            self.client
                .delete_user()
                .user_name(&self.user)
                .send()
                .await
                .with_context(|| format!("Failed to delete user {}", self.user))?;
            Ok(())
        })
        .await
    }
}

pub struct IamGroup {
    client: aws_sdk_iam::Client,
    group: String,
    arn: String,
}

impl IamGroup {
    pub fn new(aws: &AwsContext, account: &str, group: impl Into<String>) -> Self {
        let group = group.into();
        Self {
            client: aws.iam_client(),
            arn: arn::iam_group(account, &group),
            group,
        }
    }

    /// Drop every member so the group accepts deletion.
    async fn remove_members(&self) -> Result<usize> {
        let mut removed = 0;
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .client
                .get_group()
                .group_name(&self.group)
                .set_marker(marker.take())
                .send()
                .await
                .with_context(|| format!("Failed to list members of group {}", self.group))?;

            for user in page.users() {
                self.client
                    .remove_user_from_group()
                    .group_name(&self.group)
                    .user_name(user.user_name())
                    .send()
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to remove {} from group {}",
                            user.user_name(),
                            self.group
                        )
                    })?;
                removed += 1;
            }
            marker = next_marker(page.is_truncated(), page.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl Resource for IamGroup {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "iam-group"
    }

    async fn exists(&self) -> bool {
        match self.client.get_group().group_name(&self.group).send().await {
            Ok(_) => true,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception()) =>
            {
                false
            }
            Err(err) => {
                warn!(group = %self.group, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        if !confirm::should_proceed(ctx, &format!("remove members from group {}", self.group))? {
            return Ok(());
        }
        let removed = self.remove_members().await?;
        if removed > 0 {
            info!(group = %self.group, removed, "{}emptied group", ctx.log_prefix());
        }
        Ok(())
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.group, || async {
            self.client
                .delete_group()
                .group_name(&self.group)
                .send()
                .await
                .with_context(|| format!("Failed to delete group {}", self.group))?;
            Ok(())
        })
        .await
    }
}

pub struct IamPolicy {
    client: aws_sdk_iam::Client,
    arn: String,
}

impl IamPolicy {
    pub fn new(aws: &AwsContext, account: &str, name: impl AsRef<str>) -> Self {
        Self {
            client: aws.iam_client(),
            arn: arn::iam_policy(account, name.as_ref()),
        }
    }

    /// Wrap a full policy ARN; preserves any path segment in the ARN.
    pub fn from_arn(aws: &AwsContext, arn: impl Into<String>) -> Self {
        Self {
            client: aws.iam_client(),
            arn: arn.into(),
        }
    }

    /// Detach the policy from every role, user and group holding it.
    async fn detach_from_entities(&self) -> Result<usize> {
        let mut detached = 0;
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .client
                .list_entities_for_policy()
                .policy_arn(&self.arn)
                .set_marker(marker.take())
                .send()
                .await
                .with_context(|| format!("Failed to list entities holding {}", self.arn))?;

            for role in page.policy_roles() {
                if let Some(name) = role.role_name() {
                    self.client
                        .detach_role_policy()
                        .role_name(name)
                        .policy_arn(&self.arn)
                        .send()
                        .await
                        .with_context(|| format!("Failed to detach {} from role {name}", self.arn))?;
                    detached += 1;
                }
            }
            for user in page.policy_users() {
                if let Some(name) = user.user_name() {
                    self.client
                        .detach_user_policy()
                        .user_name(name)
                        .policy_arn(&self.arn)
                        .send()
                        .await
                        .with_context(|| format!("Failed to detach {} from user {name}", self.arn))?;
                    detached += 1;
                }
            }
            for group in page.policy_groups() {
                if let Some(name) = group.group_name() {
                    self.client
                        .detach_group_policy()
                        .group_name(name)
                        .policy_arn(&self.arn)
                        .send()
                        .await
                        .with_context(|| {
                            format!("Failed to detach {} from group {name}", self.arn)
                        })?;
                    detached += 1;
                }
            }
            marker = next_marker(page.is_truncated(), page.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(detached)
    }

    /// Delete every non-default version; the default goes with the policy.
    async fn delete_extra_versions(&self) -> Result<usize> {
        let mut deleted = 0;
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .client
                .list_policy_versions()
                .policy_arn(&self.arn)
                .set_marker(marker.take())
                .send()
                .await
                .with_context(|| format!("Failed to list versions of {}", self.arn))?;

            for version in page.versions() {
                if version.is_default_version() {
                    continue;
                }
                if let Some(version_id) = version.version_id() {
                    self.client
                        .delete_policy_version()
                        .policy_arn(&self.arn)
                        .version_id(version_id)
                        .send()
                        .await
                        .with_context(|| {
                            format!("Failed to delete version {version_id} of {}", self.arn)
                        })?;
                    deleted += 1;
                }
            }
            marker = next_marker(page.is_truncated(), page.marker());
            if marker.is_none() {
                break;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl Resource for IamPolicy {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "iam-policy"
    }

    async fn exists(&self) -> bool {
        match self.client.get_policy().policy_arn(&self.arn).send().await {
            Ok(_) => true,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception()) =>
            {
                false
            }
            Err(err) => {
                warn!(policy = %self.arn, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        if !confirm::should_proceed(ctx, &format!("detach policy {}", self.name()))? {
            return Ok(());
        }
        let detached = self.detach_from_entities().await?;
        let versions = self.delete_extra_versions().await?;
        if detached + versions > 0 {
            info!(
                policy = %self.arn,
                detached,
                versions,
                "{}detached policy",
                ctx.log_prefix()
            );
        }
        Ok(())
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        let name = self.name();
        execute_removal(ctx, self.resource_type(), &name, || async {
            self.client
                .delete_policy()
                .policy_arn(&self.arn)
                .send()
                .await
                .with_context(|| format!("Failed to delete policy {}", self.arn))?;
            Ok(())
        })
        .await
    }
}
