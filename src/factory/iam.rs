//! IAM factories
//!
//! One factory per IAM kind, all sharing the global `iam` ARN service.
//! The policy factory builds from the full ARN when one is given so a path
//! segment (`policy/service/readonly`) survives the round trip.

use crate::arn::Arn;
use crate::aws::AwsContext;
use crate::factory::ResourceFactory;
use crate::resource::iam::{IamGroup, IamPolicy, IamRole, IamUser};
use crate::resource::Resource;
use anyhow::{bail, Result};
use async_trait::async_trait;

/// Which IAM entity a factory produces.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum IamKind {
    Role,
    User,
    Group,
    Policy,
}

pub struct IamFactory {
    aws: AwsContext,
    account: String,
    kind: IamKind,
}

impl IamFactory {
    pub fn roles(aws: AwsContext, account: impl Into<String>) -> Self {
        Self::with_kind(aws, account, IamKind::Role)
    }

    pub fn users(aws: AwsContext, account: impl Into<String>) -> Self {
        Self::with_kind(aws, account, IamKind::User)
    }

    pub fn groups(aws: AwsContext, account: impl Into<String>) -> Self {
        Self::with_kind(aws, account, IamKind::Group)
    }

    pub fn policies(aws: AwsContext, account: impl Into<String>) -> Self {
        Self::with_kind(aws, account, IamKind::Policy)
    }

    fn with_kind(aws: AwsContext, account: impl Into<String>, kind: IamKind) -> Self {
        Self {
            aws,
            account: account.into(),
            kind,
        }
    }
}

#[async_trait]
impl ResourceFactory for IamFactory {
    fn family(&self) -> &'static str {
        match self.kind {
            IamKind::Role => "iam",
            IamKind::User => "iam-user",
            IamKind::Group => "iam-group",
            IamKind::Policy => "iam-policy",
        }
    }

    fn resource_type_filters(&self) -> &'static [&'static str] {
        match self.kind {
            IamKind::Role => &["iam:role"],
            IamKind::User => &["iam:user"],
            IamKind::Group => &["iam:group"],
            IamKind::Policy => &["iam:policy"],
        }
    }

    fn arn_service(&self) -> &'static str {
        "iam"
    }

    fn aws(&self) -> &AwsContext {
        &self.aws
    }

    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>> {
        Ok(match self.kind {
            IamKind::Role => Box::new(IamRole::new(&self.aws, &self.account, name)),
            IamKind::User => Box::new(IamUser::new(&self.aws, &self.account, name)),
            IamKind::Group => Box::new(IamGroup::new(&self.aws, &self.account, name)),
            IamKind::Policy => Box::new(IamPolicy::new(&self.aws, &self.account, name)),
        })
    }

    fn create_by_arn(&self, raw: &str) -> Result<Box<dyn Resource>> {
        let arn: Arn = raw.parse()?;
        if arn.service != "iam" {
            bail!("ARN {raw} is a {} resource, not iam", arn.service);
        }
        if self.kind == IamKind::Policy {
            return Ok(Box::new(IamPolicy::from_arn(&self.aws, raw)));
        }
        self.create_by_name(arn.resource_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn name_yields_global_role_arn() {
        let factory = IamFactory::roles(AwsContext::new("eu-west-1", None).await, "123456789012");
        let role = factory.create_by_name("deployer").unwrap();
        assert_eq!(role.arn(), "arn:aws:iam::123456789012:role/deployer");
    }

    #[tokio::test]
    async fn role_arn_round_trips() {
        let factory = IamFactory::roles(AwsContext::new("eu-west-1", None).await, "123456789012");
        let role = factory
            .create_by_arn("arn:aws:iam::123456789012:role/deployer")
            .unwrap();
        assert_eq!(role.name(), "deployer");
    }

    #[tokio::test]
    async fn each_kind_builds_its_own_arn() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let user = IamFactory::users(aws.clone(), "123456789012")
            .create_by_name("ci-bot")
            .unwrap();
        assert_eq!(user.arn(), "arn:aws:iam::123456789012:user/ci-bot");
        let group = IamFactory::groups(aws.clone(), "123456789012")
            .create_by_name("admins")
            .unwrap();
        assert_eq!(group.arn(), "arn:aws:iam::123456789012:group/admins");
        let policy = IamFactory::policies(aws, "123456789012")
            .create_by_name("readonly")
            .unwrap();
        assert_eq!(policy.arn(), "arn:aws:iam::123456789012:policy/readonly");
    }

    #[tokio::test]
    async fn policy_arn_keeps_its_path() {
        let factory =
            IamFactory::policies(AwsContext::new("eu-west-1", None).await, "123456789012");
        let policy = factory
            .create_by_arn("arn:aws:iam::123456789012:policy/service/readonly")
            .unwrap();
        assert_eq!(
            policy.arn(),
            "arn:aws:iam::123456789012:policy/service/readonly"
        );
    }
}
