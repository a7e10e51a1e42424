//! ECR repository factory

use crate::aws::AwsContext;
use crate::factory::ResourceFactory;
use crate::resource::ecr::EcrRepository;
use crate::resource::Resource;
use anyhow::Result;
use async_trait::async_trait;

pub struct EcrFactory {
    aws: AwsContext,
    account: String,
}

impl EcrFactory {
    pub fn new(aws: AwsContext, account: impl Into<String>) -> Self {
        Self {
            aws,
            account: account.into(),
        }
    }
}

#[async_trait]
impl ResourceFactory for EcrFactory {
    fn family(&self) -> &'static str {
        "ecr"
    }

    fn resource_type_filters(&self) -> &'static [&'static str] {
        &["ecr:repository"]
    }

    fn aws(&self) -> &AwsContext {
        &self.aws
    }

    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>> {
        Ok(Box::new(EcrRepository::new(&self.aws, &self.account, name)))
    }

    /// Repository names may contain slashes, so the generic last-segment rule
    /// would truncate them. Take everything after `repository/` instead.
    fn create_by_arn(&self, raw: &str) -> Result<Box<dyn Resource>> {
        let arn: crate::arn::Arn = raw.parse()?;
        if arn.service != "ecr" {
            anyhow::bail!("ARN {raw} is a {} resource, not ecr", arn.service);
        }
        let name = arn
            .resource
            .strip_prefix("repository/")
            .unwrap_or(&arn.resource);
        self.create_by_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn name_yields_repository_arn() {
        let factory = EcrFactory::new(AwsContext::new("eu-west-1", None).await, "123456789012");
        let repo = factory.create_by_name("team/app").unwrap();
        assert_eq!(
            repo.arn(),
            "arn:aws:ecr:eu-west-1:123456789012:repository/team/app"
        );
    }

    #[tokio::test]
    async fn slashed_names_survive_arn_round_trip() {
        let factory = EcrFactory::new(AwsContext::new("eu-west-1", None).await, "123456789012");
        let repo = factory
            .create_by_arn("arn:aws:ecr:eu-west-1:123456789012:repository/team/app")
            .unwrap();
        assert_eq!(
            repo.arn(),
            "arn:aws:ecr:eu-west-1:123456789012:repository/team/app"
        );
    }
}
