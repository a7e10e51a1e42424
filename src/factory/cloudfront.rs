//! CloudFront distribution factory
//!
//! Distributions are addressed by their id (`E2EXAMPLE`), not a name.

use crate::aws::AwsContext;
use crate::factory::ResourceFactory;
use crate::resource::cloudfront::Distribution;
use crate::resource::Resource;
use anyhow::Result;
use async_trait::async_trait;

pub struct CloudFrontFactory {
    aws: AwsContext,
    account: String,
}

impl CloudFrontFactory {
    pub fn new(aws: AwsContext, account: impl Into<String>) -> Self {
        Self {
            aws,
            account: account.into(),
        }
    }
}

#[async_trait]
impl ResourceFactory for CloudFrontFactory {
    fn family(&self) -> &'static str {
        "cloudfront"
    }

    fn resource_type_filters(&self) -> &'static [&'static str] {
        &["cloudfront:distribution"]
    }

    fn aws(&self) -> &AwsContext {
        &self.aws
    }

    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>> {
        Ok(Box::new(Distribution::new(&self.aws, &self.account, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn id_yields_distribution_arn() {
        let factory =
            CloudFrontFactory::new(AwsContext::new("eu-west-1", None).await, "123456789012");
        let distribution = factory.create_by_id("E2EXAMPLE").unwrap();
        assert_eq!(
            distribution.arn(),
            "arn:aws:cloudfront::123456789012:distribution/E2EXAMPLE"
        );
    }

    #[tokio::test]
    async fn distribution_arn_round_trips() {
        let factory =
            CloudFrontFactory::new(AwsContext::new("eu-west-1", None).await, "123456789012");
        let distribution = factory
            .create_by_arn("arn:aws:cloudfront::123456789012:distribution/E2EXAMPLE")
            .unwrap();
        assert_eq!(distribution.name(), "E2EXAMPLE");
    }
}
