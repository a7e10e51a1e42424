//! S3 bucket factory

use crate::aws::AwsContext;
use crate::factory::ResourceFactory;
use crate::resource::s3::S3Bucket;
use crate::resource::Resource;
use anyhow::Result;
use async_trait::async_trait;

pub struct S3Factory {
    aws: AwsContext,
}

impl S3Factory {
    pub fn new(aws: AwsContext) -> Self {
        Self { aws }
    }
}

#[async_trait]
impl ResourceFactory for S3Factory {
    fn family(&self) -> &'static str {
        "s3"
    }

    fn resource_type_filters(&self) -> &'static [&'static str] {
        &["s3:bucket"]
    }

    fn aws(&self) -> &AwsContext {
        &self.aws
    }

    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>> {
        Ok(Box::new(S3Bucket::new(&self.aws, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn name_yields_canonical_bucket_arn() {
        let factory = S3Factory::new(AwsContext::new("eu-west-1", None).await);
        let bucket = factory.create_by_name("my-bucket").unwrap();
        assert_eq!(bucket.arn(), "arn:aws:s3:::my-bucket");
    }

    #[tokio::test]
    async fn arn_round_trips_through_name() {
        let factory = S3Factory::new(AwsContext::new("eu-west-1", None).await);
        let bucket = factory.create_by_arn("arn:aws:s3:::my-bucket").unwrap();
        assert_eq!(bucket.name(), "my-bucket");
    }

    #[tokio::test]
    async fn foreign_service_arn_is_rejected() {
        let factory = S3Factory::new(AwsContext::new("eu-west-1", None).await);
        assert!(factory
            .create_by_arn("arn:aws:ec2:eu-west-1:123456789012:instance/i-0abc")
            .is_err());
    }
}
