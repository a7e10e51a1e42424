//! Shared AWS configuration context
//!
//! Loads the SDK configuration once per invocation and hands out service
//! clients built from it. The context is constructed explicitly in `main` and
//! passed by parameter wherever a client is needed; there is no process-wide
//! client cache.

use crate::context::ExecutionContext;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;

/// Default region when neither flags nor environment select one.
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Shared AWS configuration for creating service clients.
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: String,
}

impl AwsContext {
    /// Load AWS configuration for the given region and optional profile.
    ///
    /// Credentials, shared config files and IAM roles are resolved the usual
    /// way through the default provider chain.
    pub async fn new(region: &str, profile: Option<&str>) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        Self {
            config: Arc::new(config),
            region: region.to_string(),
        }
    }

    /// Load configuration from an [`ExecutionContext`], falling back to the
    /// default region.
    pub async fn from_execution_context(ctx: &ExecutionContext) -> Self {
        let region = ctx.region.as_deref().unwrap_or(DEFAULT_REGION);
        Self::new(region, ctx.profile.as_deref()).await
    }

    /// The underlying SDK config for direct client construction.
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    /// The region this context was loaded for.
    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn ec2_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(self.sdk_config())
    }

    pub fn s3_client(&self) -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::new(self.sdk_config())
    }

    pub fn iam_client(&self) -> aws_sdk_iam::Client {
        aws_sdk_iam::Client::new(self.sdk_config())
    }

    pub fn sts_client(&self) -> aws_sdk_sts::Client {
        aws_sdk_sts::Client::new(self.sdk_config())
    }

    pub fn ecr_client(&self) -> aws_sdk_ecr::Client {
        aws_sdk_ecr::Client::new(self.sdk_config())
    }

    pub fn codepipeline_client(&self) -> aws_sdk_codepipeline::Client {
        aws_sdk_codepipeline::Client::new(self.sdk_config())
    }

    pub fn codebuild_client(&self) -> aws_sdk_codebuild::Client {
        aws_sdk_codebuild::Client::new(self.sdk_config())
    }

    pub fn cloudfront_client(&self) -> aws_sdk_cloudfront::Client {
        aws_sdk_cloudfront::Client::new(self.sdk_config())
    }

    pub fn dynamodb_client(&self) -> aws_sdk_dynamodb::Client {
        aws_sdk_dynamodb::Client::new(self.sdk_config())
    }

    pub fn ecs_client(&self) -> aws_sdk_ecs::Client {
        aws_sdk_ecs::Client::new(self.sdk_config())
    }

    pub fn tagging_client(&self) -> aws_sdk_resourcegroupstaggingapi::Client {
        aws_sdk_resourcegroupstaggingapi::Client::new(self.sdk_config())
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
