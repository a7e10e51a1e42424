//! CodePipeline pipelines
//!
//! Pipelines have no inner content to clean; deletion is a single call.

use crate::arn;
use crate::aws::AwsContext;
use crate::context::ExecutionContext;
use crate::resource::{execute_removal, RemoveOutcome, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

pub struct Pipeline {
    client: aws_sdk_codepipeline::Client,
    pipeline: String,
    arn: String,
}

impl Pipeline {
    pub fn new(aws: &AwsContext, account: &str, pipeline: impl Into<String>) -> Self {
        let pipeline = pipeline.into();
        Self {
            client: aws.codepipeline_client(),
            arn: arn::codepipeline(aws.region(), account, &pipeline),
            pipeline,
        }
    }
}

#[async_trait]
impl Resource for Pipeline {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "codepipeline"
    }

    async fn exists(&self) -> bool {
        let result = self
            .client
            .get_pipeline()
            .name(&self.pipeline)
            .send()
            .await;
        match result {
            Ok(_) => true,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_pipeline_not_found_exception()) =>
            {
                false
            }
            Err(err) => {
                warn!(pipeline = %self.pipeline, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.pipeline, || async {
            self.client
                .delete_pipeline()
                .name(&self.pipeline)
                .send()
                .await
                .with_context(|| format!("Failed to delete pipeline {}", self.pipeline))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipeline_arn_uses_bare_name() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let pipeline = Pipeline::new(&aws, "123456789012", "deploy-prod");
        assert_eq!(
            pipeline.arn(),
            "arn:aws:codepipeline:eu-west-1:123456789012:deploy-prod"
        );
        assert_eq!(pipeline.name(), "deploy-prod");
    }
}
