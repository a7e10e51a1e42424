//! CodePipeline factory

use crate::aws::AwsContext;
use crate::factory::ResourceFactory;
use crate::resource::codepipeline::Pipeline;
use crate::resource::Resource;
use anyhow::Result;
use async_trait::async_trait;

pub struct CodePipelineFactory {
    aws: AwsContext,
    account: String,
}

impl CodePipelineFactory {
    pub fn new(aws: AwsContext, account: impl Into<String>) -> Self {
        Self {
            aws,
            account: account.into(),
        }
    }
}

#[async_trait]
impl ResourceFactory for CodePipelineFactory {
    fn family(&self) -> &'static str {
        "codepipeline"
    }

    fn resource_type_filters(&self) -> &'static [&'static str] {
        &["codepipeline:pipeline"]
    }

    fn aws(&self) -> &AwsContext {
        &self.aws
    }

    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>> {
        Ok(Box::new(Pipeline::new(&self.aws, &self.account, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn name_yields_pipeline_arn() {
        let factory =
            CodePipelineFactory::new(AwsContext::new("eu-west-1", None).await, "123456789012");
        let pipeline = factory.create_by_name("deploy-prod").unwrap();
        assert_eq!(
            pipeline.arn(),
            "arn:aws:codepipeline:eu-west-1:123456789012:deploy-prod"
        );
    }
}
