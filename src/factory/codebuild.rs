//! CodeBuild project factory

use crate::aws::AwsContext;
use crate::factory::ResourceFactory;
use crate::resource::codebuild::CodeBuildProject;
use crate::resource::Resource;
use anyhow::Result;
use async_trait::async_trait;

pub struct CodeBuildFactory {
    aws: AwsContext,
    account: String,
}

impl CodeBuildFactory {
    pub fn new(aws: AwsContext, account: impl Into<String>) -> Self {
        Self {
            aws,
            account: account.into(),
        }
    }
}

#[async_trait]
impl ResourceFactory for CodeBuildFactory {
    fn family(&self) -> &'static str {
        "codebuild"
    }

    fn resource_type_filters(&self) -> &'static [&'static str] {
        &["codebuild:project"]
    }

    fn aws(&self) -> &AwsContext {
        &self.aws
    }

    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>> {
        Ok(Box::new(CodeBuildProject::new(
            &self.aws,
            &self.account,
            name,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn name_yields_project_arn() {
        let factory =
            CodeBuildFactory::new(AwsContext::new("eu-west-1", None).await, "123456789012");
        let project = factory.create_by_name("app-ci").unwrap();
        assert_eq!(
            project.arn(),
            "arn:aws:codebuild:eu-west-1:123456789012:project/app-ci"
        );
    }
}
