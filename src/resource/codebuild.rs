//! CodeBuild projects
//!
//! Projects have no inner content to clean; deletion is a single call and
//! succeeds even for a project that is already gone.

use crate::arn;
use crate::aws::AwsContext;
use crate::context::ExecutionContext;
use crate::resource::{execute_removal, RemoveOutcome, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

pub struct CodeBuildProject {
    client: aws_sdk_codebuild::Client,
    project: String,
    arn: String,
}

impl CodeBuildProject {
    pub fn new(aws: &AwsContext, account: &str, project: impl Into<String>) -> Self {
        let project = project.into();
        Self {
            client: aws.codebuild_client(),
            arn: arn::codebuild_project(aws.region(), account, &project),
            project,
        }
    }
}

#[async_trait]
impl Resource for CodeBuildProject {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "codebuild-project"
    }

    async fn exists(&self) -> bool {
        let result = self
            .client
            .batch_get_projects()
            .names(&self.project)
            .send()
            .await;
        match result {
            Ok(out) => !out.projects().is_empty(),
            Err(err) => {
                warn!(project = %self.project, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.project, || async {
            self.client
                .delete_project()
                .name(&self.project)
                .send()
                .await
                .with_context(|| format!("Failed to delete project {}", self.project))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn project_arn_and_name() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let project = CodeBuildProject::new(&aws, "123456789012", "app-ci");
        assert_eq!(
            project.arn(),
            "arn:aws:codebuild:eu-west-1:123456789012:project/app-ci"
        );
        assert_eq!(project.name(), "app-ci");
        assert_eq!(project.resource_type(), "codebuild-project");
    }
}
