//! ECR repositories
//!
//! A repository holding images rejects deletion, so `clean` batch-deletes
//! every image first. Image listing and deletion both page at the API's
//! 100-image maximum.

use crate::arn;
use crate::aws::AwsContext;
use crate::confirm;
use crate::context::ExecutionContext;
use crate::resource::{execute_removal, RemoveOutcome, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

pub struct EcrRepository {
    client: aws_sdk_ecr::Client,
    repository: String,
    arn: String,
}

impl EcrRepository {
    pub fn new(aws: &AwsContext, account: &str, repository: impl Into<String>) -> Self {
        let repository = repository.into();
        Self {
            client: aws.ecr_client(),
            arn: arn::ecr_repository(aws.region(), account, &repository),
            repository,
        }
    }

    async fn purge_images(&self) -> Result<u64> {
        let mut deleted = 0u64;
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_images()
                .repository_name(&self.repository)
                .set_next_token(next_token.take())
                .send()
                .await
                .with_context(|| format!("Failed to list images in {}", self.repository))?;

            let ids = page.image_ids().to_vec();
            if !ids.is_empty() {
                deleted += ids.len() as u64;
                self.client
                    .batch_delete_image()
                    .repository_name(&self.repository)
                    .set_image_ids(Some(ids))
                    .send()
                    .await
                    .with_context(|| format!("Failed to delete images in {}", self.repository))?;
            }

            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl Resource for EcrRepository {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "ecr-repository"
    }

    async fn exists(&self) -> bool {
        let result = self
            .client
            .describe_repositories()
            .repository_names(&self.repository)
            .send()
            .await;
        match result {
            Ok(out) => !out.repositories().is_empty(),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_repository_not_found_exception()) =>
            {
                false
            }
            Err(err) => {
                warn!(repository = %self.repository, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        if !confirm::should_proceed(ctx, &format!("purge images from {}", self.repository))? {
            return Ok(());
        }
        let deleted = self.purge_images().await?;
        if deleted > 0 {
            info!(
                repository = %self.repository,
                images = deleted,
                "{}purged repository",
                ctx.log_prefix()
            );
        } else {
            debug!(repository = %self.repository, "repository already empty");
        }
        Ok(())
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.repository, || async {
            self.client
                .delete_repository()
                .repository_name(&self.repository)
                .send()
                .await
                .with_context(|| format!("Failed to delete repository {}", self.repository))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_arn_and_name() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let repo = EcrRepository::new(&aws, "123456789012", "team/app");
        assert_eq!(
            repo.arn(),
            "arn:aws:ecr:eu-west-1:123456789012:repository/team/app"
        );
        assert_eq!(repo.name(), "app");
        assert_eq!(repo.resource_type(), "ecr-repository");
    }
}
