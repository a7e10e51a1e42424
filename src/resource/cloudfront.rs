//! CloudFront distributions
//!
//! A distribution must be disabled, and the disablement fully deployed to
//! every edge location, before CloudFront accepts the delete. `clean` flips
//! the enabled flag and waits out the deployment; `remove` deletes with the
//! then-current ETag. CloudFront is a global service, so region plays no
//! part in addressing.

use crate::arn;
use crate::aws::AwsContext;
use crate::confirm;
use crate::context::ExecutionContext;
use crate::resource::{execute_removal, RemoveOutcome, Resource};
use crate::wait::{wait_until, Probe, WaitConfig, WaitOutcome};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Distribution {
    client: aws_sdk_cloudfront::Client,
    id: String,
    arn: String,
}

impl Distribution {
    pub fn new(aws: &AwsContext, account: &str, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            client: aws.cloudfront_client(),
            arn: arn::cloudfront_distribution(account, &id),
            id,
        }
    }

    /// Current distribution config and the ETag required to mutate it.
    async fn config_with_etag(
        &self,
    ) -> Result<(aws_sdk_cloudfront::types::DistributionConfig, String)> {
        let response = self
            .client
            .get_distribution_config()
            .id(&self.id)
            .send()
            .await
            .with_context(|| format!("Failed to get config of distribution {}", self.id))?;
        let etag = response
            .etag()
            .context("Distribution config carries no ETag")?
            .to_string();
        let config = response
            .distribution_config
            .context("Distribution config response carries no config")?;
        Ok((config, etag))
    }

    /// Poll until the disablement has propagated to the edge.
    async fn await_deployed(&self) -> Result<()> {
        let outcome = wait_until(
            &format!("distribution {} deployment", self.id),
            WaitConfig::new(Duration::from_secs(20), 50),
            || async {
                let response = self
                    .client
                    .get_distribution()
                    .id(&self.id)
                    .send()
                    .await
                    .with_context(|| format!("Failed to get distribution {}", self.id))?;
                Ok(match response.distribution() {
                    Some(distribution) if distribution.status() == "Deployed" => Probe::Done,
                    Some(_) => Probe::Pending,
                    None => Probe::Done,
                })
            },
        )
        .await?;
        if outcome == WaitOutcome::TimedOut {
            bail!(
                "distribution {} still deploying after wait budget; retry the removal later",
                self.id
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Resource for Distribution {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "cloudfront-distribution"
    }

    async fn exists(&self) -> bool {
        let result = self.client.get_distribution().id(&self.id).send().await;
        match result {
            Ok(_) => true,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_distribution()) =>
            {
                false
            }
            Err(err) => {
                warn!(distribution = %self.id, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    /// Disable the distribution and wait for the change to deploy.
    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        if !confirm::should_proceed(ctx, &format!("disable distribution {}", self.id))? {
            return Ok(());
        }
        let (mut config, etag) = self.config_with_etag().await?;
        if !config.enabled {
            debug!(distribution = %self.id, "already disabled");
            return Ok(());
        }
        config.enabled = false;
        self.client
            .update_distribution()
            .id(&self.id)
            .if_match(&etag)
            .distribution_config(config)
            .send()
            .await
            .with_context(|| format!("Failed to disable distribution {}", self.id))?;
        info!(distribution = %self.id, "{}disabled distribution", ctx.log_prefix());
        self.await_deployed().await
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.id, || async {
            // The disable in `clean` rotated the ETag; fetch the current one.
            let (_, etag) = self.config_with_etag().await?;
            self.client
                .delete_distribution()
                .id(&self.id)
                .if_match(&etag)
                .send()
                .await
                .with_context(|| format!("Failed to delete distribution {}", self.id))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn distribution_arn_is_global() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let distribution = Distribution::new(&aws, "123456789012", "E2EXAMPLE");
        assert_eq!(
            distribution.arn(),
            "arn:aws:cloudfront::123456789012:distribution/E2EXAMPLE"
        );
        assert_eq!(distribution.name(), "E2EXAMPLE");
        assert_eq!(distribution.resource_type(), "cloudfront-distribution");
    }
}
