//! ECS services and task definitions
//!
//! Services are addressed as `cluster/service` because every service API
//! call needs the cluster handle. A service still running tasks is scaled to
//! zero by `clean` before deletion. Task definitions are addressed as
//! `family:revision`; removal deregisters the revision and then deletes it
//! so it stops counting against the account limit.

use crate::arn;
use crate::aws::AwsContext;
use crate::confirm;
use crate::context::ExecutionContext;
use crate::resource::{execute_removal, RemoveOutcome, Resource};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Split a `cluster/service` handle.
pub fn parse_service_handle(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('/') {
        Some((cluster, service)) if !cluster.is_empty() && !service.is_empty() => {
            Ok((cluster, service))
        }
        _ => bail!("ECS services are addressed as <cluster>/<service>, got '{raw}'"),
    }
}

pub struct EcsService {
    client: aws_sdk_ecs::Client,
    cluster: String,
    service: String,
    arn: String,
}

impl EcsService {
    pub fn new(
        aws: &AwsContext,
        account: &str,
        cluster: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        let cluster = cluster.into();
        let service = service.into();
        Self {
            client: aws.ecs_client(),
            arn: arn::ecs_service(aws.region(), account, &cluster, &service),
            cluster,
            service,
        }
    }

    async fn current_status(&self) -> Result<Option<String>> {
        let described = self
            .client
            .describe_services()
            .cluster(&self.cluster)
            .services(&self.service)
            .send()
            .await
            .with_context(|| {
                format!("Failed to describe service {}/{}", self.cluster, self.service)
            })?;
        Ok(described
            .services()
            .first()
            .and_then(|s| s.status())
            .map(String::from))
    }
}

#[async_trait]
impl Resource for EcsService {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "ecs-service"
    }

    fn name(&self) -> String {
        format!("{}/{}", self.cluster, self.service)
    }

    async fn exists(&self) -> bool {
        match self.current_status().await {
            // Deleted services linger as INACTIVE in describe output.
            Ok(Some(status)) => status != "INACTIVE",
            Ok(None) => false,
            Err(err) => {
                warn!(service = %self.service, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    /// Scale the service to zero so deletion does not need force.
    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        let operation = format!("scale service {}/{} to zero", self.cluster, self.service);
        if !confirm::should_proceed(ctx, &operation)? {
            return Ok(());
        }
        self.client
            .update_service()
            .cluster(&self.cluster)
            .service(&self.service)
            .desired_count(0)
            .send()
            .await
            .with_context(|| {
                format!("Failed to scale down service {}/{}", self.cluster, self.service)
            })?;
        info!(
            cluster = %self.cluster,
            service = %self.service,
            "{}scaled service to zero",
            ctx.log_prefix()
        );
        Ok(())
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        let handle = self.name();
        execute_removal(ctx, self.resource_type(), &handle, || async {
            self.client
                .delete_service()
                .cluster(&self.cluster)
                .service(&self.service)
                .send()
                .await
                .with_context(|| format!("Failed to delete service {handle}"))?;
            Ok(())
        })
        .await
    }
}

pub struct EcsTaskDefinition {
    client: aws_sdk_ecs::Client,
    /// `family:revision`, the handle every task definition API accepts.
    family_revision: String,
    arn: String,
}

impl EcsTaskDefinition {
    pub fn new(aws: &AwsContext, account: &str, family_revision: impl Into<String>) -> Result<Self> {
        let family_revision = family_revision.into();
        if !family_revision.contains(':') {
            bail!("task definitions are addressed as <family>:<revision>, got '{family_revision}'");
        }
        Ok(Self {
            client: aws.ecs_client(),
            arn: arn::ecs_task_definition(aws.region(), account, &family_revision),
            family_revision,
        })
    }
}

#[async_trait]
impl Resource for EcsTaskDefinition {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "ecs-task-definition"
    }

    async fn exists(&self) -> bool {
        let result = self
            .client
            .describe_task_definition()
            .task_definition(&self.family_revision)
            .send()
            .await;
        match result {
            Ok(_) => true,
            // Missing task definitions surface as a client exception, not a
            // dedicated not-found type.
            Err(err) if err.as_service_error().is_some_and(|e| e.is_client_exception()) => false,
            Err(err) => {
                warn!(task_definition = %self.family_revision, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.family_revision, || async {
            self.client
                .deregister_task_definition()
                .task_definition(&self.family_revision)
                .send()
                .await
                .with_context(|| {
                    format!("Failed to deregister task definition {}", self.family_revision)
                })?;
            debug!(task_definition = %self.family_revision, "deregistered");
            self.client
                .delete_task_definitions()
                .task_definitions(&self.family_revision)
                .send()
                .await
                .with_context(|| {
                    format!("Failed to delete task definition {}", self.family_revision)
                })?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_handles_require_a_cluster() {
        assert_eq!(
            parse_service_handle("prod/web").unwrap(),
            ("prod", "web")
        );
        assert!(parse_service_handle("web").is_err());
        assert!(parse_service_handle("/web").is_err());
        assert!(parse_service_handle("prod/").is_err());
    }

    #[tokio::test]
    async fn service_arn_uses_the_long_format() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let service = EcsService::new(&aws, "123456789012", "prod", "web");
        assert_eq!(
            service.arn(),
            "arn:aws:ecs:eu-west-1:123456789012:service/prod/web"
        );
        assert_eq!(service.name(), "prod/web");
    }

    #[tokio::test]
    async fn task_definition_requires_a_revision() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let ok = EcsTaskDefinition::new(&aws, "123456789012", "web:7").unwrap();
        assert_eq!(
            ok.arn(),
            "arn:aws:ecs:eu-west-1:123456789012:task-definition/web:7"
        );
        assert_eq!(ok.name(), "web:7");
        assert!(EcsTaskDefinition::new(&aws, "123456789012", "web").is_err());
    }
}
