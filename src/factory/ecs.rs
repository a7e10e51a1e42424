//! ECS factories
//!
//! Services and task definitions are separate families on the command line
//! but share the `ecs` ARN service. A service handle is `cluster/service`,
//! which the generic ARN-to-name rule would truncate to the bare service
//! name, so the service factory parses the ARN itself.

use crate::arn::Arn;
use crate::aws::AwsContext;
use crate::factory::ResourceFactory;
use crate::resource::ecs::{parse_service_handle, EcsService, EcsTaskDefinition};
use crate::resource::Resource;
use anyhow::{bail, Result};
use async_trait::async_trait;

pub struct EcsServiceFactory {
    aws: AwsContext,
    account: String,
}

impl EcsServiceFactory {
    pub fn new(aws: AwsContext, account: impl Into<String>) -> Self {
        Self {
            aws,
            account: account.into(),
        }
    }
}

#[async_trait]
impl ResourceFactory for EcsServiceFactory {
    fn family(&self) -> &'static str {
        "ecs-service"
    }

    fn resource_type_filters(&self) -> &'static [&'static str] {
        &["ecs:service"]
    }

    fn arn_service(&self) -> &'static str {
        "ecs"
    }

    fn aws(&self) -> &AwsContext {
        &self.aws
    }

    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>> {
        let (cluster, service) = parse_service_handle(name)?;
        Ok(Box::new(EcsService::new(
            &self.aws,
            &self.account,
            cluster,
            service,
        )))
    }

    /// Keep the cluster segment; the generic rule would strip it.
    fn create_by_arn(&self, raw: &str) -> Result<Box<dyn Resource>> {
        let arn: Arn = raw.parse()?;
        if arn.service != "ecs" {
            bail!("ARN {raw} is a {} resource, not ecs", arn.service);
        }
        let Some(handle) = arn.resource.strip_prefix("service/") else {
            bail!("ARN {raw} is not an ECS service ARN");
        };
        self.create_by_name(handle)
    }
}

pub struct EcsTaskDefinitionFactory {
    aws: AwsContext,
    account: String,
}

impl EcsTaskDefinitionFactory {
    pub fn new(aws: AwsContext, account: impl Into<String>) -> Self {
        Self {
            aws,
            account: account.into(),
        }
    }
}

#[async_trait]
impl ResourceFactory for EcsTaskDefinitionFactory {
    fn family(&self) -> &'static str {
        "ecs-task-definition"
    }

    fn resource_type_filters(&self) -> &'static [&'static str] {
        &["ecs:task-definition"]
    }

    fn arn_service(&self) -> &'static str {
        "ecs"
    }

    fn aws(&self) -> &AwsContext {
        &self.aws
    }

    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>> {
        Ok(Box::new(EcsTaskDefinition::new(
            &self.aws,
            &self.account,
            name,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn service_arn_keeps_the_cluster() {
        let factory =
            EcsServiceFactory::new(AwsContext::new("eu-west-1", None).await, "123456789012");
        let service = factory
            .create_by_arn("arn:aws:ecs:eu-west-1:123456789012:service/prod/web")
            .unwrap();
        assert_eq!(service.name(), "prod/web");
    }

    #[tokio::test]
    async fn bare_service_name_is_rejected() {
        let factory =
            EcsServiceFactory::new(AwsContext::new("eu-west-1", None).await, "123456789012");
        assert!(factory.create_by_name("web").is_err());
    }

    #[tokio::test]
    async fn task_definition_arn_round_trips() {
        let factory = EcsTaskDefinitionFactory::new(
            AwsContext::new("eu-west-1", None).await,
            "123456789012",
        );
        let definition = factory
            .create_by_arn("arn:aws:ecs:eu-west-1:123456789012:task-definition/web:7")
            .unwrap();
        assert_eq!(definition.name(), "web:7");
    }
}
