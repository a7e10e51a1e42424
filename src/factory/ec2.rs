//! EC2 instance factory
//!
//! Instances are addressed by id. `create_by_name` resolves a `Name` tag to
//! instance ids first, so list files of names keep working.

use crate::aws::AwsContext;
use crate::factory::ResourceFactory;
use crate::resource::ec2::Ec2Instance;
use crate::resource::Resource;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::types::Filter;

pub struct Ec2Factory {
    aws: AwsContext,
    account: String,
}

impl Ec2Factory {
    pub fn new(aws: AwsContext, account: impl Into<String>) -> Self {
        Self {
            aws,
            account: account.into(),
        }
    }

    /// Instance ids whose `Name` tag equals `name`.
    pub async fn instance_ids_by_name(&self, name: &str) -> Result<Vec<String>> {
        let described = self
            .aws
            .ec2_client()
            .describe_instances()
            .filters(Filter::builder().name("tag:Name").values(name).build())
            .send()
            .await
            .with_context(|| format!("Failed to look up instances named {name}"))?;
        Ok(described
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(|i| i.instance_id())
            .map(String::from)
            .collect())
    }

    /// Name-based construction needs a network lookup; callers resolve ids
    /// first via [`Self::instance_ids_by_name`].
    pub async fn create_all_by_name(&self, name: &str) -> Result<Vec<Box<dyn Resource>>> {
        let ids = self.instance_ids_by_name(name).await?;
        if ids.is_empty() {
            bail!("No instance with Name tag '{name}'");
        }
        ids.iter().map(|id| self.create_by_id(id)).collect()
    }
}

#[async_trait]
impl ResourceFactory for Ec2Factory {
    fn family(&self) -> &'static str {
        "ec2"
    }

    fn resource_type_filters(&self) -> &'static [&'static str] {
        &["ec2:instance"]
    }

    fn aws(&self) -> &AwsContext {
        &self.aws
    }

    /// For EC2 the name *is* the instance id in lazy construction paths; tag
    /// resolution is offered separately as an async call.
    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>> {
        self.create_by_id(name)
    }

    fn create_by_id(&self, id: &str) -> Result<Box<dyn Resource>> {
        Ok(Box::new(Ec2Instance::new(&self.aws, &self.account, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn id_yields_instance_arn() {
        let factory = Ec2Factory::new(AwsContext::new("eu-west-1", None).await, "123456789012");
        let instance = factory.create_by_id("i-0abc").unwrap();
        assert_eq!(
            instance.arn(),
            "arn:aws:ec2:eu-west-1:123456789012:instance/i-0abc"
        );
    }

    #[tokio::test]
    async fn instance_arn_round_trips() {
        let factory = Ec2Factory::new(AwsContext::new("eu-west-1", None).await, "123456789012");
        let instance = factory
            .create_by_arn("arn:aws:ec2:eu-west-1:123456789012:instance/i-0abc")
            .unwrap();
        assert_eq!(instance.name(), "i-0abc");
    }
}
