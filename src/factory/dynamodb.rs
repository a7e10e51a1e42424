//! DynamoDB table factory

use crate::aws::AwsContext;
use crate::factory::ResourceFactory;
use crate::resource::dynamodb::DynamoTable;
use crate::resource::Resource;
use anyhow::Result;
use async_trait::async_trait;

pub struct DynamoDbFactory {
    aws: AwsContext,
    account: String,
}

impl DynamoDbFactory {
    pub fn new(aws: AwsContext, account: impl Into<String>) -> Self {
        Self {
            aws,
            account: account.into(),
        }
    }
}

#[async_trait]
impl ResourceFactory for DynamoDbFactory {
    fn family(&self) -> &'static str {
        "dynamodb"
    }

    fn resource_type_filters(&self) -> &'static [&'static str] {
        &["dynamodb:table"]
    }

    fn aws(&self) -> &AwsContext {
        &self.aws
    }

    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>> {
        Ok(Box::new(DynamoTable::new(&self.aws, &self.account, name)))
    }
}
