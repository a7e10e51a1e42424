//! DynamoDB tables
//!
//! Deleting a table drops its items with it, so `clean` is only needed when
//! the table should be emptied without going away; it scans the table and
//! batch-deletes every item by its key. Writes go in batches of 25, the
//! API's maximum, and unprocessed items are resubmitted.

use crate::arn;
use crate::aws::AwsContext;
use crate::confirm;
use crate::context::ExecutionContext;
use crate::resource::{execute_removal, RemoveOutcome, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, WriteRequest};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const BATCH_WRITE_MAX: usize = 25;

/// Restrict an item to its key attributes, the shape `DeleteRequest` wants.
pub fn key_projection(
    item: &HashMap<String, AttributeValue>,
    key_names: &[String],
) -> HashMap<String, AttributeValue> {
    key_names
        .iter()
        .filter_map(|name| item.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

pub struct DynamoTable {
    client: aws_sdk_dynamodb::Client,
    table: String,
    arn: String,
}

impl DynamoTable {
    pub fn new(aws: &AwsContext, account: &str, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            client: aws.dynamodb_client(),
            arn: arn::dynamodb_table(aws.region(), account, &table),
            table,
        }
    }

    /// Attribute names of the table's key schema.
    async fn key_names(&self) -> Result<Vec<String>> {
        let described = self
            .client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await
            .with_context(|| format!("Failed to describe table {}", self.table))?;
        Ok(described
            .table()
            .map(|t| t.key_schema())
            .unwrap_or_default()
            .iter()
            .map(|k| k.attribute_name().to_string())
            .collect())
    }

    async fn purge_items(&self) -> Result<u64> {
        let key_names = self.key_names().await?;
        let mut deleted = 0u64;
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let page = self
                .client
                .scan()
                .table_name(&self.table)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .with_context(|| format!("Failed to scan table {}", self.table))?;

            let keys: Vec<HashMap<String, AttributeValue>> = page
                .items()
                .iter()
                .map(|item| key_projection(item, &key_names))
                .collect();

            for chunk in keys.chunks(BATCH_WRITE_MAX) {
                let mut pending: Vec<WriteRequest> = chunk
                    .iter()
                    .map(|key| {
                        Ok(WriteRequest::builder()
                            .delete_request(
                                DeleteRequest::builder()
                                    .set_key(Some(key.clone()))
                                    .build()
                                    .context("Failed to build delete request")?,
                            )
                            .build())
                    })
                    .collect::<Result<_>>()?;
                deleted += pending.len() as u64;

                while !pending.is_empty() {
                    let response = self
                        .client
                        .batch_write_item()
                        .request_items(&self.table, pending)
                        .send()
                        .await
                        .with_context(|| {
                            format!("Failed to batch-delete items in {}", self.table)
                        })?;
                    pending = response
                        .unprocessed_items()
                        .and_then(|u| u.get(&self.table))
                        .cloned()
                        .unwrap_or_default();
                }
            }

            start_key = page.last_evaluated_key().cloned();
            if start_key.is_none() {
                break;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl Resource for DynamoTable {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "dynamodb-table"
    }

    async fn exists(&self) -> bool {
        let result = self
            .client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await;
        match result {
            Ok(_) => true,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                false
            }
            Err(err) => {
                warn!(table = %self.table, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        if !confirm::should_proceed(ctx, &format!("empty table {}", self.table))? {
            return Ok(());
        }
        let deleted = self.purge_items().await?;
        if deleted > 0 {
            info!(
                table = %self.table,
                items = deleted,
                "{}emptied table",
                ctx.log_prefix()
            );
        } else {
            debug!(table = %self.table, "table already empty");
        }
        Ok(())
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.table, || async {
            self.client
                .delete_table()
                .table_name(&self.table)
                .send()
                .await
                .with_context(|| format!("Failed to delete table {}", self.table))?;
            Ok(())
        })
        .await
    }
}
