//! S3 buckets
//!
//! Buckets must be emptied before deletion, so `clean` pages through the
//! object listing and issues batched deletes. Versioned buckets additionally
//! need their versions and delete markers purged.

use crate::arn;
use crate::aws::AwsContext;
use crate::confirm;
use crate::context::ExecutionContext;
use crate::resource::{execute_removal, RemoveOutcome, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use tracing::{debug, info, warn};

pub struct S3Bucket {
    client: aws_sdk_s3::Client,
    bucket: String,
    arn: String,
}

impl S3Bucket {
    pub fn new(aws: &AwsContext, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        Self {
            client: aws.s3_client(),
            arn: arn::s3_bucket(&bucket),
            bucket,
        }
    }

    /// Delete every current object, 1000 per request.
    async fn purge_objects(&self) -> Result<u64> {
        let mut deleted = 0u64;
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .with_context(|| format!("Failed to list objects in {}", self.bucket))?;

            let keys: Vec<ObjectIdentifier> = page
                .contents()
                .iter()
                .filter_map(|o| o.key())
                .map(|k| ObjectIdentifier::builder().key(k).build())
                .collect::<Result<_, _>>()
                .context("Failed to build object identifiers")?;

            if !keys.is_empty() {
                deleted += keys.len() as u64;
                let delete = Delete::builder()
                    .set_objects(Some(keys))
                    .build()
                    .context("Failed to build delete request")?;
                self.client
                    .delete_objects()
                    .bucket(&self.bucket)
                    .delete(delete)
                    .send()
                    .await
                    .with_context(|| format!("Failed to delete objects in {}", self.bucket))?;
            }

            continuation = page.next_continuation_token().map(String::from);
            if continuation.is_none() {
                break;
            }
        }
        Ok(deleted)
    }

    /// Delete all object versions and delete markers.
    async fn purge_versions(&self) -> Result<u64> {
        let mut deleted = 0u64;
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        loop {
            let page = self
                .client
                .list_object_versions()
                .bucket(&self.bucket)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
                .with_context(|| format!("Failed to list versions in {}", self.bucket))?;

            let mut identifiers = Vec::new();
            for version in page.versions() {
                if let (Some(key), Some(id)) = (version.key(), version.version_id()) {
                    identifiers.push(
                        ObjectIdentifier::builder()
                            .key(key)
                            .version_id(id)
                            .build()
                            .context("Failed to build version identifier")?,
                    );
                }
            }
            for marker in page.delete_markers() {
                if let (Some(key), Some(id)) = (marker.key(), marker.version_id()) {
                    identifiers.push(
                        ObjectIdentifier::builder()
                            .key(key)
                            .version_id(id)
                            .build()
                            .context("Failed to build marker identifier")?,
                    );
                }
            }

            if !identifiers.is_empty() {
                deleted += identifiers.len() as u64;
                let delete = Delete::builder()
                    .set_objects(Some(identifiers))
                    .build()
                    .context("Failed to build delete request")?;
                self.client
                    .delete_objects()
                    .bucket(&self.bucket)
                    .delete(delete)
                    .send()
                    .await
                    .with_context(|| format!("Failed to delete versions in {}", self.bucket))?;
            }

            key_marker = page.next_key_marker().map(String::from);
            version_marker = page.next_version_id_marker().map(String::from);
            if key_marker.is_none() && version_marker.is_none() {
                break;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl Resource for S3Bucket {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "s3-bucket"
    }

    async fn exists(&self) -> bool {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => true,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => false,
            Err(err) => {
                warn!(bucket = %self.bucket, error = %err, "existence check failed, assuming present");
                true
            }
        }
    }

    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        if !confirm::should_proceed(ctx, &format!("empty bucket {}", self.bucket))? {
            return Ok(());
        }
        let objects = self.purge_objects().await?;
        let versions = self.purge_versions().await?;
        if objects + versions > 0 {
            info!(
                bucket = %self.bucket,
                objects,
                versions,
                "{}emptied bucket",
                ctx.log_prefix()
            );
        } else {
            debug!(bucket = %self.bucket, "bucket already empty");
        }
        Ok(())
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        execute_removal(ctx, self.resource_type(), &self.bucket, || async {
            self.client
                .delete_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .with_context(|| format!("Failed to delete bucket {}", self.bucket))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bucket_arn_and_name() {
        let aws = test_context().await;
        let bucket = S3Bucket::new(&aws, "my-bucket");
        assert_eq!(bucket.arn(), "arn:aws:s3:::my-bucket");
        assert_eq!(bucket.name(), "my-bucket");
        assert_eq!(bucket.resource_type(), "s3-bucket");
    }

    async fn test_context() -> AwsContext {
        AwsContext::new("eu-west-1", None).await
    }
}
