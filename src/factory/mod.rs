//! Resource factories
//!
//! A factory turns user input (name, id, ARN, tag filter, list file) into
//! resources for one family. Name/id/ARN construction is lazy: the ARN is
//! built from the family's template without touching the network, so a typo
//! surfaces as a not-found at deletion time, not before. Tag discovery goes
//! through the Resource Groups Tagging API and aggregates all pages before
//! returning.

pub mod cloudfront;
pub mod codebuild;
pub mod codepipeline;
pub mod dynamodb;
pub mod ec2;
pub mod ecr;
pub mod ecs;
pub mod iam;
pub mod s3;
pub mod vpc;

use crate::arn::Arn;
use crate::aws::AwsContext;
use crate::input;
use crate::resource::Resource;
use crate::tags::TagFilter;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Builds resources of one family from the supported input forms.
#[async_trait]
pub trait ResourceFactory: Send + Sync {
    /// Family label, e.g. `s3`.
    fn family(&self) -> &'static str;

    /// Resource type filters for the tagging API, e.g. `ec2:instance`.
    fn resource_type_filters(&self) -> &'static [&'static str];

    fn aws(&self) -> &AwsContext;

    fn create_by_name(&self, name: &str) -> Result<Box<dyn Resource>>;

    /// For families whose natural handle is an id rather than a name.
    /// Defaults to name-based construction.
    fn create_by_id(&self, id: &str) -> Result<Box<dyn Resource>> {
        self.create_by_name(id)
    }

    /// Parse the ARN, check it belongs to this family, and build from the
    /// derived name.
    fn create_by_arn(&self, raw: &str) -> Result<Box<dyn Resource>> {
        let arn: Arn = raw.parse()?;
        let expected = self.arn_service();
        if arn.service != expected {
            bail!(
                "ARN {raw} is a {} resource, not {expected}",
                arn.service
            );
        }
        self.create_by_name(arn.resource_name())
    }

    /// Service field expected in ARNs of this family.
    fn arn_service(&self) -> &'static str {
        self.family()
    }

    /// Discover resources by tag filter via the tagging API.
    async fn create_by_tags(&self, filter: &TagFilter) -> Result<Vec<Box<dyn Resource>>> {
        let arns = arns_by_tags(self.aws(), filter, self.resource_type_filters()).await?;
        debug!(
            family = self.family(),
            matched = arns.len(),
            "tag discovery finished"
        );
        arns.iter().map(|arn| self.create_by_arn(arn)).collect()
    }

    /// Build one resource per name in a list file. Any malformed row fails
    /// the whole call before any resource is built.
    fn create_by_list_file(&self, path: &Path) -> Result<Vec<Box<dyn Resource>>> {
        let names = input::read_resource_names(path)?;
        names.iter().map(|name| self.create_by_name(name)).collect()
    }
}

/// All ARNs matching a tag filter, across every page of the tagging API.
pub async fn arns_by_tags(
    aws: &AwsContext,
    filter: &TagFilter,
    resource_type_filters: &[&str],
) -> Result<Vec<String>> {
    let client = aws.tagging_client();
    let tag_filters: Vec<_> = filter
        .predicates()
        .iter()
        .map(|p| {
            aws_sdk_resourcegroupstaggingapi::types::TagFilter::builder()
                .key(&p.key)
                .set_values(Some(p.values.clone()))
                .build()
        })
        .collect();

    let mut arns = Vec::new();
    let mut pagination_token: Option<String> = None;
    loop {
        let page = client
            .get_resources()
            .set_tag_filters(Some(tag_filters.clone()))
            .set_resource_type_filters(Some(
                resource_type_filters.iter().map(|s| s.to_string()).collect(),
            ))
            .set_pagination_token(pagination_token.take())
            .send()
            .await
            .context("Failed to query the tagging API")?;

        arns.extend(
            page.resource_tag_mapping_list()
                .iter()
                .filter_map(|m| m.resource_arn())
                .map(String::from),
        );

        pagination_token = page
            .pagination_token()
            .filter(|t| !t.is_empty())
            .map(String::from);
        if pagination_token.is_none() {
            break;
        }
    }
    Ok(arns)
}
