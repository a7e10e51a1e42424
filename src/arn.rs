//! ARN parsing and construction
//!
//! One canonical rule maps an ARN to a resource name: take the resource
//! portion of the ARN and strip a leading `type/` or `type:` qualifier if one
//! is present. Factories use the inverse to build ARNs from names without a
//! network round trip.

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

/// Parsed AWS resource name.
///
/// `arn:partition:service:region:account:resource` where `resource` may
/// itself contain colons or slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account: String,
    pub resource: String,
}

impl FromStr for Arn {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(6, ':');
        let prefix = parts.next().unwrap_or_default();
        if prefix != "arn" {
            bail!("Invalid ARN '{s}': must start with 'arn:'");
        }
        let (Some(partition), Some(service), Some(region), Some(account), Some(resource)) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            bail!("Invalid ARN '{s}': expected 6 colon-separated fields");
        };
        if partition.is_empty() || service.is_empty() || resource.is_empty() {
            bail!("Invalid ARN '{s}': partition, service and resource are required");
        }
        Ok(Self {
            partition: partition.to_string(),
            service: service.to_string(),
            region: region.to_string(),
            account: account.to_string(),
            resource: resource.to_string(),
        })
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

impl Arn {
    /// Derive the resource name from the resource portion.
    ///
    /// `subnet/subnet-123` and `role/admins` yield the last path segment;
    /// `cluster:my-cluster` yields the part after the colon; a bare resource
    /// (S3 buckets, pipelines) is returned as-is.
    pub fn resource_name(&self) -> &str {
        if let Some((_, rest)) = self.resource.split_once('/') {
            rest.rsplit('/').next().unwrap_or(rest)
        } else if let Some((_, rest)) = self.resource.split_once(':') {
            rest
        } else {
            &self.resource
        }
    }

    /// Region field, if set. Empty for global services such as S3 and IAM.
    pub fn region(&self) -> Option<&str> {
        if self.region.is_empty() {
            None
        } else {
            Some(self.region.as_str())
        }
    }
}

/// Build an S3 bucket ARN. S3 ARNs carry neither region nor account.
pub fn s3_bucket(name: &str) -> String {
    format!("arn:aws:s3:::{name}")
}

/// Build an EC2 resource ARN, e.g. `instance/i-0abc` or `subnet/subnet-0abc`.
pub fn ec2_resource(region: &str, account: &str, resource_type: &str, id: &str) -> String {
    format!("arn:aws:ec2:{region}:{account}:{resource_type}/{id}")
}

/// Build an ECR repository ARN.
pub fn ecr_repository(region: &str, account: &str, name: &str) -> String {
    format!("arn:aws:ecr:{region}:{account}:repository/{name}")
}

/// Build a CodePipeline ARN. The resource portion is the bare pipeline name.
pub fn codepipeline(region: &str, account: &str, name: &str) -> String {
    format!("arn:aws:codepipeline:{region}:{account}:{name}")
}

/// Build an IAM role ARN. IAM is global, so the region field is empty.
pub fn iam_role(account: &str, name: &str) -> String {
    format!("arn:aws:iam::{account}:role/{name}")
}

/// Build an IAM user ARN.
pub fn iam_user(account: &str, name: &str) -> String {
    format!("arn:aws:iam::{account}:user/{name}")
}

/// Build an IAM group ARN.
pub fn iam_group(account: &str, name: &str) -> String {
    format!("arn:aws:iam::{account}:group/{name}")
}

/// Build a customer-managed IAM policy ARN.
pub fn iam_policy(account: &str, name: &str) -> String {
    format!("arn:aws:iam::{account}:policy/{name}")
}

/// Build a CloudFront distribution ARN. CloudFront is global.
pub fn cloudfront_distribution(account: &str, id: &str) -> String {
    format!("arn:aws:cloudfront::{account}:distribution/{id}")
}

/// Build a DynamoDB table ARN.
pub fn dynamodb_table(region: &str, account: &str, name: &str) -> String {
    format!("arn:aws:dynamodb:{region}:{account}:table/{name}")
}

/// Build a CodeBuild project ARN.
pub fn codebuild_project(region: &str, account: &str, name: &str) -> String {
    format!("arn:aws:codebuild:{region}:{account}:project/{name}")
}

/// Build an ECS service ARN using the long (cluster-qualified) format.
pub fn ecs_service(region: &str, account: &str, cluster: &str, service: &str) -> String {
    format!("arn:aws:ecs:{region}:{account}:service/{cluster}/{service}")
}

/// Build an ECS task definition ARN from `family:revision`.
pub fn ecs_task_definition(region: &str, account: &str, family_revision: &str) -> String {
    format!("arn:aws:ecs:{region}:{account}:task-definition/{family_revision}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_arn() {
        let arn: Arn = "arn:aws:ec2:eu-west-1:123456789012:subnet/subnet-0abc"
            .parse()
            .unwrap();
        assert_eq!(arn.service, "ec2");
        assert_eq!(arn.region(), Some("eu-west-1"));
        assert_eq!(arn.account, "123456789012");
        assert_eq!(arn.resource, "subnet/subnet-0abc");
    }

    #[test]
    fn s3_arn_has_no_region_or_account() {
        let arn: Arn = "arn:aws:s3:::my-bucket".parse().unwrap();
        assert_eq!(arn.region(), None);
        assert_eq!(arn.resource_name(), "my-bucket");
    }

    #[test]
    fn name_from_slash_qualified_resource() {
        let arn: Arn = "arn:aws:ec2:eu-west-1:123456789012:subnet/subnet-0abc"
            .parse()
            .unwrap();
        assert_eq!(arn.resource_name(), "subnet-0abc");
    }

    #[test]
    fn name_from_colon_qualified_resource() {
        let arn: Arn = "arn:aws:ecs:eu-west-1:123456789012:cluster:my-cluster"
            .parse()
            .unwrap();
        assert_eq!(arn.resource_name(), "my-cluster");
    }

    #[test]
    fn name_from_nested_path() {
        let arn: Arn = "arn:aws:iam::123456789012:role/service/my-role"
            .parse()
            .unwrap();
        assert_eq!(arn.resource_name(), "my-role");
    }

    #[test]
    fn rejects_non_arn_strings() {
        assert!("not-an-arn".parse::<Arn>().is_err());
        assert!("arn:aws:s3".parse::<Arn>().is_err());
    }

    #[test]
    fn builds_s3_bucket_arn() {
        assert_eq!(s3_bucket("my-bucket"), "arn:aws:s3:::my-bucket");
    }

    #[test]
    fn builds_ec2_and_iam_arns() {
        assert_eq!(
            ec2_resource("eu-west-1", "123456789012", "instance", "i-0abc"),
            "arn:aws:ec2:eu-west-1:123456789012:instance/i-0abc"
        );
        assert_eq!(
            iam_role("123456789012", "deployer"),
            "arn:aws:iam::123456789012:role/deployer"
        );
    }

    #[test]
    fn builds_global_service_arns() {
        assert_eq!(
            cloudfront_distribution("123456789012", "E2EXAMPLE"),
            "arn:aws:cloudfront::123456789012:distribution/E2EXAMPLE"
        );
        assert_eq!(
            iam_policy("123456789012", "readonly"),
            "arn:aws:iam::123456789012:policy/readonly"
        );
    }

    #[test]
    fn task_definition_name_keeps_family_and_revision() {
        let arn: Arn = ecs_task_definition("eu-west-1", "123456789012", "web:7")
            .parse()
            .unwrap();
        assert_eq!(arn.resource_name(), "web:7");
    }

    #[test]
    fn display_round_trips() {
        let raw = "arn:aws:ec2:eu-west-1:123456789012:subnet/subnet-0abc";
        let arn: Arn = raw.parse().unwrap();
        assert_eq!(arn.to_string(), raw);
    }
}
