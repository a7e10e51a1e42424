//! Tests against a real AWS account.
//!
//! Run with `cargo test -- --ignored` and valid credentials. The non-ignored
//! tests only exercise the dry-run path, which never calls a mutating API.

use aws_sweeper::aws::{account, AwsContext};
use aws_sweeper::context::ExecutionContext;
use aws_sweeper::factory::ecs::EcsServiceFactory;
use aws_sweeper::factory::iam::IamFactory;
use aws_sweeper::factory::s3::S3Factory;
use aws_sweeper::factory::ResourceFactory;
use aws_sweeper::orchestrator::remove_one;
use aws_sweeper::resource::RemoveOutcome;
use aws_sweeper::tags::TagFilter;

fn dry_run_ctx() -> ExecutionContext {
    ExecutionContext {
        dry_run: true,
        auto_approve: false,
        region: Some("eu-west-1".to_string()),
        profile: None,
    }
}

#[tokio::test]
async fn dry_run_removal_performs_no_deletion() {
    let aws = AwsContext::new("eu-west-1", None).await;
    let factory = S3Factory::new(aws);
    let bucket = factory
        .create_by_name("aws-sweeper-test-nonexistent-bucket")
        .unwrap();
    let outcome = remove_one(bucket.as_ref(), &dry_run_ctx()).await.unwrap();
    assert_eq!(outcome, RemoveOutcome::DryRun);
}

#[tokio::test]
async fn dry_run_role_removal_skips_the_clean_stage_too() {
    // The clean stage (policy stripping) gates before any IAM call, so a
    // dry-run completes without credentials.
    let aws = AwsContext::new("eu-west-1", None).await;
    let factory = IamFactory::roles(aws, "123456789012");
    let role = factory.create_by_name("aws-sweeper-test-nonexistent").unwrap();
    let outcome = remove_one(role.as_ref(), &dry_run_ctx()).await.unwrap();
    assert_eq!(outcome, RemoveOutcome::DryRun);
}

#[tokio::test]
async fn dry_run_service_removal_does_not_scale_down() {
    let aws = AwsContext::new("eu-west-1", None).await;
    let factory = EcsServiceFactory::new(aws, "123456789012");
    let service = factory.create_by_name("test-cluster/test-service").unwrap();
    let outcome = remove_one(service.as_ref(), &dry_run_ctx()).await.unwrap();
    assert_eq!(outcome, RemoveOutcome::DryRun);
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn resolves_caller_identity() {
    let aws = AwsContext::new("eu-west-1", None).await;
    let account_id = account::get_account_id(&aws).await.unwrap();
    assert_eq!(account_id.len(), 12);
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn tag_discovery_aggregates_pages() {
    let aws = AwsContext::new("eu-west-1", None).await;
    let factory = S3Factory::new(aws);
    let filter = TagFilter::parse(r#"{"aws-sweeper-test": "true"}"#).unwrap();
    // No buckets carry this tag in the test account; an empty result is the
    // expected outcome, not an error.
    let resources = factory.create_by_tags(&filter).await.unwrap();
    assert!(resources.is_empty());
}
