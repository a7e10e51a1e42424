use anyhow::{bail, Result};
use aws_sweeper::aws::{account, AwsContext, DEFAULT_REGION};
use aws_sweeper::context::ExecutionContext;
use aws_sweeper::factory::cloudfront::CloudFrontFactory;
use aws_sweeper::factory::codebuild::CodeBuildFactory;
use aws_sweeper::factory::codepipeline::CodePipelineFactory;
use aws_sweeper::factory::dynamodb::DynamoDbFactory;
use aws_sweeper::factory::ec2::Ec2Factory;
use aws_sweeper::factory::ecr::EcrFactory;
use aws_sweeper::factory::ecs::{EcsServiceFactory, EcsTaskDefinitionFactory};
use aws_sweeper::factory::iam::IamFactory;
use aws_sweeper::factory::s3::S3Factory;
use aws_sweeper::factory::vpc::VpcFactory;
use aws_sweeper::factory::ResourceFactory;
use aws_sweeper::input;
use aws_sweeper::orchestrator::{remove_batch, remove_one, teardown_vpc, BatchSummary};
use aws_sweeper::resource::vpc::VpcResource;
use aws_sweeper::resource::{Eligibility, RemoveOutcome, Resource};
use aws_sweeper::tags::TagFilter;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aws-sweeper", version, about = "Delete AWS resources, carefully")]
struct Cli {
    /// AWS profile to use.
    #[arg(long, global = true)]
    profile: Option<String>,

    /// AWS region.
    #[arg(long, global = true, default_value = DEFAULT_REGION, env = "AWS_REGION")]
    region: String,

    /// Log intended deletions without performing them.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Skip interactive confirmation prompts.
    #[arg(long, global = true)]
    auto_approve: bool,

    /// Skip the account confirmation gate. Also honored as the
    /// SKIP_ACCOUNT_CHECK environment variable.
    #[arg(long, global = true)]
    skip_account_check: bool,

    #[command(subcommand)]
    family: Family,
}

#[derive(Subcommand)]
enum Family {
    /// S3 buckets (emptied, then deleted).
    S3 {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// EC2 instances (terminated).
    Ec2 {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// ECR repositories (images purged, then deleted).
    Ecr {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// CodePipeline pipelines.
    Codepipeline {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// IAM roles (policies stripped, then deleted).
    Iam {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// IAM users.
    IamUser {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// IAM groups (members removed, then deleted).
    IamGroup {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// Customer-managed IAM policies (detached everywhere, then deleted).
    IamPolicy {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// CloudFront distributions (disabled and deployed, then deleted).
    Cloudfront {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// DynamoDB tables.
    Dynamodb {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// CodeBuild projects.
    Codebuild {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// ECS services, addressed as <cluster>/<service>.
    EcsService {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// ECS task definitions, addressed as <family>:<revision>.
    EcsTaskDefinition {
        #[command(subcommand)]
        command: RemoveCommand,
    },
    /// VPC network resources: dependency-aware teardown and scanning.
    Vpc {
        #[command(subcommand)]
        command: VpcCommand,
    },
}

#[derive(Subcommand)]
enum RemoveCommand {
    /// Remove one resource by name.
    RemoveByName { name: String },
    /// Remove one resource by provider id.
    RemoveById { id: String },
    /// Remove one resource by full ARN.
    RemoveByArn { arn: String },
    /// Remove every resource matching a tag filter.
    RemoveByTags {
        /// JSON object, e.g. '{"Team": "A", "Env": ["dev", "qa"]}'.
        /// Prompted interactively when omitted.
        #[arg(long)]
        tags: Option<String>,
    },
    /// Remove every resource named in a list file (CSV with a
    /// `resource_names` column, or one name per line).
    RemoveByFileList { path: PathBuf },
}

#[derive(Subcommand)]
enum VpcCommand {
    /// Discover and delete the VPC's resources in dependency order.
    Teardown {
        #[arg(long)]
        vpc_id: String,
        /// Restrict teardown to resources matching this tag filter.
        #[arg(long)]
        tags: Option<String>,
    },
    /// List the VPC's resources and their deletion eligibility.
    Scan {
        #[arg(long)]
        vpc_id: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(serde::Serialize)]
struct ScanEntry {
    kind: &'static str,
    id: String,
    arn: String,
    name: String,
    default: bool,
    eligible: bool,
    dependencies: Vec<String>,
}

#[derive(serde::Serialize)]
struct ScanReport {
    vpc_id: String,
    scanned_at: String,
    resources: Vec<ScanEntry>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        print_error(&err);
        std::process::exit(1);
    }
}

fn print_error(err: &anyhow::Error) {
    eprintln!("Error: {err}");
    for cause in err.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let ctx = ExecutionContext::new(
        cli.dry_run,
        cli.auto_approve,
        Some(cli.region.clone()),
        cli.profile.clone(),
    );
    let aws = AwsContext::from_execution_context(&ctx).await;
    let skip_account_check =
        cli.skip_account_check || aws_sweeper::context::env_flag("SKIP_ACCOUNT_CHECK");

    match cli.family {
        Family::Vpc {
            command: VpcCommand::Scan { vpc_id, format },
        } => {
            // Read-only: no account gate.
            let account_id = account::get_account_id(&aws).await?;
            let factory = VpcFactory::new(aws, account_id);
            let collection = factory.discover(&vpc_id).await?;
            print_scan(&collection, format).await;
            Ok(())
        }
        Family::Vpc {
            command: VpcCommand::Teardown { vpc_id, tags },
        } => {
            let account_id = account::confirm_account(&aws, &ctx, skip_account_check).await?;
            let factory = VpcFactory::new(aws, account_id);
            let collection = factory.discover(&vpc_id).await?;

            let collection = match tags.as_deref() {
                Some(raw) => collection.filter_by_tags(&TagFilter::parse(raw)?),
                None => collection,
            };
            let collection = collection.exclude_default_resources();

            let summary = teardown_vpc(&collection, &ctx).await;
            finish(summary)
        }
        family => {
            let account_id = account::confirm_account(&aws, &ctx, skip_account_check).await?;
            match family {
                Family::S3 { command } => {
                    run_remove(&S3Factory::new(aws), command, &ctx).await
                }
                Family::Ec2 { command } => {
                    let factory = Ec2Factory::new(aws, account_id);
                    if let RemoveCommand::RemoveByName { name } = &command {
                        // EC2 names are tags, not handles; resolve to ids first.
                        let resources = factory.create_all_by_name(name).await?;
                        return finish(remove_batch(&resources, &ctx).await);
                    }
                    run_remove(&factory, command, &ctx).await
                }
                Family::Ecr { command } => {
                    run_remove(&EcrFactory::new(aws, account_id), command, &ctx).await
                }
                Family::Codepipeline { command } => {
                    run_remove(&CodePipelineFactory::new(aws, account_id), command, &ctx).await
                }
                Family::Iam { command } => {
                    run_remove(&IamFactory::roles(aws, account_id), command, &ctx).await
                }
                Family::IamUser { command } => {
                    run_remove(&IamFactory::users(aws, account_id), command, &ctx).await
                }
                Family::IamGroup { command } => {
                    run_remove(&IamFactory::groups(aws, account_id), command, &ctx).await
                }
                Family::IamPolicy { command } => {
                    run_remove(&IamFactory::policies(aws, account_id), command, &ctx).await
                }
                Family::Cloudfront { command } => {
                    run_remove(&CloudFrontFactory::new(aws, account_id), command, &ctx).await
                }
                Family::Dynamodb { command } => {
                    run_remove(&DynamoDbFactory::new(aws, account_id), command, &ctx).await
                }
                Family::Codebuild { command } => {
                    run_remove(&CodeBuildFactory::new(aws, account_id), command, &ctx).await
                }
                Family::EcsService { command } => {
                    run_remove(&EcsServiceFactory::new(aws, account_id), command, &ctx).await
                }
                Family::EcsTaskDefinition { command } => {
                    run_remove(
                        &EcsTaskDefinitionFactory::new(aws, account_id),
                        command,
                        &ctx,
                    )
                    .await
                }
                Family::Vpc { .. } => unreachable!("handled above"),
            }
        }
    }
}

async fn run_remove(
    factory: &dyn ResourceFactory,
    command: RemoveCommand,
    ctx: &ExecutionContext,
) -> Result<()> {
    match command {
        RemoveCommand::RemoveByName { name } => {
            let resource = factory.create_by_name(&name)?;
            let outcome = remove_one(resource.as_ref(), ctx).await?;
            report_single(&outcome);
            Ok(())
        }
        RemoveCommand::RemoveById { id } => {
            let resource = factory.create_by_id(&id)?;
            let outcome = remove_one(resource.as_ref(), ctx).await?;
            report_single(&outcome);
            Ok(())
        }
        RemoveCommand::RemoveByArn { arn } => {
            let resource = factory.create_by_arn(&arn)?;
            let outcome = remove_one(resource.as_ref(), ctx).await?;
            report_single(&outcome);
            Ok(())
        }
        RemoveCommand::RemoveByTags { tags } => {
            let filter = input::resolve_tag_filter(tags.as_deref())?;
            let resources = factory.create_by_tags(&filter).await?;
            finish(remove_batch(&resources, ctx).await)
        }
        RemoveCommand::RemoveByFileList { path } => {
            let resources = factory.create_by_list_file(&path)?;
            finish(remove_batch(&resources, ctx).await)
        }
    }
}

fn report_single(outcome: &RemoveOutcome) {
    if let RemoveOutcome::Blocked(reason) = outcome {
        warn!(reason = %reason, "resource not removed");
    }
}

fn finish(summary: BatchSummary) -> Result<()> {
    if summary.failed > 0 {
        bail!("{} of {} removals failed", summary.failed, summary.total());
    }
    Ok(())
}

/// Report eligibility the way teardown would decide it: the resource's own
/// state checks plus live dependencies from the graph.
async fn print_scan(
    collection: &aws_sweeper::resource::vpc::collection::VpcResourceCollection,
    format: OutputFormat,
) {
    let no_removals = std::collections::HashSet::new();
    match format {
        OutputFormat::Json => {
            let mut resources = Vec::with_capacity(collection.len());
            for r in collection.iter() {
                let id = r.vpc_resource_id();
                resources.push(ScanEntry {
                    kind: r.kind().label(),
                    id: r.resource_id().to_string(),
                    arn: r.arn().to_string(),
                    name: r.name(),
                    default: r.is_default_resource(),
                    eligible: collection.eligibility_of(&id, &no_removals).await.is_eligible(),
                    dependencies: collection
                        .graph()
                        .dependencies_of(&id)
                        .map(|d| d.to_string())
                        .collect(),
                });
            }
            let report = ScanReport {
                vpc_id: collection.vpc_id().to_string(),
                scanned_at: chrono::Utc::now().to_rfc3339(),
                resources,
            };
            println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
        }
        OutputFormat::Table => {
            println!(
                "VPC {} ({} resources, scanned {})",
                collection.vpc_id(),
                collection.len(),
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("{:<20} {:<24} {:<10} {}", "KIND", "ID", "ELIGIBLE", "BLOCKED BY");
            for resource in collection.ordered() {
                let id = resource.vpc_resource_id();
                let deps: Vec<_> = collection
                    .graph()
                    .dependencies_of(&id)
                    .map(|d| d.to_string())
                    .collect();
                let eligible = match collection.eligibility_of(&id, &no_removals).await {
                    Eligibility::Eligible => "yes".to_string(),
                    Eligibility::Blocked(reason) => format!("no ({reason})"),
                };
                println!(
                    "{:<20} {:<24} {:<10} {}",
                    resource.kind().label(),
                    resource.resource_id(),
                    eligible,
                    deps.join(", ")
                );
            }
        }
    }
}
