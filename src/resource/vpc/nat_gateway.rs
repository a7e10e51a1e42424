//! NAT gateways
//!
//! Deletion is accepted in the available and failed states and takes minutes
//! to complete; removal observes the transition to `deleted` with a bounded
//! wait so dependent subnets are not attempted while the gateway lingers.
//! Routes forwarding through the gateway block deletion and are deleted by
//! the clean stage first.

use crate::arn;
use crate::aws::{classify_anyhow_error, classify_sdk_error, AwsContext};
use crate::confirm;
use crate::context::ExecutionContext;
use crate::resource::vpc::{VpcResource, VpcResourceKind};
use crate::resource::{execute_removal, Eligibility, RemoveOutcome, Resource};
use crate::tags::{self, Tag};
use crate::wait::{wait_until, Probe, WaitConfig, WaitOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::types::{Filter, NatGateway as DescribedGateway, NatGatewayState, RouteTable};
use tracing::{debug, warn};

/// A route that forwards traffic through a NAT gateway. Deleting it takes the
/// owning table id plus the destination the route was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRoute {
    pub route_table_id: String,
    pub destination: RouteDestination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDestination {
    Cidr(String),
    Ipv6Cidr(String),
}

impl std::fmt::Display for RouteDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteDestination::Cidr(cidr) | RouteDestination::Ipv6Cidr(cidr) => f.write_str(cidr),
        }
    }
}

/// Routes in `tables` whose target is `gateway_id`.
pub fn routes_through_gateway(gateway_id: &str, tables: &[RouteTable]) -> Vec<GatewayRoute> {
    let mut routes = Vec::new();
    for table in tables {
        let Some(table_id) = table.route_table_id() else {
            continue;
        };
        for route in table.routes() {
            if route.nat_gateway_id() != Some(gateway_id) {
                continue;
            }
            let destination = if let Some(cidr) = route.destination_cidr_block() {
                RouteDestination::Cidr(cidr.to_string())
            } else if let Some(cidr) = route.destination_ipv6_cidr_block() {
                RouteDestination::Ipv6Cidr(cidr.to_string())
            } else {
                continue;
            };
            routes.push(GatewayRoute {
                route_table_id: table_id.to_string(),
                destination,
            });
        }
    }
    routes
}

/// Pure deletion-eligibility decision. Gateways already deleting or deleted
/// are eligible; the delete call is a no-op for them and existence checks
/// report them gone. Routes still forwarding through the gateway block until
/// the clean stage has deleted them.
pub fn nat_gateway_eligibility(
    state: Option<&NatGatewayState>,
    routes: &[GatewayRoute],
) -> Eligibility {
    if let Some(NatGatewayState::Pending) = state {
        return Eligibility::blocked("gateway still provisioning");
    }
    if !routes.is_empty() {
        let tables: Vec<&str> = routes.iter().map(|r| r.route_table_id.as_str()).collect();
        return Eligibility::blocked(format!("routed to from {}", tables.join(", ")));
    }
    Eligibility::Eligible
}

pub struct NatGateway {
    client: aws_sdk_ec2::Client,
    vpc_id: String,
    gateway_id: String,
    arn: String,
    tags: Vec<Tag>,
    state: Option<NatGatewayState>,
    subnet_id: Option<String>,
    routes: Vec<GatewayRoute>,
}

impl NatGateway {
    /// Build from a described gateway. `routes` are the routes targeting it,
    /// resolved by the factory from the VPC's route tables.
    pub fn from_described(
        aws: &AwsContext,
        account: &str,
        described: &DescribedGateway,
        routes: Vec<GatewayRoute>,
    ) -> Result<Self> {
        let gateway_id = described
            .nat_gateway_id()
            .context("Described NAT gateway carries no id")?
            .to_string();
        let vpc_id = described
            .vpc_id()
            .context("Described NAT gateway carries no VPC id")?
            .to_string();
        Ok(Self {
            client: aws.ec2_client(),
            arn: arn::ec2_resource(aws.region(), account, "natgateway", &gateway_id),
            tags: tags::from_ec2_tags(described.tags()),
            state: described.state().cloned(),
            subnet_id: described.subnet_id().map(String::from),
            routes,
            vpc_id,
            gateway_id,
        })
    }

    /// Subnet this gateway lives in, for graph construction.
    pub fn subnet_id(&self) -> Option<&str> {
        self.subnet_id.as_deref()
    }

    /// Routes currently targeting this gateway, read from the provider.
    async fn current_routes(&self) -> Result<Vec<GatewayRoute>> {
        let mut tables = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .describe_route_tables()
                .filters(Filter::builder().name("vpc-id").values(&self.vpc_id).build())
                .set_next_token(next_token.take())
                .send()
                .await
                .with_context(|| format!("Failed to describe route tables in {}", self.vpc_id))?;
            tables.extend(page.route_tables().iter().cloned());
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        Ok(routes_through_gateway(&self.gateway_id, &tables))
    }

    async fn current_state(&self) -> Result<Option<NatGatewayState>> {
        let described = self
            .client
            .describe_nat_gateways()
            .nat_gateway_ids(&self.gateway_id)
            .send()
            .await
            .with_context(|| format!("Failed to describe NAT gateway {}", self.gateway_id))?;
        Ok(described
            .nat_gateways()
            .first()
            .and_then(|g| g.state())
            .cloned())
    }

    /// Poll until the gateway reports `deleted`. Timeout is logged, not an
    /// error: the remaining teardown proceeds best-effort.
    async fn await_deletion(&self) -> Result<()> {
        let outcome = wait_until(
            &format!("nat-gateway {} deletion", self.gateway_id),
            WaitConfig::slow(),
            || async {
                let state = match self.current_state().await {
                    Ok(state) => state,
                    Err(err) => {
                        if classify_anyhow_error(&err, self.resource_type(), &self.gateway_id)
                            .is_not_found()
                        {
                            return Ok(Probe::Done);
                        }
                        return Err(err);
                    }
                };
                Ok(match state {
                    Some(NatGatewayState::Deleted) | None => Probe::Done,
                    Some(NatGatewayState::Failed) => {
                        Probe::Failed("gateway entered failed state".to_string())
                    }
                    _ => Probe::Pending,
                })
            },
        )
        .await?;
        match outcome {
            WaitOutcome::TimedOut => {
                warn!(gateway = %self.gateway_id, "deletion still in progress after wait budget");
            }
            WaitOutcome::Failed(reason) => {
                warn!(gateway = %self.gateway_id, reason = %reason, "deletion did not complete");
            }
            WaitOutcome::Completed => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Resource for NatGateway {
    fn arn(&self) -> &str {
        &self.arn
    }

    fn resource_type(&self) -> &'static str {
        "nat-gateway"
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn can_delete(&self) -> Eligibility {
        nat_gateway_eligibility(self.state.as_ref(), &self.routes)
    }

    async fn exists(&self) -> bool {
        match self.current_state().await {
            Ok(Some(NatGatewayState::Deleted)) | Ok(None) => false,
            Ok(Some(_)) => true,
            Err(err) => {
                if classify_anyhow_error(&err, self.resource_type(), &self.gateway_id)
                    .is_not_found()
                {
                    false
                } else {
                    warn!(gateway = %self.gateway_id, error = %err, "existence check failed, assuming present");
                    true
                }
            }
        }
    }

    /// Delete the routes targeting this gateway. Route entries are the one
    /// reference a NAT gateway deletion does not cascade to; left behind they
    /// turn into blackholes and keep `can_delete` refusing.
    async fn clean(&self, ctx: &ExecutionContext) -> Result<()> {
        for route in self.current_routes().await? {
            let operation = format!(
                "delete route {} in {} (targets {})",
                route.destination, route.route_table_id, self.gateway_id
            );
            if !confirm::should_proceed(ctx, &operation)? {
                continue;
            }
            let mut request = self
                .client
                .delete_route()
                .route_table_id(&route.route_table_id);
            request = match &route.destination {
                RouteDestination::Cidr(cidr) => request.destination_cidr_block(cidr),
                RouteDestination::Ipv6Cidr(cidr) => request.destination_ipv6_cidr_block(cidr),
            };
            if let Err(err) = request.send().await {
                let classified = classify_sdk_error(&err, "route", &route.route_table_id);
                if classified.is_not_found() {
                    debug!(table = %route.route_table_id, "route already gone");
                    continue;
                }
                return Err(anyhow::Error::from(err).context(classified.to_string()));
            }
        }
        Ok(())
    }

    async fn remove(&self, ctx: &ExecutionContext) -> Result<RemoveOutcome> {
        // The clean stage just deleted the routes, so the snapshot captured
        // at discovery is stale; re-read them. A dry-run counts them as
        // cleared by its own clean stage.
        let routes = if ctx.dry_run {
            Vec::new()
        } else {
            self.current_routes().await?
        };
        if let Eligibility::Blocked(reason) = nat_gateway_eligibility(self.state.as_ref(), &routes)
        {
            warn!(gateway = %self.gateway_id, reason = %reason, "refusing to delete");
            return Ok(RemoveOutcome::Blocked(reason));
        }
        let outcome = execute_removal(ctx, self.resource_type(), &self.gateway_id, || async {
            self.client
                .delete_nat_gateway()
                .nat_gateway_id(&self.gateway_id)
                .send()
                .await
                .with_context(|| format!("Failed to delete NAT gateway {}", self.gateway_id))?;
            Ok(())
        })
        .await?;

        if outcome == RemoveOutcome::Removed {
            self.await_deletion().await?;
        }
        Ok(outcome)
    }
}

impl VpcResource for NatGateway {
    fn vpc_id(&self) -> &str {
        &self.vpc_id
    }

    fn kind(&self) -> VpcResourceKind {
        VpcResourceKind::NatGateway
    }

    fn resource_id(&self) -> &str {
        &self.gateway_id
    }
}
