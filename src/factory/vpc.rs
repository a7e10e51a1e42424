//! VPC discovery
//!
//! Enumerates every supported resource type inside one VPC, builds the
//! collection, and wires the dependency graph from live topology: a subnet
//! depends on the interfaces and NAT gateways located in it, a security
//! group on the interfaces attached to it.

use crate::aws::AwsContext;
use crate::resource::vpc::collection::VpcResourceCollection;
use crate::resource::vpc::endpoint::VpcEndpoint;
use crate::resource::vpc::graph::VpcResourceId;
use crate::resource::vpc::nat_gateway::{routes_through_gateway, NatGateway};
use crate::resource::vpc::network_interface::NetworkInterface;
use crate::resource::vpc::security_group::SecurityGroup;
use crate::resource::vpc::subnet::Subnet;
use crate::resource::vpc::{VpcResource, VpcResourceKind};
use anyhow::{Context, Result};
use aws_sdk_ec2::types::Filter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Instance states that keep a subnet occupied.
const OCCUPYING_INSTANCE_STATES: &[&str] = &["pending", "running", "stopping", "stopped"];

pub struct VpcFactory {
    aws: AwsContext,
    account: String,
}

impl VpcFactory {
    pub fn new(aws: AwsContext, account: impl Into<String>) -> Self {
        Self {
            aws,
            account: account.into(),
        }
    }

    /// Enumerate the VPC and build the collection plus dependency graph.
    pub async fn discover(&self, vpc_id: &str) -> Result<VpcResourceCollection> {
        let client = self.aws.ec2_client();
        let vpc_filter = Filter::builder().name("vpc-id").values(vpc_id).build();

        let instances = self.describe_instances(&client, &vpc_filter).await?;
        let subnets = self.describe_subnets(&client, &vpc_filter).await?;
        let groups = self.describe_security_groups(&client, &vpc_filter).await?;
        let interfaces = self.describe_network_interfaces(&client, &vpc_filter).await?;
        let gateways = self.describe_nat_gateways(&client, vpc_id).await?;
        let endpoints = self.describe_endpoints(&client, &vpc_filter).await?;
        let route_tables = self.describe_route_tables(&client, &vpc_filter).await?;

        // instance id -> state, and per-subnet occupancy
        let mut instance_states: HashMap<String, String> = HashMap::new();
        let mut occupied_subnets: HashMap<String, usize> = HashMap::new();
        for instance in &instances {
            let state = instance
                .state()
                .and_then(|s| s.name())
                .map(|n| n.as_str().to_string())
                .unwrap_or_default();
            if let Some(id) = instance.instance_id() {
                instance_states.insert(id.to_string(), state.clone());
            }
            if OCCUPYING_INSTANCE_STATES.contains(&state.as_str()) {
                if let Some(subnet) = instance.subnet_id() {
                    *occupied_subnets.entry(subnet.to_string()).or_default() += 1;
                }
            }
        }

        let mut collection = VpcResourceCollection::new(vpc_id);

        let mut built_interfaces: Vec<Arc<NetworkInterface>> = Vec::new();
        for described in &interfaces {
            let instance_state = described
                .attachment()
                .and_then(|a| a.instance_id())
                .and_then(|id| instance_states.get(id))
                .cloned();
            built_interfaces.push(Arc::new(NetworkInterface::from_described(
                &self.aws,
                &self.account,
                described,
                instance_state,
            )?));
        }

        for described in &endpoints {
            collection.push(Arc::new(VpcEndpoint::from_described(
                &self.aws,
                &self.account,
                described,
            )?));
        }

        let mut built_gateways: Vec<Arc<NatGateway>> = Vec::new();
        for described in &gateways {
            let routes = described
                .nat_gateway_id()
                .map(|id| routes_through_gateway(id, &route_tables))
                .unwrap_or_default();
            built_gateways.push(Arc::new(NatGateway::from_described(
                &self.aws,
                &self.account,
                described,
                routes,
            )?));
        }

        for described in &subnets {
            let occupancy = described
                .subnet_id()
                .and_then(|id| occupied_subnets.get(id))
                .copied()
                .unwrap_or(0);
            collection.push(Arc::new(Subnet::from_described(
                &self.aws,
                &self.account,
                described,
                occupancy,
            )?));
        }

        for described in &groups {
            collection.push(Arc::new(SecurityGroup::from_described(
                &self.aws,
                &self.account,
                described,
                &groups,
            )?));
        }

        // Graph edges from live topology.
        for interface in &built_interfaces {
            let interface_id = interface.vpc_resource_id();
            if let Some(subnet_id) = interface.subnet_id() {
                collection.add_dependency(
                    VpcResourceId::new(VpcResourceKind::Subnet, subnet_id),
                    interface_id.clone(),
                );
            }
            for group_id in interface.attached_group_ids() {
                collection.add_dependency(
                    VpcResourceId::new(VpcResourceKind::SecurityGroup, group_id),
                    interface_id.clone(),
                );
            }
        }
        for gateway in &built_gateways {
            if let Some(subnet_id) = gateway.subnet_id() {
                collection.add_dependency(
                    VpcResourceId::new(VpcResourceKind::Subnet, subnet_id),
                    gateway.vpc_resource_id(),
                );
            }
        }

        for interface in built_interfaces {
            collection.push(interface);
        }
        for gateway in built_gateways {
            collection.push(gateway);
        }

        info!(
            vpc = %vpc_id,
            resources = collection.len(),
            edges = collection.graph().edge_count(),
            "discovered VPC topology"
        );
        Ok(collection)
    }

    async fn describe_instances(
        &self,
        client: &aws_sdk_ec2::Client,
        vpc_filter: &Filter,
    ) -> Result<Vec<aws_sdk_ec2::types::Instance>> {
        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = client
                .describe_instances()
                .filters(vpc_filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to describe instances")?;
            instances.extend(
                page.reservations()
                    .iter()
                    .flat_map(|r| r.instances())
                    .cloned(),
            );
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        Ok(instances)
    }

    async fn describe_subnets(
        &self,
        client: &aws_sdk_ec2::Client,
        vpc_filter: &Filter,
    ) -> Result<Vec<aws_sdk_ec2::types::Subnet>> {
        let mut subnets = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = client
                .describe_subnets()
                .filters(vpc_filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to describe subnets")?;
            subnets.extend(page.subnets().iter().cloned());
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        Ok(subnets)
    }

    async fn describe_security_groups(
        &self,
        client: &aws_sdk_ec2::Client,
        vpc_filter: &Filter,
    ) -> Result<Vec<aws_sdk_ec2::types::SecurityGroup>> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = client
                .describe_security_groups()
                .filters(vpc_filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to describe security groups")?;
            groups.extend(page.security_groups().iter().cloned());
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        Ok(groups)
    }

    async fn describe_network_interfaces(
        &self,
        client: &aws_sdk_ec2::Client,
        vpc_filter: &Filter,
    ) -> Result<Vec<aws_sdk_ec2::types::NetworkInterface>> {
        let mut interfaces = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = client
                .describe_network_interfaces()
                .filters(vpc_filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to describe network interfaces")?;
            interfaces.extend(page.network_interfaces().iter().cloned());
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        Ok(interfaces)
    }

    async fn describe_nat_gateways(
        &self,
        client: &aws_sdk_ec2::Client,
        vpc_id: &str,
    ) -> Result<Vec<aws_sdk_ec2::types::NatGateway>> {
        let mut gateways = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = client
                .describe_nat_gateways()
                .filter(Filter::builder().name("vpc-id").values(vpc_id).build())
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to describe NAT gateways")?;
            gateways.extend(page.nat_gateways().iter().cloned());
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        Ok(gateways)
    }

    async fn describe_route_tables(
        &self,
        client: &aws_sdk_ec2::Client,
        vpc_filter: &Filter,
    ) -> Result<Vec<aws_sdk_ec2::types::RouteTable>> {
        let mut tables = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = client
                .describe_route_tables()
                .filters(vpc_filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to describe route tables")?;
            tables.extend(page.route_tables().iter().cloned());
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        Ok(tables)
    }

    async fn describe_endpoints(
        &self,
        client: &aws_sdk_ec2::Client,
        vpc_filter: &Filter,
    ) -> Result<Vec<aws_sdk_ec2::types::VpcEndpoint>> {
        let mut endpoints = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = client
                .describe_vpc_endpoints()
                .filters(vpc_filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to describe VPC endpoints")?;
            endpoints.extend(page.vpc_endpoints().iter().cloned());
            next_token = page.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        Ok(endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn discovers_a_real_vpc() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let vpc_id = match std::env::var("SWEEPER_TEST_VPC_ID") {
            Ok(id) => id,
            Err(_) => return,
        };
        let factory = VpcFactory::new(aws, "000000000000");
        let collection = factory.discover(&vpc_id).await.unwrap();
        assert!(!collection.is_empty());
    }
}
