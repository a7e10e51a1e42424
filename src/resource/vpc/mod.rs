//! VPC network resources
//!
//! VPC teardown is ordering-sensitive: network interfaces and endpoints go
//! before NAT gateways and subnets, security groups last. Each resource kind
//! carries a teardown priority, per-type eligibility rules are pure functions
//! over described state, and cross-resource dependencies live in an external
//! [`graph::DependencyGraph`].

pub mod collection;
pub mod endpoint;
pub mod graph;
pub mod nat_gateway;
pub mod network_interface;
pub mod security_group;
pub mod subnet;

use crate::resource::Resource;
use std::fmt;

/// Kinds of resource that live inside a VPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VpcResourceKind {
    NetworkInterface,
    VpcEndpoint,
    NatGateway,
    ElasticIp,
    PeeringConnection,
    InternetGateway,
    Subnet,
    RouteTable,
    NetworkAcl,
    SecurityGroup,
}

impl VpcResourceKind {
    /// Teardown order: leaves first. Network interfaces unblock almost
    /// everything else; security groups can only go once nothing references
    /// them.
    pub fn teardown_priority(self) -> u8 {
        match self {
            VpcResourceKind::NetworkInterface => 0,
            VpcResourceKind::VpcEndpoint => 1,
            VpcResourceKind::NatGateway => 2,
            VpcResourceKind::ElasticIp | VpcResourceKind::PeeringConnection => 3,
            VpcResourceKind::InternetGateway => 4,
            VpcResourceKind::Subnet => 5,
            VpcResourceKind::RouteTable | VpcResourceKind::NetworkAcl => 6,
            VpcResourceKind::SecurityGroup => 7,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VpcResourceKind::NetworkInterface => "network-interface",
            VpcResourceKind::VpcEndpoint => "vpc-endpoint",
            VpcResourceKind::NatGateway => "nat-gateway",
            VpcResourceKind::ElasticIp => "elastic-ip",
            VpcResourceKind::PeeringConnection => "vpc-peering-connection",
            VpcResourceKind::InternetGateway => "internet-gateway",
            VpcResourceKind::Subnet => "subnet",
            VpcResourceKind::RouteTable => "route-table",
            VpcResourceKind::NetworkAcl => "network-acl",
            VpcResourceKind::SecurityGroup => "security-group",
        }
    }
}

impl fmt::Display for VpcResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A resource scoped to a VPC. Accessors are synchronous; all state they
/// report was captured at discovery time.
pub trait VpcResource: Resource {
    fn vpc_id(&self) -> &str;

    fn kind(&self) -> VpcResourceKind;

    /// Provider id, e.g. `subnet-0abc` or `eni-0abc`.
    fn resource_id(&self) -> &str;

    fn vpc_resource_id(&self) -> graph::VpcResourceId {
        graph::VpcResourceId::new(self.kind(), self.resource_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interfaces_go_before_subnets_before_security_groups() {
        assert!(
            VpcResourceKind::NetworkInterface.teardown_priority()
                < VpcResourceKind::NatGateway.teardown_priority()
        );
        assert!(
            VpcResourceKind::NatGateway.teardown_priority()
                < VpcResourceKind::Subnet.teardown_priority()
        );
        assert!(
            VpcResourceKind::Subnet.teardown_priority()
                < VpcResourceKind::SecurityGroup.teardown_priority()
        );
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(VpcResourceKind::NetworkInterface.label(), "network-interface");
        assert_eq!(VpcResourceKind::SecurityGroup.to_string(), "security-group");
    }
}
