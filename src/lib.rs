//! aws-sweeper: remove AWS resources by name, id, ARN, tag filter, or list file.
//!
//! The interesting part lives in [`resource::vpc`]: a dependency-aware teardown
//! engine for VPC network resources (subnets, security groups, network
//! interfaces, NAT gateways, endpoints) that refuses to touch AWS-managed
//! defaults and cleans blocking references (routes, interface attachments,
//! security group rules, elastic IP associations) before deletion. The other
//! families wrap their service's delete API, emptying contents first where
//! the service demands it (bucket objects, repository images, table items).

pub mod arn;
pub mod aws;
pub mod confirm;
pub mod context;
pub mod factory;
pub mod input;
pub mod orchestrator;
pub mod resource;
pub mod tags;
pub mod wait;
