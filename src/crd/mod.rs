//! Custom Resource Definitions for the resiliency addon
//!
//! `ResilientCluster` is ours; the remaining types belong to the
//! open-cluster-management addon framework and to hive.

mod addon;
mod resilient_cluster;
mod types;

pub use addon::{
    addon_deployment_config_resource, cluster_deployment_resource, ManagedClusterAddOn,
    ManagedClusterAddOnSpec, ManagedClusterAddOnStatus, AVAILABLE_CONDITION,
};
pub use resilient_cluster::{ResilientCluster, ResilientClusterSpec, ResilientClusterStatus};
pub use types::{Availability, ClusterStatus};
