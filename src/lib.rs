//! Multicluster Resiliency Addon - hub-side resiliency tracking for managed spokes
//!
//! The addon runs on a hub cluster next to the open-cluster-management addon
//! framework. For every spoke that has the addon installed it keeps a durable
//! `ResilientCluster` record of the spoke's availability, and when a spoke is
//! replaced it relocates the per-cluster resources that still point at the
//! old spoke.
//!
//! # Architecture
//!
//! ```text
//! ManagedClusterAddOn events
//!   -> ownership filter (ours only)
//!   -> addon lifecycle reconciler -> status deriver
//!   -> ResilientCluster create / update / delete
//!
//! migration trigger {old, new}
//!   -> migration runner -> each registered action, in order
//!   -> aggregated report
//! ```
//!
//! # Modules
//!
//! - [`crd`] - `ResilientCluster` plus the external open-cluster-management and hive types
//! - [`controller`] - Addon lifecycle reconciler, ownership filter, status deriver
//! - [`migration`] - Spoke replacement action registry and runner
//! - [`cancel`] - Cancellation helper shared by all entry points
//! - [`error`] - Error types and their classification

#![deny(missing_docs)]

pub mod cancel;
pub mod controller;
pub mod crd;
pub mod error;
pub mod migration;

pub use error::{Error, ErrorKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Addon identity
// =============================================================================

/// Name of this addon, as registered with the addon framework
pub const ADDON_NAME: &str = "multicluster-resiliency-addon";

/// Kind of the framework object that owns every ManagedClusterAddOn of ours
pub const ADDON_OWNER_KIND: &str = "ClusterManagementAddOn";

/// Finalizer placed on every ResilientCluster we create
pub const RESILIENT_CLUSTER_FINALIZER: &str =
    "appeng.ecosystem.redhat.com/resilientcluster-finalizer";

/// Field manager used for server-side apply and patches
pub const FIELD_MANAGER: &str = "mcra-controller";
