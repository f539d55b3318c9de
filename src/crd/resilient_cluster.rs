//! ResilientCluster Custom Resource Definition
//!
//! One ResilientCluster exists per spoke that has the addon installed. It
//! lives next to its ManagedClusterAddOn (same namespace and name), is owned
//! by it, and records the spoke's availability history.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ClusterStatus;

/// Specification for a ResilientCluster
///
/// The record is entirely controller-managed; all state lives in the status.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "appeng.ecosystem.redhat.com",
    version = "v1",
    kind = "ResilientCluster",
    plural = "resilientclusters",
    shortname = "rc",
    status = "ResilientClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Initial","type":"string","jsonPath":".status.initialStatus.availability"}"#,
    printcolumn = r#"{"name":"Previous","type":"string","jsonPath":".status.previousStatus.availability"}"#,
    printcolumn = r#"{"name":"Current","type":"string","jsonPath":".status.currentStatus.availability"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct ResilientClusterSpec {}

/// Availability history of a spoke
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResilientClusterStatus {
    /// Observation recorded when the record was created; never changes afterwards
    pub initial_status: ClusterStatus,

    /// Current status as it was before the latest update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<ClusterStatus>,

    /// Latest observation
    pub current_status: ClusterStatus,
}

impl ResilientClusterStatus {
    /// Status of a freshly created record: initial and current are the same observation
    pub fn initial(status: ClusterStatus) -> Self {
        Self {
            initial_status: status.clone(),
            previous_status: None,
            current_status: status,
        }
    }

    /// Status after recording a new observation
    ///
    /// The current observation moves to `previous_status`; the initial one is kept.
    pub fn advance(&self, observed: ClusterStatus) -> Self {
        Self {
            initial_status: self.initial_status.clone(),
            previous_status: Some(self.current_status.clone()),
            current_status: observed,
        }
    }
}

impl ResilientCluster {
    /// True if the API server has marked this record for deletion
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// True if this record still carries the given finalizer
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }
}
