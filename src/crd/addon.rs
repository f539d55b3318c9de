//! External resource types consumed by the addon
//!
//! None of these CRDs are installed by us. `ManagedClusterAddOn` is modelled
//! with the fields we read; `AddOnDeploymentConfig` and hive's
//! `ClusterDeployment` are handled as `DynamicObject`s so that relocating
//! them never drops fields we don't model.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::api::{ApiResource, GroupVersionKind};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type signalling the addon agent is healthy on its spoke
pub const AVAILABLE_CONDITION: &str = "Available";

/// Specification of a ManagedClusterAddOn (the fields we read)
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "addon.open-cluster-management.io",
    version = "v1alpha1",
    kind = "ManagedClusterAddOn",
    plural = "managedclusteraddons",
    status = "ManagedClusterAddOnStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnSpec {
    /// Namespace on the spoke where the addon agent is installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_namespace: Option<String>,
}

/// Status of a ManagedClusterAddOn (the fields we read)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ManagedClusterAddOnStatus {
    /// Conditions reported by the addon framework
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ManagedClusterAddOn {
    /// True if the addon is being deleted
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Status string ("True", "False", "Unknown") of the condition of the given type
    pub fn condition_status(&self, type_: &str) -> Option<&str> {
        self.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.type_ == type_)
            .map(|c| c.status.as_str())
    }
}

/// API resource for `AddOnDeploymentConfig` (addon.open-cluster-management.io/v1alpha1)
pub fn addon_deployment_config_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(
            "addon.open-cluster-management.io",
            "v1alpha1",
            "AddOnDeploymentConfig",
        ),
        "addondeploymentconfigs",
    )
}

/// API resource for hive's `ClusterDeployment` (hive.openshift.io/v1)
pub fn cluster_deployment_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("hive.openshift.io", "v1", "ClusterDeployment"),
        "clusterdeployments",
    )
}
