//! Hub-side controller for spoke availability
//!
//! Watches the ManagedClusterAddOns created for our addon and keeps a
//! ResilientCluster record per spoke. The reconciler follows the usual
//! observe-diff-act loop and always re-reads state from the API server.
//! A second, record-side controller releases our finalizer on records that
//! outlive their addon.

mod addon;
#[cfg(test)]
mod fake;
mod filter;
mod record;
mod status;
mod watch;

pub use addon::{
    error_policy, reconcile, reconcile_addon, Context, ControllerConfig, KubeClient,
    KubeClientImpl, ObjectKey, ReconcileOutcome, DEFAULT_ERROR_REQUEUE,
};
pub use filter::{OwnershipFilter, ResourceEvent};
pub use record::{reconcile_record, reconcile_resilient_cluster, record_error_policy, RecordOutcome};
pub use status::{AvailableConditionDeriver, StatusDeriver};
pub use watch::{addon_triggers, admitted_triggers, EventClassifier};
