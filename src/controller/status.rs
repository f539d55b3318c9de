//! Availability derivation from addon health
//!
//! [`StatusDeriver`] is the seam for richer scoring of a spoke's health. The
//! reconciler only ever sees the trait object held by its context.

use crate::crd::{Availability, ClusterStatus, ManagedClusterAddOn, AVAILABLE_CONDITION};

/// Maps an addon health signal to an availability observation
pub trait StatusDeriver: Send + Sync {
    /// Derive the spoke's current status from its addon
    fn derive(&self, addon: &ManagedClusterAddOn) -> ClusterStatus;
}

/// Default deriver: available iff the addon's `Available` condition is `True`
///
/// A `False`, `Unknown` or missing condition all count as not available.
#[derive(Clone, Copy, Debug, Default)]
pub struct AvailableConditionDeriver;

impl StatusDeriver for AvailableConditionDeriver {
    fn derive(&self, addon: &ManagedClusterAddOn) -> ClusterStatus {
        let availability = match addon.condition_status(AVAILABLE_CONDITION) {
            Some("True") => Availability::Available,
            _ => Availability::NotAvailable,
        };
        ClusterStatus::observed_now(availability)
    }
}
