//! Ownership-scoped event filtering
//!
//! Every ManagedClusterAddOn created by the addon framework for our addon is
//! owned by the `ClusterManagementAddOn` named after the addon. Events for
//! any other addon never reach the reconciler.

use kube::{Resource, ResourceExt};

use crate::{ADDON_NAME, ADDON_OWNER_KIND};

/// A watch event, as seen by the filter
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceEvent<K> {
    /// First sighting of the object
    Created(K),
    /// The object changed; both versions are carried
    Updated {
        /// Last version seen before this event
        old: K,
        /// Version carried by this event
        new: K,
    },
    /// The object is gone
    Deleted(K),
    /// Any other trigger for the object
    Generic(K),
}

impl<K> ResourceEvent<K> {
    /// The object a reconciliation should be triggered for
    pub fn into_object(self) -> K {
        match self {
            Self::Created(obj) | Self::Deleted(obj) | Self::Generic(obj) => obj,
            Self::Updated { new, .. } => new,
        }
    }
}

/// Admits only objects owned by a fixed (kind, name) owner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipFilter {
    kind: String,
    name: String,
}

impl Default for OwnershipFilter {
    fn default() -> Self {
        Self::new(ADDON_OWNER_KIND, ADDON_NAME)
    }
}

impl OwnershipFilter {
    /// Filter for objects owned by `kind`/`name`
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// True iff one of the object's owner references matches exactly
    pub fn admits<K: Resource>(&self, obj: &K) -> bool {
        obj.owner_references()
            .iter()
            .any(|owner| owner.kind == self.kind && owner.name == self.name)
    }

    /// Apply the filter to an event
    ///
    /// Updates pass only when both the old and the new object are owned, so
    /// an object changing hands is never acted on mid-transition.
    pub fn admits_event<K: Resource>(&self, event: &ResourceEvent<K>) -> bool {
        match event {
            ResourceEvent::Created(obj)
            | ResourceEvent::Deleted(obj)
            | ResourceEvent::Generic(obj) => self.admits(obj),
            ResourceEvent::Updated { old, new } => self.admits(old) && self.admits(new),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ManagedClusterAddOn, ManagedClusterAddOnSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    fn owner(kind: &str, name: &str) -> OwnerReference {
        OwnerReference {
            api_version: "addon.open-cluster-management.io/v1alpha1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: "owner-uid".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn addon_owned_by(owners: Vec<OwnerReference>) -> ManagedClusterAddOn {
        let mut addon = ManagedClusterAddOn::new(ADDON_NAME, ManagedClusterAddOnSpec::default());
        addon.metadata.namespace = Some("spoke-1".to_string());
        addon.metadata.owner_references = Some(owners);
        addon
    }

    fn ours() -> ManagedClusterAddOn {
        addon_owned_by(vec![owner(ADDON_OWNER_KIND, ADDON_NAME)])
    }

    fn foreign() -> ManagedClusterAddOn {
        addon_owned_by(vec![owner(ADDON_OWNER_KIND, "some-other-addon")])
    }

    #[test]
    fn test_admits_object_owned_by_our_addon() {
        assert!(OwnershipFilter::default().admits(&ours()));
    }

    #[test]
    fn test_admits_when_any_owner_matches() {
        let addon = addon_owned_by(vec![
            owner("ManagedCluster", "spoke-1"),
            owner(ADDON_OWNER_KIND, ADDON_NAME),
        ]);
        assert!(OwnershipFilter::default().admits(&addon));
    }

    #[test]
    fn test_rejects_objects_without_exact_owner() {
        let filter = OwnershipFilter::default();

        assert!(!filter.admits(&addon_owned_by(vec![])));
        assert!(!filter.admits(&foreign()));
        // right name, wrong kind
        assert!(!filter.admits(&addon_owned_by(vec![owner("ManagedCluster", ADDON_NAME)])));

        let mut unowned = ours();
        unowned.metadata.owner_references = None;
        assert!(!filter.admits(&unowned));
    }

    #[test]
    fn test_single_object_events_check_their_object() {
        let filter = OwnershipFilter::default();

        assert!(filter.admits_event(&ResourceEvent::Created(ours())));
        assert!(filter.admits_event(&ResourceEvent::Deleted(ours())));
        assert!(filter.admits_event(&ResourceEvent::Generic(ours())));
        assert!(!filter.admits_event(&ResourceEvent::Created(foreign())));
        assert!(!filter.admits_event(&ResourceEvent::Deleted(foreign())));
        assert!(!filter.admits_event(&ResourceEvent::Generic(foreign())));
    }

    #[test]
    fn test_update_requires_both_versions_owned() {
        let filter = OwnershipFilter::default();

        assert!(filter.admits_event(&ResourceEvent::Updated {
            old: ours(),
            new: ours()
        }));
        assert!(!filter.admits_event(&ResourceEvent::Updated {
            old: foreign(),
            new: ours()
        }));
        assert!(!filter.admits_event(&ResourceEvent::Updated {
            old: ours(),
            new: foreign()
        }));
        assert!(!filter.admits_event(&ResourceEvent::Updated {
            old: foreign(),
            new: foreign()
        }));
    }

    #[test]
    fn test_custom_owner_identity() {
        let filter = OwnershipFilter::new(ADDON_OWNER_KIND, "some-other-addon");
        assert!(filter.admits(&foreign()));
        assert!(!filter.admits(&ours()));
    }

    #[test]
    fn test_update_event_triggers_for_new_version() {
        let mut new = ours();
        new.metadata.resource_version = Some("2".to_string());
        let event = ResourceEvent::Updated { old: ours(), new };
        assert_eq!(
            event.into_object().metadata.resource_version.as_deref(),
            Some("2")
        );
    }
}
