//! Watch-stream adapter feeding the controller runtime
//!
//! Raw watcher events only carry the latest object. Before an event is
//! applied to the reflector store, [`EventClassifier`] looks up the version
//! the store still holds, so updates can be filtered on both their old and
//! new state. The store is the only cache; it is pruned by the watcher's
//! re-list like any other reflector. Admitted objects are handed to the
//! controller as triggers and are never used as reconciliation input.

use futures::{stream, Stream, StreamExt, TryStreamExt};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource};
use tracing::debug;

use super::filter::{OwnershipFilter, ResourceEvent};
use crate::crd::ManagedClusterAddOn;

/// Turns watcher events into create/update/delete events
pub struct EventClassifier<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    store: Store<K>,
}

impl<K> EventClassifier<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    /// Classifier reading previous versions from `store`
    pub fn new(store: Store<K>) -> Self {
        Self { store }
    }

    /// Classify one watcher event
    ///
    /// Must be called before the event is applied to the store. Re-list
    /// markers produce no events; objects seen again during a re-list are
    /// reported as updates against the version held before the re-list.
    pub fn classify(&self, event: &watcher::Event<K>) -> Option<ResourceEvent<K>> {
        match event {
            watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
                match self.store.get(&ObjectRef::from_obj(obj)) {
                    Some(old) => Some(ResourceEvent::Updated {
                        old: old.as_ref().clone(),
                        new: obj.clone(),
                    }),
                    None => Some(ResourceEvent::Created(obj.clone())),
                }
            }
            watcher::Event::Delete(obj) => Some(ResourceEvent::Deleted(obj.clone())),
            watcher::Event::Init | watcher::Event::InitDone => None,
        }
    }
}

/// Reflect `events` into `writer` and yield the objects admitted by `filter`
///
/// Every event reaches the store, admitted or not, so the store backing the
/// controller stays complete.
pub fn admitted_triggers<K, S>(
    events: S,
    mut writer: reflector::store::Writer<K>,
    filter: OwnershipFilter,
) -> impl Stream<Item = Result<K, watcher::Error>> + Send + 'static
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
{
    let classifier = EventClassifier::new(writer.as_reader());

    events
        .map_ok(move |event| {
            let classified = classifier.classify(&event);
            writer.apply_watcher_event(&event);

            let admitted = classified
                .filter(|event| {
                    let admitted = filter.admits_event(event);
                    if !admitted {
                        debug!("ignoring event for addon not owned by us");
                    }
                    admitted
                })
                .map(|event| Ok::<_, watcher::Error>(event.into_object()));
            stream::iter(admitted)
        })
        .try_flatten()
        .boxed()
}

/// Build the trigger stream and store for the ManagedClusterAddOn controller
///
/// Only events admitted by `filter` produce a trigger.
pub fn addon_triggers(
    api: Api<ManagedClusterAddOn>,
    config: watcher::Config,
    filter: OwnershipFilter,
) -> (
    Store<ManagedClusterAddOn>,
    impl Stream<Item = Result<ManagedClusterAddOn, watcher::Error>> + Send + 'static,
) {
    let (reader, writer) = reflector::store();
    let events = watcher(api, config).default_backoff();
    (reader, admitted_triggers(events, writer, filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ManagedClusterAddOnSpec;
    use crate::{ADDON_NAME, ADDON_OWNER_KIND};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    fn addon(namespace: &str, resource_version: &str) -> ManagedClusterAddOn {
        let mut addon = ManagedClusterAddOn::new(ADDON_NAME, ManagedClusterAddOnSpec::default());
        addon.metadata.namespace = Some(namespace.to_string());
        addon.metadata.resource_version = Some(resource_version.to_string());
        addon
    }

    fn owned_by(mut addon: ManagedClusterAddOn, owner: &str) -> ManagedClusterAddOn {
        addon.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "addon.open-cluster-management.io/v1alpha1".to_string(),
            kind: ADDON_OWNER_KIND.to_string(),
            name: owner.to_string(),
            uid: format!("{owner}-uid"),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]);
        addon
    }

    fn ours(namespace: &str, resource_version: &str) -> ManagedClusterAddOn {
        owned_by(addon(namespace, resource_version), ADDON_NAME)
    }

    fn foreign(namespace: &str, resource_version: &str) -> ManagedClusterAddOn {
        owned_by(addon(namespace, resource_version), "some-other-addon")
    }

    /// Drive `events` through the adapter; returns the triggers and the store
    async fn run(
        events: Vec<watcher::Event<ManagedClusterAddOn>>,
    ) -> (Vec<ManagedClusterAddOn>, Store<ManagedClusterAddOn>) {
        let (reader, writer) = reflector::store();
        let events = stream::iter(events.into_iter().map(Ok::<_, watcher::Error>));
        let triggers = admitted_triggers(events, writer, OwnershipFilter::default())
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        (triggers, reader)
    }

    fn namespaces(triggers: &[ManagedClusterAddOn]) -> Vec<String> {
        triggers
            .iter()
            .map(|a| a.metadata.namespace.clone().unwrap())
            .collect()
    }

    mod classification {
        use super::*;

        #[test]
        fn test_first_sighting_is_a_create() {
            let (reader, _writer) = reflector::store();
            let classifier = EventClassifier::new(reader);
            let event = classifier.classify(&watcher::Event::Apply(addon("spoke-1", "1")));
            assert!(matches!(event, Some(ResourceEvent::Created(_))));
        }

        #[test]
        fn test_second_sighting_carries_stored_version() {
            let (reader, mut writer) = reflector::store();
            let classifier = EventClassifier::new(reader);
            writer.apply_watcher_event(&watcher::Event::Apply(addon("spoke-1", "1")));

            match classifier.classify(&watcher::Event::Apply(addon("spoke-1", "2"))) {
                Some(ResourceEvent::Updated { old, new }) => {
                    assert_eq!(old.metadata.resource_version.as_deref(), Some("1"));
                    assert_eq!(new.metadata.resource_version.as_deref(), Some("2"));
                }
                other => panic!("expected update, got {other:?}"),
            }
        }

        #[test]
        fn test_objects_are_keyed_per_namespace() {
            let (reader, mut writer) = reflector::store();
            let classifier = EventClassifier::new(reader);
            writer.apply_watcher_event(&watcher::Event::Apply(addon("spoke-1", "1")));

            let event = classifier.classify(&watcher::Event::Apply(addon("spoke-2", "1")));
            assert!(matches!(event, Some(ResourceEvent::Created(_))));
        }

        #[test]
        fn test_relist_markers_produce_no_events() {
            let (reader, _writer) = reflector::store::<ManagedClusterAddOn>();
            let classifier = EventClassifier::new(reader);
            assert!(classifier.classify(&watcher::Event::Init).is_none());
            assert!(classifier.classify(&watcher::Event::InitDone).is_none());
        }
    }

    mod triggers {
        use super::*;

        #[tokio::test]
        async fn test_only_owned_addons_trigger() {
            let (triggers, reader) = run(vec![
                watcher::Event::Apply(ours("spoke-1", "1")),
                watcher::Event::Apply(foreign("spoke-2", "1")),
                watcher::Event::Apply(addon("spoke-3", "1")),
            ])
            .await;

            assert_eq!(namespaces(&triggers), vec!["spoke-1"]);
            // the store still sees everything the controller may look up
            assert_eq!(reader.state().len(), 3);
        }

        /// Story: an addon changes hands. Neither the hand-over to us nor the
        /// hand-over away from us triggers a reconciliation; a later update
        /// with both versions ours does.
        #[tokio::test]
        async fn story_ownership_change_is_never_acted_on() {
            let (triggers, _reader) = run(vec![
                watcher::Event::Apply(foreign("spoke-1", "1")),
                watcher::Event::Apply(ours("spoke-1", "2")),
                watcher::Event::Apply(ours("spoke-1", "3")),
                watcher::Event::Apply(foreign("spoke-1", "4")),
            ])
            .await;

            assert_eq!(triggers.len(), 1);
            assert_eq!(
                triggers[0].metadata.resource_version.as_deref(),
                Some("3")
            );
        }

        #[tokio::test]
        async fn test_deleting_owned_addon_triggers() {
            let (triggers, reader) = run(vec![
                watcher::Event::Apply(ours("spoke-1", "1")),
                watcher::Event::Delete(ours("spoke-1", "2")),
                watcher::Event::Delete(foreign("spoke-2", "2")),
            ])
            .await;

            assert_eq!(namespaces(&triggers), vec!["spoke-1", "spoke-1"]);
            assert!(reader.state().is_empty());
        }

        /// Story: the watch reconnects after many addons were removed while
        /// it was down. The re-list holds a single live addon and nothing is
        /// remembered about the removed ones afterwards.
        #[tokio::test]
        async fn story_relist_forgets_objects_removed_while_disconnected() {
            let mut events: Vec<_> = (0..100)
                .map(|i| watcher::Event::Apply(foreign(&format!("gone-{i}"), "1")))
                .collect();
            events.push(watcher::Event::Apply(ours("spoke-1", "1")));
            events.extend([
                watcher::Event::Init,
                watcher::Event::InitApply(ours("spoke-1", "2")),
                watcher::Event::InitDone,
            ]);

            let (triggers, reader) = run(events).await;

            assert_eq!(reader.state().len(), 1);
            assert_eq!(
                reader
                    .get(&ObjectRef::from_obj(&ours("spoke-1", "2")))
                    .and_then(|a| a.metadata.resource_version.clone())
                    .as_deref(),
                Some("2")
            );
            // initial sighting plus the re-listed update of the same addon
            assert_eq!(namespaces(&triggers), vec!["spoke-1", "spoke-1"]);
        }

        #[tokio::test]
        async fn test_relisted_object_is_compared_with_pre_relist_version() {
            let (triggers, _reader) = run(vec![
                watcher::Event::Apply(foreign("spoke-1", "1")),
                watcher::Event::Init,
                watcher::Event::InitApply(ours("spoke-1", "2")),
                watcher::Event::InitDone,
            ])
            .await;

            // old version was not ours, so the re-listed update is dropped
            assert!(triggers.is_empty());
        }
    }
}
