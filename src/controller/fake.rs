//! In-memory API server stand-in for controller tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;

use super::addon::KubeClient;
use crate::crd::{ManagedClusterAddOn, ResilientCluster, ResilientClusterStatus};
use crate::error::api_error;
use crate::Error;

/// In-memory store for walking through whole lifecycles.
///
/// Deleting a record that carries finalizers only marks it deleting, and
/// releasing the last finalizer removes it, mirroring the API server.
#[derive(Default)]
pub(crate) struct FakeCluster {
    addons: Mutex<HashMap<String, ManagedClusterAddOn>>,
    records: Mutex<HashMap<String, ResilientCluster>>,
    deletes: Mutex<u32>,
}

impl FakeCluster {
    pub(crate) fn put_addon(&self, addon: ManagedClusterAddOn) {
        self.addons.lock().unwrap().insert(addon.name_any(), addon);
    }

    pub(crate) fn remove_addon(&self, name: &str) {
        self.addons.lock().unwrap().remove(name);
    }

    pub(crate) fn record(&self, name: &str) -> Option<ResilientCluster> {
        self.records.lock().unwrap().get(name).cloned()
    }

    pub(crate) fn record_status(&self, name: &str) -> ResilientClusterStatus {
        self.record(name).unwrap().status.unwrap()
    }

    pub(crate) fn delete_calls(&self) -> u32 {
        *self.deletes.lock().unwrap()
    }

    /// Owner-reference garbage collection: mark the record deleting
    pub(crate) fn collect_record(&self, name: &str) {
        if let Some(stored) = self.records.lock().unwrap().get_mut(name) {
            stored.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        }
    }
}

#[async_trait]
impl KubeClient for FakeCluster {
    async fn get_addon(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedClusterAddOn>, Error> {
        Ok(self.addons.lock().unwrap().get(name).cloned())
    }

    async fn get_resilient_cluster(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<ResilientCluster>, Error> {
        Ok(self.record(name))
    }

    async fn create_resilient_cluster(&self, record: &ResilientCluster) -> Result<(), Error> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.name_any()) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let mut stored = record.clone();
        stored.metadata.resource_version = Some("1".to_string());
        records.insert(record.name_any(), stored);
        Ok(())
    }

    async fn update_resilient_cluster_status(
        &self,
        record: &ResilientCluster,
        status: &ResilientClusterStatus,
    ) -> Result<(), Error> {
        let mut records = self.records.lock().unwrap();
        let stored = records
            .get_mut(&record.name_any())
            .ok_or_else(|| api_error(404, "NotFound"))?;
        if stored.metadata.resource_version != record.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }
        let version: u64 = stored
            .metadata
            .resource_version
            .as_deref()
            .unwrap_or("0")
            .parse()
            .unwrap();
        stored.metadata.resource_version = Some((version + 1).to_string());
        stored.status = Some(status.clone());
        Ok(())
    }

    async fn delete_resilient_cluster(&self, _namespace: &str, name: &str) -> Result<(), Error> {
        *self.deletes.lock().unwrap() += 1;
        let mut records = self.records.lock().unwrap();
        if let Some(stored) = records.get_mut(name) {
            if stored.finalizers().is_empty() {
                records.remove(name);
            } else {
                stored.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            }
        }
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        record: &ResilientCluster,
        finalizer: &str,
    ) -> Result<(), Error> {
        let mut records = self.records.lock().unwrap();
        let name = record.name_any();
        let Some(stored) = records.get_mut(&name) else {
            return Ok(());
        };
        stored.finalizers_mut().retain(|f| f != finalizer);
        if stored.finalizers().is_empty() && stored.metadata.deletion_timestamp.is_some() {
            records.remove(&name);
        }
        Ok(())
    }
}

