//! ManagedClusterAddOn lifecycle controller
//!
//! Keeps one ResilientCluster per ManagedClusterAddOn of ours in sync with
//! the addon's health. The reconciler is level-triggered: it is handed an
//! identity, re-reads the addon and the record, and converges the record.
//!
//! Record lifecycle:
//!
//! ```text
//! Absent --(addon alive)--> Active --(addon deleting)--> Deleting --(finalizer released)--> Absent
//!                           Active --(addon alive)--> Active   (previous <- current, current <- derived)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument};

#[cfg(test)]
use mockall::automock;

use super::status::{AvailableConditionDeriver, StatusDeriver};
use crate::cancel::run_cancellable;
use crate::crd::{
    Availability, ClusterStatus, ManagedClusterAddOn, ResilientCluster, ResilientClusterSpec,
    ResilientClusterStatus,
};
use crate::error::is_kube_not_found;
use crate::{Error, FIELD_MANAGER, RESILIENT_CLUSTER_FINALIZER};

use tokio_util::sync::CancellationToken;

/// Default delay before a failed reconciliation is retried
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Trait abstracting Kubernetes client operations for the addon controller
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production. Lookups map "not found" to `None`; every
/// other failure is returned as an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a ManagedClusterAddOn
    async fn get_addon(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedClusterAddOn>, Error>;

    /// Get a ResilientCluster
    async fn get_resilient_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ResilientCluster>, Error>;

    /// Create a ResilientCluster, including its status
    async fn create_resilient_cluster(&self, record: &ResilientCluster) -> Result<(), Error>;

    /// Replace the status of an existing ResilientCluster
    ///
    /// The write is conditional on the record's `resourceVersion`; a stale
    /// record fails with a conflict.
    async fn update_resilient_cluster_status(
        &self,
        record: &ResilientCluster,
        status: &ResilientClusterStatus,
    ) -> Result<(), Error>;

    /// Delete a ResilientCluster
    async fn delete_resilient_cluster(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Remove a finalizer from a ResilientCluster
    async fn remove_finalizer(
        &self,
        record: &ResilientCluster,
        finalizer: &str,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn records(&self, namespace: &str) -> Api<ResilientCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_addon(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedClusterAddOn>, Error> {
        let api: Api<ManagedClusterAddOn> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_resilient_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ResilientCluster>, Error> {
        Ok(self.records(namespace).get_opt(name).await?)
    }

    async fn create_resilient_cluster(&self, record: &ResilientCluster) -> Result<(), Error> {
        let namespace = record
            .namespace()
            .ok_or_else(|| Error::validation_for(record.name_any(), "record has no namespace"))?;
        let api = self.records(&namespace);

        // the API server drops status on create, it is written through the subresource
        let created = api.create(&PostParams::default(), record).await?;

        if let Some(status) = &record.status {
            let patch = status_patch(&created, status)?;
            api.patch_status(
                &created.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        }

        Ok(())
    }

    async fn update_resilient_cluster_status(
        &self,
        record: &ResilientCluster,
        status: &ResilientClusterStatus,
    ) -> Result<(), Error> {
        let namespace = record
            .namespace()
            .ok_or_else(|| Error::validation_for(record.name_any(), "record has no namespace"))?;
        let patch = status_patch(record, status)?;

        self.records(&namespace)
            .patch_status(
                &record.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;

        Ok(())
    }

    async fn delete_resilient_cluster(&self, namespace: &str, name: &str) -> Result<(), Error> {
        match self
            .records(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_kube_not_found(&e) => {
                debug!(namespace, name, "ResilientCluster already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_finalizer(
        &self,
        record: &ResilientCluster,
        finalizer: &str,
    ) -> Result<(), Error> {
        let namespace = record
            .namespace()
            .ok_or_else(|| Error::validation_for(record.name_any(), "record has no namespace"))?;
        let remaining: Vec<&String> = record
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .collect();

        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": record.resource_version(),
                "finalizers": remaining
            }
        });

        match self
            .records(&namespace)
            .patch(
                &record.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_kube_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Merge patch writing `status`, conditional on the record's resourceVersion
fn status_patch(
    record: &ResilientCluster,
    status: &ResilientClusterStatus,
) -> Result<serde_json::Value, Error> {
    let status = serde_json::to_value(status)
        .map_err(|e| Error::serialization_for_kind("ResilientCluster", e.to_string()))?;
    Ok(serde_json::json!({
        "metadata": { "resourceVersion": record.resource_version() },
        "status": status
    }))
}

/// Identity of a reconciliation: namespace and name shared by addon and record
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace (the spoke's cluster namespace)
    pub namespace: String,
    /// Name (the addon name)
    pub name: String,
}

impl ObjectKey {
    /// Key for the given namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object
    pub fn for_object<K: Resource>(obj: &K) -> Result<Self, Error> {
        let name = obj.name_any();
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::validation_for(name.clone(), "object has no namespace"))?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What a reconciliation did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The addon does not exist; nothing to do
    SignalNotFound,
    /// The addon is gone and a leftover deleting record was released
    OrphanFinalizerReleased,
    /// The addon is deleting; its record was deleted
    RecordDeleted,
    /// The addon is deleting and its record is deleting; our finalizer was released
    FinalizerReleased,
    /// The addon is deleting and there is nothing left to delete
    NothingToDelete,
    /// A new record was created with the derived availability
    Created(Availability),
    /// The record's history was advanced
    Updated {
        /// Current availability before this update (`None` if the record had no status)
        previous: Option<Availability>,
        /// Newly derived availability
        current: Availability,
    },
}

/// Runtime configuration for the addon controller
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Delay before a failed reconciliation is retried
    pub error_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }
}

/// Controller context containing shared state and clients
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Maps addon health to availability
    pub deriver: Arc<dyn StatusDeriver>,
    /// Runtime configuration
    pub config: ControllerConfig,
    /// Cancels in-flight reconciliations on shutdown
    pub cancel: CancellationToken,
}

impl Context {
    /// Create a context backed by a real Kubernetes client and the default deriver
    pub fn new(client: Client, config: ControllerConfig, cancel: CancellationToken) -> Self {
        Self {
            kube: Arc::new(KubeClientImpl::new(client)),
            deriver: Arc::new(AvailableConditionDeriver),
            config,
            cancel,
        }
    }

    /// Replace the status deriver
    pub fn with_deriver(mut self, deriver: Arc<dyn StatusDeriver>) -> Self {
        self.deriver = deriver;
        self
    }

    /// Create a context for testing with a custom client
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            kube,
            deriver: Arc::new(AvailableConditionDeriver),
            config: ControllerConfig::default(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Reconcile the ResilientCluster for one addon identity
///
/// Re-reads the addon and the record, then creates, advances, or deletes the
/// record. Not-found lookups are expected and never fail the reconciliation;
/// every other client error is returned for the caller to retry.
#[instrument(skip(ctx), fields(cluster = %key))]
pub async fn reconcile_addon(key: &ObjectKey, ctx: &Context) -> Result<ReconcileOutcome, Error> {
    run_cancellable(&ctx.cancel, converge(key, ctx)).await
}

async fn converge(key: &ObjectKey, ctx: &Context) -> Result<ReconcileOutcome, Error> {
    let Some(addon) = ctx.kube.get_addon(&key.namespace, &key.name).await? else {
        info!("ManagedClusterAddOn not found");
        return release_orphan(key, ctx).await;
    };

    let record = ctx
        .kube
        .get_resilient_cluster(&key.namespace, &key.name)
        .await?;

    if addon.is_deleting() {
        return handle_addon_deletion(key, record, ctx).await;
    }

    let observed = ctx.deriver.derive(&addon);

    match record {
        Some(record) => advance_record(record, observed, ctx).await,
        None => create_record(key, &addon, observed, ctx).await,
    }
}

/// The addon is gone. A record still held by our finalizer would never finish
/// deleting, so release it; anything else is left to garbage collection.
async fn release_orphan(key: &ObjectKey, ctx: &Context) -> Result<ReconcileOutcome, Error> {
    let record = ctx
        .kube
        .get_resilient_cluster(&key.namespace, &key.name)
        .await?;

    match record {
        Some(record) if record.is_deleting() && record.has_finalizer(RESILIENT_CLUSTER_FINALIZER) => {
            info!("releasing finalizer on orphaned ResilientCluster");
            ctx.kube
                .remove_finalizer(&record, RESILIENT_CLUSTER_FINALIZER)
                .await?;
            Ok(ReconcileOutcome::OrphanFinalizerReleased)
        }
        _ => Ok(ReconcileOutcome::SignalNotFound),
    }
}

async fn handle_addon_deletion(
    key: &ObjectKey,
    record: Option<ResilientCluster>,
    ctx: &Context,
) -> Result<ReconcileOutcome, Error> {
    let Some(record) = record else {
        debug!("addon deleting and no ResilientCluster left");
        return Ok(ReconcileOutcome::NothingToDelete);
    };

    if !record.is_deleting() {
        // owner references cascade the delete as well; this is the explicit path
        info!("addon deleting, deleting ResilientCluster");
        ctx.kube
            .delete_resilient_cluster(&key.namespace, &key.name)
            .await?;
        return Ok(ReconcileOutcome::RecordDeleted);
    }

    if record.has_finalizer(RESILIENT_CLUSTER_FINALIZER) {
        info!("ResilientCluster deleting, releasing finalizer");
        ctx.kube
            .remove_finalizer(&record, RESILIENT_CLUSTER_FINALIZER)
            .await?;
        return Ok(ReconcileOutcome::FinalizerReleased);
    }

    debug!("ResilientCluster already deleting");
    Ok(ReconcileOutcome::NothingToDelete)
}

async fn create_record(
    key: &ObjectKey,
    addon: &ManagedClusterAddOn,
    observed: ClusterStatus,
    ctx: &Context,
) -> Result<ReconcileOutcome, Error> {
    let owner = addon.controller_owner_ref(&()).ok_or_else(|| {
        Error::validation_for(key.to_string(), "ManagedClusterAddOn has no uid")
    })?;
    let availability = observed.availability;

    let mut record = ResilientCluster::new(&key.name, ResilientClusterSpec::default());
    record.metadata.namespace = Some(key.namespace.clone());
    record.metadata.finalizers = Some(vec![RESILIENT_CLUSTER_FINALIZER.to_string()]);
    record.metadata.owner_references = Some(vec![owner]);
    record.status = Some(ResilientClusterStatus::initial(observed));

    ctx.kube.create_resilient_cluster(&record).await?;

    info!(%availability, "created ResilientCluster");
    Ok(ReconcileOutcome::Created(availability))
}

async fn advance_record(
    record: ResilientCluster,
    observed: ClusterStatus,
    ctx: &Context,
) -> Result<ReconcileOutcome, Error> {
    let current = observed.availability;
    let (status, previous) = match &record.status {
        Some(status) => (
            status.advance(observed),
            Some(status.current_status.availability),
        ),
        // creation was interrupted before the status write landed
        None => (ResilientClusterStatus::initial(observed), None),
    };

    ctx.kube
        .update_resilient_cluster_status(&record, &status)
        .await?;

    info!(previous = ?previous, current = %current, "updated ResilientCluster");
    Ok(ReconcileOutcome::Updated { previous, current })
}

/// Controller-runtime entry point for a ManagedClusterAddOn
///
/// The triggering object only supplies the identity; its contents are not
/// trusted. Successful reconciliations wait for the next change.
pub async fn reconcile(addon: Arc<ManagedClusterAddOn>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = ObjectKey::for_object(addon.as_ref())?;
    let outcome = reconcile_addon(&key, &ctx).await?;
    debug!(cluster = %key, ?outcome, "reconciliation complete");
    Ok(Action::await_change())
}

/// Error policy for the controller
///
/// Failures are retried by the controller runtime after the configured delay.
pub fn error_policy(addon: Arc<ManagedClusterAddOn>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        error = %error,
        retryable = error.is_retryable(),
        cluster = %addon.name_any(),
        namespace = %addon.namespace().unwrap_or_default(),
        "reconciliation failed"
    );
    Action::requeue(ctx.config.error_requeue)
}
