//! ResilientCluster finalizer controller
//!
//! The addon controller only runs while its ManagedClusterAddOn is still in
//! the watch cache. Once the addon is gone, owner-reference garbage
//! collection marks the record deleting and nothing addon-side fires again.
//! This controller watches the records themselves and releases our
//! finalizer once the owning addon is gone or deleting.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument};

use super::addon::{Context, ObjectKey};
use crate::cancel::run_cancellable;
use crate::crd::ResilientCluster;
use crate::{Error, RESILIENT_CLUSTER_FINALIZER};

/// What a record-side reconciliation did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The record no longer exists
    RecordNotFound,
    /// The record is not being deleted
    NotDeleting,
    /// The record is deleting and our finalizer is already gone
    AlreadyReleased,
    /// The record is deleting but its addon is still live; the finalizer stays
    HeldByLiveAddon,
    /// Our finalizer was removed
    FinalizerReleased,
}

/// Release our finalizer on a deleting ResilientCluster whose addon is gone
///
/// A record deleted while its addon is still live keeps the finalizer; the
/// addon controller deletes it for good once the addon itself goes away.
#[instrument(skip(ctx), fields(cluster = %key))]
pub async fn reconcile_record(key: &ObjectKey, ctx: &Context) -> Result<RecordOutcome, Error> {
    run_cancellable(&ctx.cancel, release_if_orphaned(key, ctx)).await
}

async fn release_if_orphaned(key: &ObjectKey, ctx: &Context) -> Result<RecordOutcome, Error> {
    let Some(record) = ctx
        .kube
        .get_resilient_cluster(&key.namespace, &key.name)
        .await?
    else {
        return Ok(RecordOutcome::RecordNotFound);
    };

    if !record.is_deleting() {
        return Ok(RecordOutcome::NotDeleting);
    }
    if !record.has_finalizer(RESILIENT_CLUSTER_FINALIZER) {
        return Ok(RecordOutcome::AlreadyReleased);
    }

    let addon = ctx.kube.get_addon(&key.namespace, &key.name).await?;
    if addon.as_ref().is_some_and(|a| !a.is_deleting()) {
        debug!("ResilientCluster deleting while its addon is live, keeping finalizer");
        return Ok(RecordOutcome::HeldByLiveAddon);
    }

    info!(
        addon_present = addon.is_some(),
        "releasing finalizer on ResilientCluster"
    );
    ctx.kube
        .remove_finalizer(&record, RESILIENT_CLUSTER_FINALIZER)
        .await?;
    Ok(RecordOutcome::FinalizerReleased)
}

/// Controller-runtime entry point for a ResilientCluster
pub async fn reconcile_resilient_cluster(
    record: Arc<ResilientCluster>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let key = ObjectKey::for_object(record.as_ref())?;
    let outcome = reconcile_record(&key, &ctx).await?;
    debug!(cluster = %key, ?outcome, "record reconciliation complete");
    Ok(Action::await_change())
}

/// Error policy for the record controller
pub fn record_error_policy(record: Arc<ResilientCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        error = %error,
        retryable = error.is_retryable(),
        cluster = %record.name_any(),
        namespace = %record.namespace().unwrap_or_default(),
        "record reconciliation failed"
    );
    Action::requeue(ctx.config.error_requeue)
}
