//! Spoke replacement
//!
//! When a spoke is replaced, resources on the hub that are keyed by the old
//! spoke's cluster namespace have to follow it. Each concern is one
//! [`MigrationAction`]; the [`ActionRegistry`] holds them in a fixed order and
//! [`run_migration`] runs every one of them against the same options.
//!
//! Actions are independent. A failing action is recorded and the batch moves
//! on; the caller gets back a [`MigrationReport`] or, if anything failed, an
//! [`Error::PartialBatch`] carrying it. Every action is safe to re-run.

mod actions;
mod client;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

pub use actions::{DeleteStaleClusterDeployment, RelocateDeploymentConfigs};
pub use client::{MigrationClient, MigrationClientImpl};

#[cfg(test)]
pub use client::MockMigrationClient;

use crate::cancel::run_cancellable;
use crate::Error;

/// Inputs shared by every action of one migration
#[derive(Clone)]
pub struct MigrationOptions {
    /// Kubernetes access
    pub client: Arc<dyn MigrationClient>,
    /// Cluster namespace of the spoke being replaced
    pub old_spoke: String,
    /// Cluster namespace of the replacement spoke
    pub new_spoke: String,
}

impl fmt::Debug for MigrationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationOptions")
            .field("old_spoke", &self.old_spoke)
            .field("new_spoke", &self.new_spoke)
            .finish_non_exhaustive()
    }
}

impl MigrationOptions {
    /// Validated options for migrating `old_spoke` to `new_spoke`
    pub fn new(
        client: Arc<dyn MigrationClient>,
        old_spoke: impl Into<String>,
        new_spoke: impl Into<String>,
    ) -> Result<Self, Error> {
        let old_spoke = old_spoke.into();
        let new_spoke = new_spoke.into();

        if old_spoke.is_empty() {
            return Err(Error::validation_for("oldSpokeIdentity", "must not be empty"));
        }
        if new_spoke.is_empty() {
            return Err(Error::validation_for("newSpokeIdentity", "must not be empty"));
        }
        if old_spoke == new_spoke {
            return Err(Error::validation_for(
                "migration trigger",
                format!("old and new spoke are both '{old_spoke}'"),
            ));
        }

        Ok(Self {
            client,
            old_spoke,
            new_spoke,
        })
    }
}

/// Wire shape of a migration request
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MigrationTrigger {
    /// Cluster namespace of the spoke being replaced
    pub old_spoke_identity: String,
    /// Cluster namespace of the replacement spoke
    pub new_spoke_identity: String,
}

impl MigrationTrigger {
    /// Parse a trigger from JSON
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        serde_json::from_str(raw)
            .map_err(|e| Error::validation_for("migration trigger", e.to_string()))
    }

    /// Validate the trigger into options bound to `client`
    pub fn into_options(self, client: Arc<dyn MigrationClient>) -> Result<MigrationOptions, Error> {
        MigrationOptions::new(client, self.old_spoke_identity, self.new_spoke_identity)
    }
}

/// One independent, idempotent step of a spoke replacement
#[async_trait]
pub trait MigrationAction: Send + Sync {
    /// Stable name used in logs and reports
    fn name(&self) -> &'static str;

    /// Perform the step
    ///
    /// Must be safe to run again from any intermediate state.
    async fn run(&self, options: &MigrationOptions) -> Result<(), Error>;
}

/// Ordered set of migration actions
pub struct ActionRegistry {
    actions: Vec<Box<dyn MigrationAction>>,
}

impl ActionRegistry {
    /// Registry with no actions
    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// The actions run on every spoke replacement
    pub fn standard() -> Self {
        Self::empty()
            .with(DeleteStaleClusterDeployment)
            .with(RelocateDeploymentConfigs)
    }

    /// Append an action; actions run in the order they were added
    pub fn with(mut self, action: impl MigrationAction + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    /// Names of the registered actions, in order
    pub fn names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// Number of registered actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True if no actions are registered
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action once, in order
    ///
    /// Failures are collected, not propagated. Cancellation stops the batch
    /// before the next action starts and interrupts the running one.
    pub async fn run_all(
        &self,
        options: &MigrationOptions,
        cancel: &CancellationToken,
    ) -> Result<MigrationReport, Error> {
        let mut report = MigrationReport::default();

        for action in &self.actions {
            let name = action.name();
            match run_cancellable(cancel, action.run(options)).await {
                Ok(()) => {
                    info!(action = name, "migration action succeeded");
                    report.succeeded.push(name);
                }
                Err(Error::Cancelled) => {
                    info!(action = name, "migration cancelled");
                    return Err(Error::Cancelled);
                }
                Err(e) => {
                    error!(action = name, error = %e, "migration action failed");
                    report.failures.push(ActionFailure {
                        action: name,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// A migration action that did not complete
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionFailure {
    /// Name of the failed action
    pub action: &'static str,
    /// What went wrong
    pub message: String,
}

/// Per-action outcome of a migration
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Actions that completed, in run order
    pub succeeded: Vec<&'static str>,
    /// Actions that failed, in run order
    pub failures: Vec<ActionFailure>,
}

impl MigrationReport {
    /// Number of actions that ran
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    /// True if every action succeeded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the failed actions, in run order
    pub fn failed_actions(&self) -> Vec<&'static str> {
        self.failures.iter().map(|f| f.action).collect()
    }
}

/// Migrate everything tied to `options.old_spoke` over to `options.new_spoke`
///
/// Returns the report when every action succeeded and
/// [`Error::PartialBatch`] when any failed. Re-running after a partial
/// failure is always safe.
#[instrument(skip(registry, options, cancel), fields(old_spoke = %options.old_spoke, new_spoke = %options.new_spoke))]
pub async fn run_migration(
    registry: &ActionRegistry,
    options: &MigrationOptions,
    cancel: &CancellationToken,
) -> Result<MigrationReport, Error> {
    info!(actions = registry.len(), "starting spoke migration");

    let report = registry.run_all(options, cancel).await?;

    if report.is_success() {
        info!(succeeded = report.succeeded.len(), "spoke migration complete");
        Ok(report)
    } else {
        Err(Error::partial_batch(report))
    }
}
