//! Moves AddOnDeploymentConfigs from the old spoke's namespace to the new one

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::migration::{MigrationAction, MigrationOptions};
use crate::Error;

/// Records how the object was last written, not what it is
const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Recreates every AddOnDeploymentConfig of the old spoke under the new
/// spoke's namespace, then deletes the original
///
/// An original is only deleted once its copy exists, so a failed create
/// leaves it in place for the next run.
#[derive(Clone, Copy, Debug, Default)]
pub struct RelocateDeploymentConfigs;

#[async_trait]
impl MigrationAction for RelocateDeploymentConfigs {
    fn name(&self) -> &'static str {
        "relocate-deployment-configs"
    }

    #[instrument(
        skip(self, options),
        fields(action = self.name(), old_spoke = %options.old_spoke, new_spoke = %options.new_spoke)
    )]
    async fn run(&self, options: &MigrationOptions) -> Result<(), Error> {
        let configs = options
            .client
            .list_deployment_configs(&options.old_spoke)
            .await?;

        if configs.is_empty() {
            debug!("no deployment configs to relocate");
            return Ok(());
        }

        let total = configs.len();
        let mut failed = Vec::new();

        for config in &configs {
            let name = config.name_any();
            if let Err(e) = relocate(options, config).await {
                warn!(config = %name, error = %e, "failed to relocate deployment config");
                failed.push(name);
            }
        }

        if failed.is_empty() {
            info!(relocated = total, "relocated deployment configs");
            Ok(())
        } else {
            Err(Error::items_failed(
                format!("deployment configs in {}", options.old_spoke),
                &failed,
                total,
            ))
        }
    }
}

async fn relocate(options: &MigrationOptions, config: &DynamicObject) -> Result<(), Error> {
    let name = config.name_any();
    let copy = relocated_copy(config, &options.new_spoke);

    match options
        .client
        .create_deployment_config(&options.new_spoke, &copy)
        .await
    {
        Ok(()) => debug!(config = %name, "created deployment config in new namespace"),
        Err(e) if e.is_conflict() => check_existing_copy(options, &copy, e).await?,
        Err(e) => return Err(e),
    }

    match options
        .client
        .delete_deployment_config(&options.old_spoke, &name)
        .await
    {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Accept a copy already present in the new namespace
///
/// The existing copy wins even when its spec differs; the difference is
/// logged so an operator can reconcile it. If the copy disappeared after the
/// create conflicted, `conflict` is returned and the original stays.
async fn check_existing_copy(
    options: &MigrationOptions,
    copy: &DynamicObject,
    conflict: Error,
) -> Result<(), Error> {
    let name = copy.name_any();
    let Some(existing) = options
        .client
        .get_deployment_config(&options.new_spoke, &name)
        .await?
    else {
        return Err(conflict);
    };

    if existing.data.get("spec") == copy.data.get("spec") {
        debug!(config = %name, "deployment config already in new namespace");
    } else {
        warn!(
            config = %name,
            namespace = %options.new_spoke,
            "deployment config already in new namespace with a different spec, keeping it"
        );
    }
    Ok(())
}

/// Copy of `config` ready to be created in `namespace`
///
/// Keeps name, labels, annotations and spec. Server-assigned metadata,
/// owner references and status are dropped.
fn relocated_copy(config: &DynamicObject, namespace: &str) -> DynamicObject {
    let mut copy = config.clone();

    let meta = &mut copy.metadata;
    meta.namespace = Some(namespace.to_string());
    meta.uid = None;
    meta.resource_version = None;
    meta.creation_timestamp = None;
    meta.deletion_timestamp = None;
    meta.deletion_grace_period_seconds = None;
    meta.generation = None;
    meta.self_link = None;
    meta.managed_fields = None;
    meta.owner_references = None;
    meta.finalizers = None;
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.remove(LAST_APPLIED_ANNOTATION);
    }

    if let Some(data) = copy.data.as_object_mut() {
        data.remove("status");
    }

    copy
}
