//! Removes the hive ClusterDeployment of the replaced spoke

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::migration::{MigrationAction, MigrationOptions};
use crate::Error;

/// Deletes the ClusterDeployment named after the old spoke in its own namespace
#[derive(Clone, Copy, Debug, Default)]
pub struct DeleteStaleClusterDeployment;

#[async_trait]
impl MigrationAction for DeleteStaleClusterDeployment {
    fn name(&self) -> &'static str {
        "delete-stale-cluster-deployment"
    }

    #[instrument(skip(self, options), fields(action = self.name(), old_spoke = %options.old_spoke))]
    async fn run(&self, options: &MigrationOptions) -> Result<(), Error> {
        let spoke = options.old_spoke.as_str();

        if options
            .client
            .get_cluster_deployment(spoke, spoke)
            .await?
            .is_none()
        {
            debug!("no ClusterDeployment for old spoke");
            return Ok(());
        }

        match options.client.delete_cluster_deployment(spoke, spoke).await {
            Ok(()) => {
                info!("deleted ClusterDeployment of old spoke");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("ClusterDeployment disappeared before delete");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
