//! Kubernetes access for migration actions
//!
//! ClusterDeployments and AddOnDeploymentConfigs belong to other projects;
//! they are handled as [`DynamicObject`]s so specs are copied verbatim.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;

#[cfg(test)]
use mockall::automock;

use crate::crd::{addon_deployment_config_resource, cluster_deployment_resource};
use crate::Error;

/// Trait abstracting the Kubernetes calls made by migration actions
///
/// Lookups map "not found" to `None`. Deletes and creates return the raw
/// API error so each action can decide what counts as success.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MigrationClient: Send + Sync {
    /// Get a hive ClusterDeployment
    async fn get_cluster_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Delete a hive ClusterDeployment
    async fn delete_cluster_deployment(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// List AddOnDeploymentConfigs in a namespace
    async fn list_deployment_configs(&self, namespace: &str) -> Result<Vec<DynamicObject>, Error>;

    /// Get an AddOnDeploymentConfig
    async fn get_deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Create an AddOnDeploymentConfig in `namespace`
    async fn create_deployment_config(
        &self,
        namespace: &str,
        config: &DynamicObject,
    ) -> Result<(), Error>;

    /// Delete an AddOnDeploymentConfig
    async fn delete_deployment_config(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct MigrationClientImpl {
    client: Client,
    cluster_deployments: ApiResource,
    deployment_configs: ApiResource,
}

impl MigrationClientImpl {
    /// Create a new MigrationClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cluster_deployments: cluster_deployment_resource(),
            deployment_configs: addon_deployment_config_resource(),
        }
    }

    fn api(&self, namespace: &str, resource: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

#[async_trait]
impl MigrationClient for MigrationClientImpl {
    async fn get_cluster_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        Ok(self
            .api(namespace, &self.cluster_deployments)
            .get_opt(name)
            .await?)
    }

    async fn delete_cluster_deployment(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.api(namespace, &self.cluster_deployments)
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    async fn list_deployment_configs(&self, namespace: &str) -> Result<Vec<DynamicObject>, Error> {
        let list = self
            .api(namespace, &self.deployment_configs)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn get_deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        Ok(self
            .api(namespace, &self.deployment_configs)
            .get_opt(name)
            .await?)
    }

    async fn create_deployment_config(
        &self,
        namespace: &str,
        config: &DynamicObject,
    ) -> Result<(), Error> {
        self.api(namespace, &self.deployment_configs)
            .create(&PostParams::default(), config)
            .await?;
        Ok(())
    }

    async fn delete_deployment_config(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.api(namespace, &self.deployment_configs)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
