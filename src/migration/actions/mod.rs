//! Built-in migration actions

mod delete_cluster_deployment;
mod relocate_deployment_configs;

pub use delete_cluster_deployment::DeleteStaleClusterDeployment;
pub use relocate_deployment_configs::RelocateDeploymentConfigs;
