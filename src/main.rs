//! Multicluster Resiliency Addon - hub-side controller and spoke migration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::controller::Error as ControllerError;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcra::controller::{
    addon_triggers, error_policy, reconcile, reconcile_resilient_cluster, record_error_policy,
    Context, ControllerConfig, OwnershipFilter,
};
use mcra::crd::{ManagedClusterAddOn, ResilientCluster};
use mcra::migration::{
    run_migration, ActionRegistry, MigrationClientImpl, MigrationOptions, MigrationTrigger,
};
use mcra::{Error, FIELD_MANAGER};

/// Multicluster Resiliency Addon - tracks spoke availability and migrates replaced spokes
///
/// Without a subcommand the controller runs, taking the same flags as
/// `mcra controller`.
#[derive(Parser, Debug)]
#[command(name = "mcra", version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Cli {
    /// Print the ResilientCluster CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the addon lifecycle controller (default mode)
    ///
    /// Watches ManagedClusterAddOns of this addon and keeps a
    /// ResilientCluster per spoke in sync with its availability.
    Controller(ControllerArgs),

    /// Migrate hub resources from a replaced spoke to its replacement
    ///
    /// Runs every migration action once. Safe to re-run after a partial failure.
    Migrate(MigrateArgs),
}

/// Controller mode arguments
#[derive(Args, Debug)]
struct ControllerArgs {
    /// Seconds to wait before retrying a failed reconciliation
    #[arg(long, env = "MCRA_ERROR_REQUEUE_SECS", default_value = "5")]
    error_requeue_secs: u64,

    /// Do not install or update the ResilientCluster CRD on startup
    #[arg(long)]
    skip_crd_install: bool,
}

/// Migrate mode arguments
#[derive(Args, Debug)]
struct MigrateArgs {
    /// Cluster namespace of the spoke being replaced
    #[arg(long, env = "MCRA_OLD_SPOKE", conflicts_with = "trigger", requires = "new_spoke")]
    old_spoke: Option<String>,

    /// Cluster namespace of the replacement spoke
    #[arg(long, env = "MCRA_NEW_SPOKE", conflicts_with = "trigger", requires = "old_spoke")]
    new_spoke: Option<String>,

    /// Path to a JSON trigger: {"oldSpokeIdentity": ..., "newSpokeIdentity": ...}
    #[arg(long)]
    trigger: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ResilientCluster::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Migrate(args)) => run_migrate(args).await,
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(cli.controller).await,
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, cancelling in-flight work");
            token.cancel();
        }
    });
}

/// Run the addon lifecycle controller until shutdown
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.skip_crd_install {
        tracing::info!("Skipping ResilientCluster CRD installation");
    } else {
        ensure_crd_installed(&client).await?;
    }

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let config = ControllerConfig {
        error_requeue: Duration::from_secs(args.error_requeue_secs),
    };
    tracing::info!(error_requeue_secs = args.error_requeue_secs, "Controller configured");
    let ctx = Arc::new(Context::new(client.clone(), config, cancel.clone()));

    let addons: Api<ManagedClusterAddOn> = Api::all(client.clone());
    let records: Api<ResilientCluster> = Api::all(client);
    let (reader, triggers) =
        addon_triggers(addons, WatcherConfig::default(), OwnershipFilter::default());

    tracing::info!("Starting controllers...");
    tracing::info!("  - ManagedClusterAddOn controller");
    tracing::info!("  - ResilientCluster finalizer controller");

    // Records whose addon already left the store resolve to a missing
    // object; the record controller handles those.
    let addon_controller = Controller::for_stream(triggers, reader)
        .owns(records.clone(), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(addon = %obj, ?action, "Addon reconciliation completed");
                }
                Err(ControllerError::ObjectNotFound(obj)) => {
                    tracing::debug!(addon = %obj, "Addon no longer in cache, skipping");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Addon reconciliation error");
                }
            }
        });

    let record_controller = Controller::new(records, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile_resilient_cluster, record_error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(record = %obj, ?action, "Record reconciliation completed");
                }
                Err(ControllerError::ObjectNotFound(obj)) => {
                    tracing::debug!(record = %obj, "Record no longer in cache, skipping");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Record reconciliation error");
                }
            }
        });

    tokio::select! {
        _ = addon_controller => {
            tracing::info!("ManagedClusterAddOn controller completed");
        }
        _ = record_controller => {
            tracing::info!("ResilientCluster controller completed");
        }
    }

    cancel.cancel();
    tracing::info!("Controller stopped");
    Ok(())
}

/// Install or update the ResilientCluster CRD with server-side apply
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing ResilientCluster CRD...");
    crds.patch(
        ResilientCluster::crd_name(),
        &params,
        &Patch::Apply(&ResilientCluster::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install ResilientCluster CRD: {}", e))?;

    Ok(())
}

/// Run every migration action for one spoke replacement
async fn run_migrate(args: MigrateArgs) -> anyhow::Result<()> {
    let trigger = match (args.trigger, args.old_spoke, args.new_spoke) {
        (Some(path), _, _) => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read trigger file {:?}: {}", path, e))?;
            MigrationTrigger::from_json(&raw)?
        }
        (None, Some(old_spoke), Some(new_spoke)) => MigrationTrigger {
            old_spoke_identity: old_spoke,
            new_spoke_identity: new_spoke,
        },
        _ => anyhow::bail!("either --trigger or both --old-spoke and --new-spoke are required"),
    };

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    let options: MigrationOptions =
        trigger.into_options(Arc::new(MigrationClientImpl::new(client)))?;

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let registry = ActionRegistry::standard();
    match run_migration(&registry, &options, &cancel).await {
        Ok(report) => {
            tracing::info!(actions = ?report.succeeded, "Migration succeeded");
            Ok(())
        }
        // each failed action was already logged by the runner
        Err(Error::PartialBatch { report, .. }) => {
            anyhow::bail!(
                "migration incomplete: {} of {} actions failed, re-run to retry",
                report.failures.len(),
                report.total()
            )
        }
        Err(e) => Err(e.into()),
    }
}
