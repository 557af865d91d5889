//! Ephemeron Operator - ephemeral spot-provisioned Kubernetes clusters

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ephemeron_common::crd::{KindCluster, OpenshiftCluster};
use ephemeron_operator::controller_runner::build_cluster_controllers;
use ephemeron_provision::MaptProvisioner;

/// Ephemeron - CRD-driven operator for ephemeral cloud-provisioned clusters
#[derive(Parser, Debug)]
#[command(name = "ephemeron", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches KindCluster and OpenshiftCluster records and reconciles
    /// them against the provisioning backend.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ephemeron=debug,kube=info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.crd {
        // Generate CRD YAML for both record kinds
        let kind_crd = serde_yaml::to_string(&KindCluster::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize KindCluster CRD: {}", e))?;
        let openshift_crd = serde_yaml::to_string(&OpenshiftCluster::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize OpenshiftCluster CRD: {}", e))?;
        println!("{kind_crd}---\n{openshift_crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller().await,
    }
}

/// Ensure the Ephemeron CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply,
/// so the CRD versions always match the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Api, Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(ephemeron_common::FIELD_MANAGER).force();

    tracing::info!("Installing KindCluster CRD...");
    crds.patch(
        "kindclusters.ephemeron.dev",
        &params,
        &Patch::Apply(&KindCluster::crd()),
    )
    .await?;

    tracing::info!("Installing OpenshiftCluster CRD...");
    crds.patch(
        "openshiftclusters.ephemeron.dev",
        &params,
        &Patch::Apply(&OpenshiftCluster::crd()),
    )
    .await?;

    Ok(())
}

async fn run_controller() -> anyhow::Result<()> {
    let client = Client::try_default().await?;

    ensure_crds_installed(&client).await?;

    // Credentials are read once here; a missing or incomplete secret fails
    // fast before any reconciliation starts.
    let provisioner: Arc<dyn ephemeron_provision::Provisioner> =
        Arc::new(MaptProvisioner::from_cluster(&client).await?);

    tracing::info!("Starting controllers:");
    let controllers = build_cluster_controllers(client, provisioner);

    futures::future::join_all(controllers).await;

    tracing::info!("controllers terminated, shutting down");
    Ok(())
}
