//! Lifecycle request routing
//!
//! `MaptProvisioner` is a pure router plus per-kind request adapters. It
//! holds no mutable state: the credential bundle is loaded once at
//! construction and the backend engine is injected, so provisioning
//! attempts are testable in isolation.

use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;
use tracing::{info, instrument};

use ephemeron_common::{Error, Result};

use crate::cli::MaptCli;
use crate::credentials::CloudCredentials;
use crate::engine::{ContextArgs, EngineMetadata, KindArgs, OpenshiftArgs, ProvisionEngine};
use crate::types::{
    select_compute, ClusterConfig, ClusterRequest, ConnectionDetails, OpenshiftAccess,
    ProvisionOutput, SUPPORTED_KIND_K8S_VERSIONS, SUPPORTED_OPENSHIFT_VERSIONS,
};

/// Environment variable naming the OpenShift pull secret file
pub const OPENSHIFT_PULL_SECRET_FILE_ENV: &str = "OPENSHIFT_PULL_SECRET_FILE";

/// Provision/Deprovision contract exposed to the reconciliation core
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision the cluster described by the request
    ///
    /// On success returns the normalized metadata bundle. Callers must
    /// validate the bundle contains a non-empty kubeconfig before treating
    /// provisioning as successful.
    async fn provision(&self, request: &ClusterRequest) -> Result<ProvisionOutput>;

    /// Tear down the external resources for the request's session
    async fn deprovision(&self, request: &ClusterRequest) -> Result<()>;
}

/// Router over the closed set of cluster kinds
pub struct MaptProvisioner {
    credentials: CloudCredentials,
    engine: Arc<dyn ProvisionEngine>,
}

impl MaptProvisioner {
    /// Create a provisioner with explicit credentials and engine
    pub fn new(credentials: CloudCredentials, engine: Arc<dyn ProvisionEngine>) -> Self {
        Self {
            credentials,
            engine,
        }
    }

    /// Create the production provisioner
    ///
    /// Loads the cloud credentials secret once and wires up the CLI-backed
    /// engine. Fails fast if any credential key is missing or empty.
    pub async fn from_cluster(client: &Client) -> Result<Self> {
        let credentials = CloudCredentials::load(client).await?;
        let engine = Arc::new(MaptCli::new(credentials.clone()));
        Ok(Self::new(credentials, engine))
    }

    fn context_args(&self, request: &ClusterRequest) -> ContextArgs {
        ContextArgs {
            project_name: request.name.clone(),
            backed_url: self
                .credentials
                .backed_url(request.kind(), &request.session_id),
            spot_price_increase_rate: request.machine.spot_price_increase_percentage,
            tags: request.machine.tags.clone(),
            force_destroy: true,
        }
    }

    fn validate_request(request: &ClusterRequest) -> Result<()> {
        if request.session_id.is_empty() {
            return Err(Error::validation_for(
                &request.name,
                "missing or empty provision id",
            ));
        }
        Ok(())
    }

    fn kind_args(request: &ClusterRequest, version: &str) -> Result<KindArgs> {
        if !SUPPORTED_KIND_K8S_VERSIONS.contains(&version) {
            return Err(Error::validation_for(
                &request.name,
                format!(
                    "unsupported Kubernetes version: {version} (supported versions: {SUPPORTED_KIND_K8S_VERSIONS:?})"
                ),
            ));
        }
        Ok(KindArgs {
            prefix: request.name.clone(),
            arch: request.machine.architecture,
            compute: select_compute(&request.machine),
            version: version.to_string(),
            spot: request.machine.use_spot_instances,
        })
    }

    fn openshift_args(request: &ClusterRequest, version: &str) -> Result<OpenshiftArgs> {
        if !SUPPORTED_OPENSHIFT_VERSIONS.contains(&version) {
            return Err(Error::validation_for(
                &request.name,
                format!(
                    "unsupported OpenShift version: {version} (supported: {SUPPORTED_OPENSHIFT_VERSIONS:?})"
                ),
            ));
        }
        Ok(OpenshiftArgs {
            prefix: request.name.clone(),
            version: version.to_string(),
            arch: request.machine.architecture,
            compute: select_compute(&request.machine),
            pull_secret_file: validated_pull_secret_file(&request.name)?,
            spot: request.machine.use_spot_instances,
        })
    }

    fn backend_err(request: &ClusterRequest, operation: &str, err: impl std::fmt::Display) -> Error {
        Error::backend(
            &request.name,
            request.kind().to_string(),
            operation,
            err.to_string(),
        )
    }
}

fn normalize(meta: EngineMetadata, openshift: bool) -> ProvisionOutput {
    let connection = ConnectionDetails {
        username: meta.username,
        private_key: meta.private_key,
        host: meta.host,
    };
    let openshift = openshift.then(|| OpenshiftAccess {
        kubeadmin_password: meta.kubeadmin_password.unwrap_or_default(),
        console_url: meta.console_url.unwrap_or_default(),
    });
    ProvisionOutput {
        kubeconfig: meta.kubeconfig,
        average_price: meta.spot_price.unwrap_or_default(),
        connection,
        openshift,
    }
}

/// Resolve and validate the OpenShift pull secret file from the environment
fn validated_pull_secret_file(resource: &str) -> Result<std::path::PathBuf> {
    let path = std::env::var(OPENSHIFT_PULL_SECRET_FILE_ENV).map_err(|_| {
        Error::validation_for(
            resource,
            format!("environment variable {OPENSHIFT_PULL_SECRET_FILE_ENV} is not set or empty"),
        )
    })?;
    let info = std::fs::metadata(&path).map_err(|e| {
        Error::validation_for(
            resource,
            format!("cannot access pull secret file at {path}: {e}"),
        )
    })?;
    if info.len() == 0 {
        return Err(Error::validation_for(
            resource,
            format!("pull secret file at {path} is empty"),
        ));
    }
    Ok(path.into())
}

#[async_trait]
impl Provisioner for MaptProvisioner {
    #[instrument(skip(self, request), fields(cluster = %request.name, kind = %request.kind()))]
    async fn provision(&self, request: &ClusterRequest) -> Result<ProvisionOutput> {
        Self::validate_request(request)?;
        let ctx = self.context_args(request);

        match &request.config {
            ClusterConfig::Kind { kubernetes_version } => {
                let args = Self::kind_args(request, kubernetes_version)?;
                info!(backed_url = %ctx.backed_url, "provisioning Kind cluster");
                let meta = self
                    .engine
                    .create_kind(&ctx, &args)
                    .await
                    .map_err(|e| Self::backend_err(request, "provision", e))?;
                Ok(normalize(meta, false))
            }
            ClusterConfig::OpenshiftSnc { openshift_version } => {
                let args = Self::openshift_args(request, openshift_version)?;
                info!(backed_url = %ctx.backed_url, "provisioning OpenShift cluster");
                let meta = self
                    .engine
                    .create_openshift(&ctx, &args)
                    .await
                    .map_err(|e| Self::backend_err(request, "provision", e))?;
                Ok(normalize(meta, true))
            }
        }
    }

    #[instrument(skip(self, request), fields(cluster = %request.name, kind = %request.kind()))]
    async fn deprovision(&self, request: &ClusterRequest) -> Result<()> {
        Self::validate_request(request)?;
        let ctx = self.context_args(request);
        info!(backed_url = %ctx.backed_url, "deprovisioning cluster");

        match &request.config {
            ClusterConfig::Kind { .. } => self
                .engine
                .destroy_kind(&ctx)
                .await
                .map_err(|e| Self::backend_err(request, "deprovision", e)),
            ClusterConfig::OpenshiftSnc { .. } => self
                .engine
                .destroy_openshift(&ctx)
                .await
                .map_err(|e| Self::backend_err(request, "deprovision", e)),
        }
    }
}
