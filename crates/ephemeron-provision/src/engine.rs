//! The provisioning backend contract
//!
//! The backend is an opaque black box: given context args (project name,
//! state location) and kind-specific args it creates or destroys cluster
//! infrastructure. Calls are blocking, synchronous from the caller's point
//! of view, and may take minutes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use ephemeron_common::crd::Architecture;

use crate::types::ComputeRequest;

/// Errors from backend command execution
#[derive(Debug, Error)]
pub enum EngineError {
    /// The backend command could not be launched
    #[error("failed to launch backend command: {0}")]
    Spawn(String),

    /// The backend command ran past its deadline
    #[error("backend command timed out after {0:?}")]
    Timeout(Duration),

    /// The backend command exited unsuccessfully
    #[error("backend command failed: {0}")]
    CommandFailed(String),

    /// The backend completed but a required output artifact is missing
    #[error("backend output missing: {0}")]
    MissingOutput(String),
}

/// Context arguments common to every backend call
///
/// The backed URL is the per-session state location; destroy calls must
/// pass the same URL the create call used.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextArgs {
    /// Backend project name (the record name)
    pub project_name: String,
    /// Stable per-session state location (`s3://<bucket>/<kind>/<sessionId>`)
    pub backed_url: String,
    /// Percentage added on top of the calculated spot price
    pub spot_price_increase_rate: Option<i32>,
    /// Tags applied to created cloud resources
    pub tags: BTreeMap<String, String>,
    /// Destroy resources even if the backend considers them in use
    pub force_destroy: bool,
}

/// Arguments for creating a Kind cluster
#[derive(Clone, Debug, PartialEq)]
pub struct KindArgs {
    /// Name prefix for created resources
    pub prefix: String,
    /// Instance architecture
    pub arch: Architecture,
    /// Compute shape selection
    pub compute: ComputeRequest,
    /// Kubernetes version for the Kind cluster
    pub version: String,
    /// Whether to request spot capacity
    pub spot: bool,
}

/// Arguments for creating a single-node OpenShift cluster
#[derive(Clone, Debug, PartialEq)]
pub struct OpenshiftArgs {
    /// Name prefix for created resources
    pub prefix: String,
    /// OpenShift version to install
    pub version: String,
    /// Instance architecture
    pub arch: Architecture,
    /// Compute shape selection
    pub compute: ComputeRequest,
    /// Path to the validated OpenShift pull secret file
    pub pull_secret_file: PathBuf,
    /// Whether to request spot capacity
    pub spot: bool,
}

/// Raw metadata returned by a backend create call
///
/// Kind clusters leave the OpenShift-only fields unset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineMetadata {
    /// SSH username for the backing machine
    pub username: String,
    /// SSH private key material
    pub private_key: String,
    /// Host address of the backing machine
    pub host: String,
    /// Kubeconfig blob for the provisioned cluster
    pub kubeconfig: String,
    /// Average spot acquisition price, when spot capacity was used
    pub spot_price: Option<f64>,
    /// Password for the kubeadmin user (OpenShift only)
    pub kubeadmin_password: Option<String>,
    /// Web console URL (OpenShift only)
    pub console_url: Option<String>,
}

/// The Provision/Destroy contract with the backend
///
/// Implemented by the production CLI wrapper and mocked in dispatch tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProvisionEngine: Send + Sync {
    /// Create a Kind cluster
    async fn create_kind(
        &self,
        ctx: &ContextArgs,
        args: &KindArgs,
    ) -> Result<EngineMetadata, EngineError>;

    /// Destroy a Kind cluster's infrastructure
    async fn destroy_kind(&self, ctx: &ContextArgs) -> Result<(), EngineError>;

    /// Create a single-node OpenShift cluster
    async fn create_openshift(
        &self,
        ctx: &ContextArgs,
        args: &OpenshiftArgs,
    ) -> Result<EngineMetadata, EngineError>;

    /// Destroy an OpenShift cluster's infrastructure
    async fn destroy_openshift(&self, ctx: &ContextArgs) -> Result<(), EngineError>;
}
