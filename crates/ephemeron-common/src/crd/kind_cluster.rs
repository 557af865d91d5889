//! KindCluster Custom Resource Definition
//!
//! A KindCluster is an ephemeral Kind cluster provisioned on a cloud spot
//! instance. The record describes the machine and cluster configuration;
//! the controller drives the provisioning backend and reports back through
//! the shared [`ClusterStatus`].

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CloudConfig, ClusterStatus, MachineConfig, TerminationPolicy};

/// Specification for a KindCluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ephemeron.dev",
    version = "v1alpha1",
    kind = "KindCluster",
    plural = "kindclusters",
    shortname = "kc",
    status = "ClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.clusterReady"}"#,
    printcolumn = r#"{"name":"Price","type":"string","jsonPath":".status.averagePrice"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KindClusterSpec {
    /// Cloud provider and credential configuration
    pub cloud_config: CloudConfig,

    /// Configuration for the spot machine backing the cluster
    pub machine_config: MachineConfig,

    /// Configuration for the Kind cluster itself
    pub kind_cluster_config: KindClusterConfig,

    /// Name of the Secret that will store the kubeconfig for the
    /// provisioned cluster. When unset, a name is generated from the
    /// record name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_kubeconfig_secret_name: Option<String>,

    /// When and how the cluster should be terminated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_policy: Option<TerminationPolicy>,
}

/// Parameters for the Kind cluster itself
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KindClusterConfig {
    /// Kubernetes version for the Kind cluster (e.g., "v1.32.0")
    pub kubernetes_version: String,
}

impl KindClusterSpec {
    /// Validate the spec fields the schema cannot express
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.kind_cluster_config.kubernetes_version.is_empty() {
            return Err(crate::Error::validation(
                "kindClusterConfig.kubernetesVersion cannot be empty",
            ));
        }
        if self.cloud_config.credentials_secret_ref.name.is_empty() {
            return Err(crate::Error::validation(
                "cloudConfig.credentialsSecretRef.name cannot be empty",
            ));
        }
        Ok(())
    }
}
