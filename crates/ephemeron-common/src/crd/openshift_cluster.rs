//! OpenshiftCluster Custom Resource Definition
//!
//! An OpenshiftCluster is an ephemeral single-node OpenShift cluster
//! provisioned on a cloud spot instance. Compared to Kind clusters the
//! materialized access secret additionally carries admin credentials,
//! the console URL, and SSH connection details.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CloudConfig, ClusterStatus, MachineConfig, TerminationPolicy};

/// Specification for an OpenshiftCluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ephemeron.dev",
    version = "v1alpha1",
    kind = "OpenshiftCluster",
    plural = "openshiftclusters",
    shortname = "osc",
    status = "ClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.clusterReady"}"#,
    printcolumn = r#"{"name":"Price","type":"string","jsonPath":".status.averagePrice"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpenshiftClusterSpec {
    /// Cloud provider and credential configuration
    pub cloud_config: CloudConfig,

    /// Configuration for the spot machine backing the cluster
    pub machine_config: MachineConfig,

    /// Configuration for the OpenShift cluster itself
    pub openshift_cluster_config: OpenshiftClusterConfig,

    /// Name of the Secret that will store the access credentials for the
    /// provisioned cluster. When unset, a name is generated from the
    /// record name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_kubeconfig_secret_name: Option<String>,

    /// When and how the cluster should be terminated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_policy: Option<TerminationPolicy>,
}

/// Parameters for the OpenShift cluster itself
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenshiftClusterConfig {
    /// OpenShift version to install (e.g., "4.19.0")
    pub openshift_version: String,
}

impl OpenshiftClusterSpec {
    /// Validate the spec fields the schema cannot express
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.openshift_cluster_config.openshift_version.is_empty() {
            return Err(crate::Error::validation(
                "openshiftClusterConfig.openshiftVersion cannot be empty",
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
