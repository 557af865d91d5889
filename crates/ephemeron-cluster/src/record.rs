//! The record trait both cluster CRDs implement
//!
//! The original per-kind controllers were near-duplicates; abstracting the
//! record behind one trait lets a single adapter drive both kinds with one
//! consistent reconcile interval and one status-patch strategy.

use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use ephemeron_common::crd::{
    ClusterStatus, KindCluster, MachineConfig, OpenshiftCluster, TerminationPolicy,
};
use ephemeron_common::{Error, Result};
use ephemeron_provision::{ClusterConfig, ClusterKind, ClusterRequest};

/// Finalizer blocking KindCluster deletion until teardown completes
pub const KIND_CLUSTER_FINALIZER: &str = "ephemeron.dev/kind-teardown";

/// Finalizer blocking OpenshiftCluster deletion until teardown completes
pub const OPENSHIFT_CLUSTER_FINALIZER: &str = "ephemeron.dev/openshift-teardown";

/// Naming strategy for the materialized access secret
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecretArtifactName {
    /// The record spec names the secret explicitly
    Explicit(String),
    /// The store assigns a name from this prefix (`generateName`)
    Generated {
        /// Prefix for the server-generated name
        prefix: String,
    },
}

/// A declarative cluster record the reconciliation core can drive
pub trait ClusterRecord:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + std::fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    /// Kind tag routing this record to its backend driver
    fn cluster_kind() -> ClusterKind;

    /// The finalizer this controller owns for the record kind
    fn finalizer() -> &'static str;

    /// The record's observed status, if any has been persisted
    fn status(&self) -> Option<&ClusterStatus>;

    /// Mutable access to the record's status, defaulting it if unset
    fn status_mut(&mut self) -> &mut ClusterStatus;

    /// Machine configuration from the record spec
    fn machine_config(&self) -> &MachineConfig;

    /// Kind-specific cluster configuration from the record spec
    fn cluster_config(&self) -> ClusterConfig;

    /// Termination policy from the record spec, if any
    fn termination_policy(&self) -> Option<&TerminationPolicy>;

    /// Explicit output secret name from the record spec, if any
    fn output_secret_name(&self) -> Option<&str>;

    /// The backend session id, if one has been assigned
    fn provision_id(&self) -> Option<&str> {
        self.status().and_then(|s| s.provision_id())
    }

    /// Naming strategy for the materialized access secret
    fn secret_artifact_name(&self) -> SecretArtifactName {
        match self.output_secret_name() {
            Some(name) => SecretArtifactName::Explicit(name.to_string()),
            None => SecretArtifactName::Generated {
                prefix: format!("{}-kubeconfig-", self.name_any()),
            },
        }
    }

    /// Build the normalized lifecycle request for the dispatch layer
    ///
    /// Requires an assigned session id; the id is persisted before the
    /// first backend call so a crashed attempt reuses it.
    fn cluster_request(&self) -> Result<ClusterRequest> {
        let session_id = self
            .provision_id()
            .ok_or_else(|| Error::validation_for(self.name_any(), "missing or empty provision id"))?
            .to_string();
        Ok(ClusterRequest {
            name: self.name_any(),
            namespace: self.namespace().unwrap_or_default(),
            session_id,
            machine: self.machine_config().clone(),
            config: self.cluster_config(),
        })
    }
}

impl ClusterRecord for KindCluster {
    fn cluster_kind() -> ClusterKind {
        ClusterKind::Kind
    }

    fn finalizer() -> &'static str {
        KIND_CLUSTER_FINALIZER
    }

    fn status(&self) -> Option<&ClusterStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut ClusterStatus {
        self.status.get_or_insert_with(ClusterStatus::default)
    }

    fn machine_config(&self) -> &MachineConfig {
        &self.spec.machine_config
    }

    fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig::Kind {
            kubernetes_version: self.spec.kind_cluster_config.kubernetes_version.clone(),
        }
    }

    fn termination_policy(&self) -> Option<&TerminationPolicy> {
        self.spec.termination_policy.as_ref()
    }

    fn output_secret_name(&self) -> Option<&str> {
        self.spec.output_kubeconfig_secret_name.as_deref()
    }
}

impl ClusterRecord for OpenshiftCluster {
    fn cluster_kind() -> ClusterKind {
        ClusterKind::OpenshiftSnc
    }

    fn finalizer() -> &'static str {
        OPENSHIFT_CLUSTER_FINALIZER
    }

    fn status(&self) -> Option<&ClusterStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut ClusterStatus {
        self.status.get_or_insert_with(ClusterStatus::default)
    }

    fn machine_config(&self) -> &MachineConfig {
        &self.spec.machine_config
    }

    fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig::OpenshiftSnc {
            openshift_version: self.spec.openshift_cluster_config.openshift_version.clone(),
        }
    }

    fn termination_policy(&self) -> Option<&TerminationPolicy> {
        self.spec.termination_policy.as_ref()
    }

    fn output_secret_name(&self) -> Option<&str> {
        self.spec.output_kubeconfig_secret_name.as_deref()
    }
}
