//! Store operations for cluster records
//!
//! All Kubernetes API access for the reconciliation core goes through the
//! [`RecordClient`] trait, so the adapter can be tested against an
//! in-memory fake while production uses the real kube client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use tracing::debug;

use ephemeron_common::{Error, Result};

use crate::record::{ClusterRecord, SecretArtifactName};

/// Store operations the reconciliation core needs for one record kind
#[async_trait]
pub trait RecordClient<K: ClusterRecord>: Send + Sync {
    /// Apply a conditional merge patch against the record's status subresource
    ///
    /// The patch carries the record's resourceVersion as a precondition;
    /// a concurrent modification fails with [`Error::Conflict`]. Returns
    /// the resourceVersion after the patch so the caller can keep its
    /// in-memory copy current.
    async fn patch_status(&self, record: &K, status_patch: serde_json::Value) -> Result<String>;

    /// Persist a new finalizer list on the record
    ///
    /// Returns the resourceVersion after the patch.
    async fn replace_finalizers(&self, record: &K, finalizers: Vec<String>) -> Result<String>;

    /// Create a Secret owned by the record, returning the stored name
    ///
    /// An AlreadyExists race on an explicitly-named secret is treated as
    /// success, not an error.
    async fn create_owned_secret(
        &self,
        owner: &K,
        name: &SecretArtifactName,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<String>;

    /// Check whether a Secret exists in the given namespace
    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// Production [`RecordClient`] backed by the kube client
pub struct KubeRecordClient {
    client: Client,
}

impl KubeRecordClient {
    /// Create a new record client wrapping the given kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn records<K: ClusterRecord>(&self, record: &K) -> Api<K> {
        let namespace = record.namespace().unwrap_or_default();
        Api::namespaced(self.client.clone(), &namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map an optimistic-concurrency failure to [`Error::Conflict`]
fn conflict_or(err: kube::Error, resource: &str) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => Error::conflict(resource),
        other => other.into(),
    }
}

fn owner_reference<K: ClusterRecord>(owner: &K) -> OwnerReference {
    OwnerReference {
        api_version: K::api_version(&()).into_owned(),
        kind: K::kind(&()).into_owned(),
        name: owner.name_any(),
        uid: owner.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(false),
    }
}

#[async_trait]
impl<K: ClusterRecord> RecordClient<K> for KubeRecordClient {
    async fn patch_status(&self, record: &K, status_patch: serde_json::Value) -> Result<String> {
        let name = record.name_any();
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": record.resource_version() },
            "status": status_patch,
        });

        let updated = self
            .records(record)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| conflict_or(e, &name))?;

        Ok(updated.resource_version().unwrap_or_default())
    }

    async fn replace_finalizers(&self, record: &K, finalizers: Vec<String>) -> Result<String> {
        let name = record.name_any();
        let patch = serde_json::json!({
            "metadata": { "finalizers": finalizers },
        });

        let updated = self
            .records(record)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        Ok(updated.resource_version().unwrap_or_default())
    }

    async fn create_owned_secret(
        &self,
        owner: &K,
        name: &SecretArtifactName,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<String> {
        let namespace = owner.namespace().unwrap_or_default();
        let mut metadata = ObjectMeta {
            namespace: Some(namespace.clone()),
            owner_references: Some(vec![owner_reference(owner)]),
            ..Default::default()
        };
        match name {
            SecretArtifactName::Explicit(explicit) => metadata.name = Some(explicit.clone()),
            SecretArtifactName::Generated { prefix } => {
                metadata.generate_name = Some(prefix.clone())
            }
        }

        let secret = Secret {
            metadata,
            type_: Some("Opaque".to_string()),
            data: Some(data.into_iter().map(|(k, v)| (k, ByteString(v))).collect()),
            ..Default::default()
        };

        match self
            .secrets(&namespace)
            .create(&PostParams::default(), &secret)
            .await
        {
            Ok(created) => Ok(created.name_any()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => match name {
                SecretArtifactName::Explicit(explicit) => {
                    debug!(secret = %explicit, "access secret already exists");
                    Ok(explicit.clone())
                }
                SecretArtifactName::Generated { .. } => Err(kube::Error::Api(ae).into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        match self.secrets(namespace).get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
