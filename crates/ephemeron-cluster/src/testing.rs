//! In-memory test doubles for the reconciliation core
//!
//! [`FakeRecordClient`] behaves like the store: it applies status merge
//! patches, honors the resourceVersion precondition, and tracks created
//! secrets. [`MockProvisioner`] is a closure-driven stand-in for the
//! dispatch layer with call counting.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use serde_json::Value;

use ephemeron_common::crd::{
    CloudConfig, KindCluster, KindClusterConfig, KindClusterSpec, MachineConfig, SecretRef,
};
use ephemeron_common::{Error, Result};
use ephemeron_provision::{
    ClusterRequest, ConnectionDetails, Provisioner, ProvisionOutput,
};

use crate::client::RecordClient;
use crate::record::{ClusterRecord, SecretArtifactName};

/// A secret created through the fake client
pub struct CreatedSecret {
    /// Stored secret name (explicit or server-generated)
    pub name: String,
    /// Data keys the secret carries
    pub keys: Vec<String>,
}

/// In-memory store for a single record
pub struct FakeRecordClient<K: ClusterRecord> {
    stored: Mutex<K>,
    /// Secrets created through this client
    pub created_secrets: Mutex<Vec<CreatedSecret>>,
    /// Names `secret_exists` reports as present
    pub existing_secrets: Mutex<HashSet<String>>,
}

impl<K: ClusterRecord> FakeRecordClient<K> {
    /// Create a fake store seeded with the given record
    pub fn new(mut record: K) -> Self {
        if record.resource_version().is_none() {
            record.meta_mut().resource_version = Some("1".to_string());
        }
        Self {
            stored: Mutex::new(record),
            created_secrets: Mutex::new(Vec::new()),
            existing_secrets: Mutex::new(HashSet::new()),
        }
    }

    /// The record as currently persisted
    pub fn stored(&self) -> K {
        self.stored.lock().unwrap().clone()
    }
}

fn bump(resource_version: Option<String>) -> String {
    let current: u64 = resource_version
        .as_deref()
        .and_then(|rv| rv.parse().ok())
        .unwrap_or(0);
    (current + 1).to_string()
}

#[async_trait]
impl<K: ClusterRecord> RecordClient<K> for FakeRecordClient<K> {
    async fn patch_status(&self, record: &K, status_patch: Value) -> Result<String> {
        let mut stored = self.stored.lock().unwrap();

        // Optimistic concurrency: the caller's view must match the store
        let stored_rv = stored.resource_version().unwrap_or_default();
        let caller_rv = record.resource_version().unwrap_or_default();
        if stored_rv != caller_rv {
            return Err(Error::conflict(record.name_any()));
        }

        let mut value =
            serde_json::to_value(&*stored).map_err(|e| Error::serialization(e.to_string()))?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| Error::serialization("record is not an object"))?;
        let status = object
            .entry("status")
            .or_insert_with(|| Value::Object(Default::default()));
        let status_map = status
            .as_object_mut()
            .ok_or_else(|| Error::serialization("status is not an object"))?;

        if let Value::Object(patch) = status_patch {
            for (key, patch_value) in patch {
                if patch_value.is_null() {
                    status_map.remove(&key);
                } else {
                    status_map.insert(key, patch_value);
                }
            }
        }

        let new_rv = bump(Some(stored_rv));
        value["metadata"]["resourceVersion"] = Value::String(new_rv.clone());
        *stored = serde_json::from_value(value).map_err(|e| Error::serialization(e.to_string()))?;
        Ok(new_rv)
    }

    async fn replace_finalizers(&self, _record: &K, finalizers: Vec<String>) -> Result<String> {
        let mut stored = self.stored.lock().unwrap();
        let new_rv = bump(stored.resource_version());
        let meta = stored.meta_mut();
        meta.finalizers = Some(finalizers);
        meta.resource_version = Some(new_rv.clone());
        Ok(new_rv)
    }

    async fn create_owned_secret(
        &self,
        _owner: &K,
        name: &SecretArtifactName,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<String> {
        let stored_name = match name {
            SecretArtifactName::Explicit(explicit) => {
                // AlreadyExists race resolves to success for explicit names
                if self.existing_secrets.lock().unwrap().contains(explicit) {
                    return Ok(explicit.clone());
                }
                explicit.clone()
            }
            SecretArtifactName::Generated { prefix } => format!("{prefix}x7f2q"),
        };

        self.created_secrets.lock().unwrap().push(CreatedSecret {
            name: stored_name.clone(),
            keys: data.keys().cloned().collect(),
        });
        self.existing_secrets
            .lock()
            .unwrap()
            .insert(stored_name.clone());
        Ok(stored_name)
    }

    async fn secret_exists(&self, _namespace: &str, name: &str) -> Result<bool> {
        Ok(self.existing_secrets.lock().unwrap().contains(name))
    }
}

type ProvisionHandler = Box<dyn Fn(&ClusterRequest) -> Result<ProvisionOutput> + Send + Sync>;
type DeprovisionHandler = Box<dyn Fn(&ClusterRequest) -> Result<()> + Send + Sync>;

/// Closure-driven Provisioner stand-in with call counting
#[derive(Default)]
pub struct MockProvisioner {
    on_provision: Option<ProvisionHandler>,
    on_deprovision: Option<DeprovisionHandler>,
    provision_calls: AtomicUsize,
    deprovision_calls: AtomicUsize,
}

impl MockProvisioner {
    /// A mock whose provision calls run the given handler
    pub fn provisioning(
        handler: impl Fn(&ClusterRequest) -> Result<ProvisionOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_provision: Some(Box::new(handler)),
            ..Default::default()
        }
    }

    /// A mock whose deprovision calls run the given handler
    pub fn deprovisioning(
        handler: impl Fn(&ClusterRequest) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_deprovision: Some(Box::new(handler)),
            ..Default::default()
        }
    }

    /// Number of provision calls observed
    pub fn provision_count(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }

    /// Number of deprovision calls observed
    pub fn deprovision_count(&self) -> usize {
        self.deprovision_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn provision(&self, request: &ClusterRequest) -> Result<ProvisionOutput> {
        self.provision_calls.fetch_add(1, Ordering::SeqCst);
        match &self.on_provision {
            Some(handler) => handler(request),
            None => Err(Error::backend(
                &request.name,
                request.kind().to_string(),
                "provision",
                "mock provision handler was not configured for this test",
            )),
        }
    }

    async fn deprovision(&self, request: &ClusterRequest) -> Result<()> {
        self.deprovision_calls.fetch_add(1, Ordering::SeqCst);
        match &self.on_deprovision {
            Some(handler) => handler(request),
            None => Err(Error::backend(
                &request.name,
                request.kind().to_string(),
                "deprovision",
                "mock deprovision handler was not configured for this test",
            )),
        }
    }
}

/// A fresh KindCluster record fixture
pub fn kind_record(name: &str) -> KindCluster {
    let mut record = KindCluster::new(
        name,
        KindClusterSpec {
            cloud_config: CloudConfig {
                provider: Default::default(),
                credentials_secret_ref: SecretRef {
                    name: "aws-creds".to_string(),
                },
            },
            machine_config: MachineConfig {
                cpus: 8,
                memory_gib: 32,
                ..Default::default()
            },
            kind_cluster_config: KindClusterConfig {
                kubernetes_version: "v1.32.1".to_string(),
            },
            output_kubeconfig_secret_name: None,
            termination_policy: None,
        },
    );
    record.metadata.namespace = Some("default".to_string());
    record.metadata.uid = Some("0000-uid".to_string());
    record.metadata.resource_version = Some("1".to_string());
    record
}

/// Mark a record fixture as deletion-requested
pub fn deleting(mut record: KindCluster) -> KindCluster {
    record.metadata.deletion_timestamp = Some(
        k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
    );
    record
}

/// A successful provisioning output with the given kubeconfig blob
pub fn provision_output(kubeconfig: &str) -> ProvisionOutput {
    ProvisionOutput {
        kubeconfig: kubeconfig.to_string(),
        average_price: 0.0421,
        connection: ConnectionDetails {
            username: "ec2-user".to_string(),
            private_key: "PEM".to_string(),
            host: "198.51.100.7".to_string(),
        },
        openshift: None,
    }
}
