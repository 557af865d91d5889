//! Supporting types shared by the Ephemeron cluster CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of an ephemeral cluster record
///
/// Phases are monotonic within a provisioning attempt:
/// Pending -> Provisioning -> {Running, Failed}. Deletion forces Deleting
/// regardless of the prior phase.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ClusterPhase {
    /// Record has been created but provisioning has not started
    #[default]
    Pending,
    /// The backend is creating the cluster infrastructure
    Provisioning,
    /// The cluster is provisioned and accessible
    Running,
    /// Provisioning or deprovisioning failed; requires external reset
    Failed,
    /// Deletion was requested and teardown is in progress
    Deleting,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Running => write!(f, "Running"),
            Self::Failed => write!(f, "Failed"),
            Self::Deleting => write!(f, "Deleting"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Controller-owned status shared by both cluster kinds
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Current phase of the cluster lifecycle
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Human-readable status message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions representing the cluster state, unique by type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Opaque backend session identifier, assigned once and immutable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provision_id: Option<String>,

    /// Name of the Secret where the cluster's kubeconfig is stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_secret_name: Option<String>,

    /// Whether the cluster is fully provisioned and accessible
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cluster_ready: bool,

    /// Average acquisition price of the spot instance(s), formatted with currency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_price: Option<String>,

    /// When the cluster is scheduled to be terminated, from the termination policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_timestamp: Option<DateTime<Utc>>,

    /// Last time the controller updated this status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
}

impl ClusterStatus {
    /// Set the phase and return self for chaining
    pub fn phase(&mut self, phase: ClusterPhase) -> &mut Self {
        self.phase = phase;
        self
    }

    /// Set the message and return self for chaining
    pub fn message(&mut self, msg: impl Into<String>) -> &mut Self {
        self.message = Some(msg.into());
        self
    }

    /// Set or update a condition, unique by type
    ///
    /// Re-applying an identical (type, status, reason, message) condition is
    /// a no-op that preserves the existing transition time. Any field change
    /// replaces the condition and bumps `lastTransitionTime`.
    pub fn condition(&mut self, condition: Condition) -> &mut Self {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            Some(existing) => {
                let changed = existing.status != condition.status
                    || existing.reason != condition.reason
                    || existing.message != condition.message;
                if changed {
                    *existing = condition;
                }
            }
            None => self.conditions.push(condition),
        }
        self
    }

    /// Assign the backend session id if none is set yet
    ///
    /// The id is immutable after assignment; later calls are ignored.
    pub fn assign_provision_id(&mut self, id: impl Into<String>) -> &mut Self {
        let id = id.into();
        if self.provision_id.as_deref().is_none_or(str::is_empty) && !id.is_empty() {
            self.provision_id = Some(id);
        }
        self
    }

    /// The backend session id, if one has been assigned
    pub fn provision_id(&self) -> Option<&str> {
        self.provision_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Supported cloud providers
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudProvider {
    /// Amazon Web Services (currently the only supported provider)
    #[default]
    Aws,
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aws => write!(f, "AWS"),
        }
    }
}

/// Reference to a Secret in the same namespace as the record
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SecretRef {
    /// Name of the referenced Secret
    pub name: String,
}

/// Cloud provider selection and credential reference
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    /// Cloud provider name; designed for future extension
    #[serde(default)]
    pub provider: CloudProvider,

    /// Secret containing provider credentials (access-key, secret-key,
    /// region, bucket)
    pub credentials_secret_ref: SecretRef,
}

/// Machine architecture for the provisioned instance
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Architecture {
    /// 64-bit x86
    #[default]
    #[serde(rename = "x86_64")]
    X86_64,
    /// 64-bit ARM
    #[serde(rename = "arm64")]
    Arm64,
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X86_64 => write!(f, "x86_64"),
            Self::Arm64 => write!(f, "arm64"),
        }
    }
}

/// Configuration for the spot machine backing the cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfig {
    /// Instance architecture
    #[serde(default)]
    pub architecture: Architecture,

    /// Number of vCPUs for the instance
    #[serde(default)]
    pub cpus: i32,

    /// Amount of RAM for the instance in GiB
    #[serde(default, rename = "memoryGiB")]
    pub memory_gib: i32,

    /// Whether the instance should have GPU support
    ///
    /// When true, the instance type is selected from the fixed allow-list of
    /// GPU-capable shapes instead of the cpus/memoryGiB values.
    #[serde(default)]
    pub gpu: bool,

    /// Whether the instance should have nested virtualization support
    #[serde(default)]
    pub nested_virtualization_enabled: bool,

    /// Whether to use spot instances
    #[serde(default = "default_true")]
    pub use_spot_instances: bool,

    /// Percentage added on top of the calculated spot price to increase the
    /// chances of acquiring the machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_price_increase_percentage: Option<i32>,

    /// Tags applied to the cloud resources created by the backend
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub tags: std::collections::BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// Automatic deletion parameters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TerminationPolicy {
    /// Time-to-live in seconds, measured from when the cluster becomes
    /// Running. Evaluated by comparing against the recorded expiration
    /// timestamp on each reconciliation pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after_seconds: Option<i64>,
}
