//! Request and result types for the provisioning dispatch layer

use ephemeron_common::crd::MachineConfig;
use ephemeron_common::Error;

/// AWS instance shapes eligible for GPU-tagged requests
///
/// GPU requests bypass cpus/memoryGiB selection entirely and resolve to
/// this fixed allow-list.
pub const SUPPORTED_AWS_GPU_SHAPES: &[&str] = &[
    // G6e
    "g6e.12xlarge",
    "g6e.16xlarge",
    "g6e.24xlarge",
    "g6e.48xlarge",
    // G6
    "g6.12xlarge",
    "g6.16xlarge",
    "g6.24xlarge",
    "g6.48xlarge",
    // G5
    "g5.12xlarge",
    "g5.16xlarge",
    "g5.48xlarge",
    // P4 (A100)
    "p4d.24xlarge",
    "p4de.24xlarge",
    // P5 (H100)
    "p5.48xlarge",
    "p5e.48xlarge",
    "p5en.48xlarge",
];

/// Kubernetes versions the Kind backend action supports
pub const SUPPORTED_KIND_K8S_VERSIONS: &[&str] =
    &["v1.29.12", "v1.30.8", "v1.31.4", "v1.32.1", "v1.33.0"];

/// OpenShift versions the single-node backend action supports
pub const SUPPORTED_OPENSHIFT_VERSIONS: &[&str] = &["4.19.0"];

/// Tag identifying which backend driver handles a lifecycle request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClusterKind {
    /// Kind cluster on a spot instance
    Kind,
    /// Single-node OpenShift cluster on a spot instance
    OpenshiftSnc,
}

impl std::fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kind => write!(f, "kind"),
            Self::OpenshiftSnc => write!(f, "openshift-snc"),
        }
    }
}

impl std::str::FromStr for ClusterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kind" => Ok(Self::Kind),
            "openshift-snc" => Ok(Self::OpenshiftSnc),
            other => Err(Error::unsupported_kind(other)),
        }
    }
}

/// Kind-specific cluster configuration carried alongside the generic fields
#[derive(Clone, Debug, PartialEq)]
pub enum ClusterConfig {
    /// Kind cluster parameters
    Kind {
        /// Kubernetes version for the Kind cluster
        kubernetes_version: String,
    },
    /// Single-node OpenShift parameters
    OpenshiftSnc {
        /// OpenShift version to install
        openshift_version: String,
    },
}

impl ClusterConfig {
    /// The kind tag for this configuration
    pub fn kind(&self) -> ClusterKind {
        match self {
            Self::Kind { .. } => ClusterKind::Kind,
            Self::OpenshiftSnc { .. } => ClusterKind::OpenshiftSnc,
        }
    }
}

/// A normalized lifecycle request for one cluster record
///
/// Built by the reconciliation core from the record's spec and status; the
/// dispatch layer translates it into backend-specific request structures.
#[derive(Clone, Debug)]
pub struct ClusterRequest {
    /// Record name (used as the backend project name)
    pub name: String,
    /// Record namespace
    pub namespace: String,
    /// Backend session id assigned to the record
    pub session_id: String,
    /// Machine configuration from the record spec
    pub machine: MachineConfig,
    /// Kind-specific configuration
    pub config: ClusterConfig,
}

impl ClusterRequest {
    /// The kind tag for this request
    pub fn kind(&self) -> ClusterKind {
        self.config.kind()
    }
}

/// Compute shape selection for the backend
#[derive(Clone, Debug, PartialEq)]
pub enum ComputeRequest {
    /// Resolve from a fixed list of eligible instance shapes
    Shapes(Vec<String>),
    /// Resolve by explicit CPU and memory values
    Resources {
        /// Number of vCPUs
        cpus: i32,
        /// RAM in GiB
        memory_gib: i32,
    },
}

/// Select the compute request for a machine configuration
///
/// GPU-tagged machines resolve to the fixed allow-list of GPU-capable
/// shapes; everything else passes explicit CPU/memory values.
pub fn select_compute(machine: &MachineConfig) -> ComputeRequest {
    if machine.gpu {
        ComputeRequest::Shapes(
            SUPPORTED_AWS_GPU_SHAPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    } else {
        ComputeRequest::Resources {
            cpus: machine.cpus,
            memory_gib: machine.memory_gib,
        }
    }
}

/// SSH connection details for the provisioned machine
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionDetails {
    /// SSH username
    pub username: String,
    /// SSH private key material
    pub private_key: String,
    /// Host address
    pub host: String,
}

/// OpenShift-specific access information
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OpenshiftAccess {
    /// Password for the kubeadmin user
    pub kubeadmin_password: String,
    /// Web console URL
    pub console_url: String,
}

/// Uniform provisioning result shape across all cluster kinds
///
/// Callers must validate that `kubeconfig` is non-empty before treating
/// provisioning as successful.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProvisionOutput {
    /// Kubeconfig blob granting access to the provisioned cluster
    pub kubeconfig: String,
    /// Average acquisition price of the spot instance
    pub average_price: f64,
    /// SSH connection details for the backing machine
    pub connection: ConnectionDetails,
    /// Present for cluster kinds that expose admin credentials and a console
    pub openshift: Option<OpenshiftAccess>,
}
