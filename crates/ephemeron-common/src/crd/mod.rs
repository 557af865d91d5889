//! Custom Resource Definitions for Ephemeron
//!
//! Two cluster kinds share the same machine/cloud configuration blocks and
//! the same controller-owned status type, so the reconciliation core can be
//! written once and reused for both.

mod kind_cluster;
mod openshift_cluster;
mod types;

pub use kind_cluster::{KindCluster, KindClusterConfig, KindClusterSpec};
pub use openshift_cluster::{OpenshiftCluster, OpenshiftClusterConfig, OpenshiftClusterSpec};
pub use types::{
    Architecture, CloudConfig, CloudProvider, ClusterPhase, ClusterStatus, Condition,
    ConditionStatus, MachineConfig, SecretRef, TerminationPolicy,
};
