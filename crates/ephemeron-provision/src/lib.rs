//! Provisioning backend dispatch for Ephemeron
//!
//! This crate sits between the reconciliation core and the opaque
//! provisioning backend. It loads cloud credentials once, routes lifecycle
//! requests to the correct backend driver by cluster kind, translates
//! generic spec fields into backend-specific request structures, and
//! normalizes backend metadata into a uniform result shape.

pub mod cli;
pub mod credentials;
pub mod dispatch;
pub mod engine;
pub mod types;

pub use cli::MaptCli;
pub use credentials::CloudCredentials;
pub use dispatch::{MaptProvisioner, Provisioner};
pub use engine::{ContextArgs, EngineError, EngineMetadata, KindArgs, OpenshiftArgs, ProvisionEngine};
pub use types::{
    ClusterConfig, ClusterKind, ClusterRequest, ComputeRequest, ConnectionDetails,
    OpenshiftAccess, ProvisionOutput,
};
