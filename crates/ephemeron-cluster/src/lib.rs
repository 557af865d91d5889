//! Reconciliation core for Ephemeron cluster records
//!
//! This crate implements the convergence engine shared by both cluster
//! kinds: the record client (status persistence, finalizers, secret
//! materialization), the reconciliation adapter state machine, and the
//! reconcile driver plugged into the kube runtime controller.

pub mod adapter;
pub mod client;
pub mod controller;
pub mod finalizer;
pub mod record;
pub mod status;

#[cfg(test)]
pub mod testing;

pub use adapter::{Adapter, Flow};
pub use client::{KubeRecordClient, RecordClient};
pub use controller::{error_policy, reconcile, Context, RECONCILE_INTERVAL};
pub use record::{ClusterRecord, SecretArtifactName};

pub use ephemeron_common::{Error, Result};
