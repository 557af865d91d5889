//! Error types for the Ephemeron operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each error variant includes contextual information like resource names,
//! cluster kinds, and underlying causes.

use thiserror::Error;

/// Default context value when no specific resource is available
pub const UNKNOWN_RESOURCE: &str = "unknown";

/// Main error type for Ephemeron operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for CRD specs or required inputs
    ///
    /// Never retried automatically; the user must fix the configuration.
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
    },

    /// A conditional status patch lost an optimistic-concurrency race
    ///
    /// Recovered locally: the pass aborts and the next reconciliation
    /// re-fetches the record. Never surfaced in user-facing status.
    #[error("conflict: {resource} was modified concurrently")]
    Conflict {
        /// Name of the resource whose status patch was rejected
        resource: String,
    },

    /// Provisioning backend error
    #[error("backend {operation} failed for {resource} [{kind}]: {message}")]
    Backend {
        /// Name of the resource being provisioned or deprovisioned
        resource: String,
        /// Cluster kind tag (kind, openshift-snc)
        kind: String,
        /// The backend operation that failed (provision, deprovision)
        operation: String,
        /// Backend error text
        message: String,
    },

    /// The backend returned a metadata bundle without a usable kubeconfig
    #[error("backend returned empty kubeconfig for {resource}")]
    EmptyKubeconfig {
        /// Name of the resource that was being provisioned
        resource: String,
    },

    /// A lifecycle request was routed with a kind tag no driver handles
    #[error("unsupported cluster kind: {kind}")]
    UnsupportedKind {
        /// The unrecognized kind tag
        kind: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a validation error without resource context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_RESOURCE.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error with resource context
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a conflict error for the given resource
    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
        }
    }

    /// Create a backend error with full context
    pub fn backend(
        resource: impl Into<String>,
        kind: impl Into<String>,
        operation: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Backend {
            resource: resource.into(),
            kind: kind.into(),
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create an empty-kubeconfig error for the given resource
    pub fn empty_kubeconfig(resource: impl Into<String>) -> Self {
        Self::EmptyKubeconfig {
            resource: resource.into(),
        }
    }

    /// Create an unsupported-kind error
    pub fn unsupported_kind(kind: impl Into<String>) -> Self {
        Self::UnsupportedKind { kind: kind.into() }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, empty-kubeconfig, unsupported-kind, and serialization
    /// errors are not retryable (they require a config or code fix).
    /// Conflicts resolve themselves on the next pass. Backend errors may
    /// be transient. Kubernetes errors depend on the status code.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Retry on transient K8s errors (connection, timeout).
                // Don't retry on 4xx errors (validation, not found, etc.)
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Validation { .. } => false,
            Error::Conflict { .. } => true,
            Error::Backend { .. } => true,
            Error::EmptyKubeconfig { .. } => false,
            Error::UnsupportedKind { .. } => false,
            Error::Serialization { .. } => false,
        }
    }

    /// Get the resource name if this error is associated with one
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::Kube { .. } => None,
            Error::Validation { resource, .. } => Some(resource),
            Error::Conflict { resource } => Some(resource),
            Error::Backend { resource, .. } => Some(resource),
            Error::EmptyKubeconfig { resource } => Some(resource),
            Error::UnsupportedKind { .. } => None,
            Error::Serialization { .. } => None,
        }
    }
}
