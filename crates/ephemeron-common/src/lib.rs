//! Common types for Ephemeron: CRDs, errors, and shared constants

#![deny(missing_docs)]

pub mod crd;
pub mod error;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace for Ephemeron system resources (credentials, operator)
pub const EPHEMERON_SYSTEM_NAMESPACE: &str = "ephemeron-system";

/// Name of the cloud credentials secret read at provisioner construction
pub const CLOUD_CREDENTIALS_SECRET_NAME: &str = "ephemeron-cloud-credentials";

/// Field manager name used for all patches issued by the operator
pub const FIELD_MANAGER: &str = "ephemeron-controller";

/// Format a spot acquisition price for status reporting
pub fn format_price(price: f64) -> String {
    format!("{price:.4} USD/hour")
}
