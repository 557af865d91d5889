//! Cloud credentials for the provisioning backend
//!
//! Credentials are read once from a fixed-name secret at provisioner
//! construction and passed explicitly into each dispatch call. They are
//! immutable input for the lifetime of a provisioning attempt.

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

use ephemeron_common::{
    Error, Result, CLOUD_CREDENTIALS_SECRET_NAME, EPHEMERON_SYSTEM_NAMESPACE,
};

use crate::types::ClusterKind;

/// AWS credentials and backend state location
#[derive(Clone, Debug, PartialEq)]
pub struct CloudCredentials {
    /// AWS access key ID
    pub access_key_id: String,
    /// AWS secret access key
    pub secret_access_key: String,
    /// AWS region
    pub region: String,
    /// S3 bucket name holding the backend's provisioning state
    pub bucket: String,
}

impl CloudCredentials {
    /// Load credentials from the fixed operator secret
    ///
    /// Reads `ephemeron-cloud-credentials` in `ephemeron-system` exactly
    /// once. Missing or empty keys fail fast before any provisioning
    /// attempt starts.
    pub async fn load(client: &Client) -> Result<Self> {
        let api: Api<Secret> = Api::namespaced(client.clone(), EPHEMERON_SYSTEM_NAMESPACE);
        let secret = api.get(CLOUD_CREDENTIALS_SECRET_NAME).await.map_err(|e| {
            match e {
                kube::Error::Api(ae) if ae.code == 404 => Error::validation(format!(
                    "cloud credentials secret '{CLOUD_CREDENTIALS_SECRET_NAME}' not found in namespace '{EPHEMERON_SYSTEM_NAMESPACE}'"
                )),
                other => other.into(),
            }
        })?;
        Self::from_secret(&secret)
    }

    /// Extract and validate credentials from a secret's data
    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let read = |key: &str| -> String {
            secret
                .data
                .as_ref()
                .and_then(|d| d.get(key))
                .map(|v| String::from_utf8_lossy(&v.0).into_owned())
                .unwrap_or_default()
        };

        let creds = Self {
            access_key_id: read("access-key"),
            secret_access_key: read("secret-key"),
            region: read("region"),
            bucket: read("bucket"),
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Validate that every required key is present and non-empty
    pub fn validate(&self) -> Result<()> {
        if self.access_key_id.is_empty() {
            return Err(Error::validation("missing cloud credential: access-key"));
        }
        if self.secret_access_key.is_empty() {
            return Err(Error::validation("missing cloud credential: secret-key"));
        }
        if self.region.is_empty() {
            return Err(Error::validation("missing cloud credential: region"));
        }
        if self.bucket.is_empty() {
            return Err(Error::validation("missing cloud credential: bucket"));
        }
        Ok(())
    }

    /// Backend state location for one provisioning session
    ///
    /// The location is stable for the lifetime of the session so a crashed
    /// provision can be deprovisioned later from the same state.
    pub fn backed_url(&self, kind: ClusterKind, session_id: &str) -> String {
        format!("s3://{}/{}/{}", self.bucket, kind, session_id)
    }
}
