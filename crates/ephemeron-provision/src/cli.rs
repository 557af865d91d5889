//! Production backend engine wrapping the `mapt` CLI
//!
//! Backend calls are long-running external commands: creates can take tens
//! of minutes, destroys somewhat less. Every execution has a deadline and
//! captures stderr for error reporting. Connection details are exchanged
//! through a per-call output directory that is cleaned up on drop.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::credentials::CloudCredentials;
use crate::engine::{
    ContextArgs, EngineError, EngineMetadata, KindArgs, OpenshiftArgs, ProvisionEngine,
};
use crate::types::ComputeRequest;

/// Default backend binary name, resolved through PATH
const DEFAULT_BINARY: &str = "mapt";

/// Environment variable overriding the backend binary location
const BINARY_ENV: &str = "EPHEMERON_MAPT_BINARY";

/// Deadline for create commands
const CREATE_TIMEOUT: Duration = Duration::from_secs(90 * 60);

/// Deadline for destroy commands
const DESTROY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// CLI-backed implementation of the provisioning engine
pub struct MaptCli {
    binary: PathBuf,
    credentials: CloudCredentials,
}

impl MaptCli {
    /// Create a CLI engine using the given credentials
    ///
    /// The binary location can be overridden with `EPHEMERON_MAPT_BINARY`.
    pub fn new(credentials: CloudCredentials) -> Self {
        let binary = std::env::var(BINARY_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_BINARY));
        Self {
            binary,
            credentials,
        }
    }

    /// Run one backend command to completion under a deadline
    async fn run(&self, args: &[String], deadline: Duration) -> Result<(), EngineError> {
        debug!(binary = %self.binary.display(), ?args, "running backend command");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .env("AWS_ACCESS_KEY_ID", &self.credentials.access_key_id)
            .env("AWS_SECRET_ACCESS_KEY", &self.credentials.secret_access_key)
            .env("AWS_DEFAULT_REGION", &self.credentials.region)
            .kill_on_drop(true);

        let output = tokio::time::timeout(deadline, cmd.output())
            .await
            .map_err(|_| EngineError::Timeout(deadline))?
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::CommandFailed(format!(
                "exit status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ProvisionEngine for MaptCli {
    async fn create_kind(
        &self,
        ctx: &ContextArgs,
        args: &KindArgs,
    ) -> Result<EngineMetadata, EngineError> {
        let output_dir = OutputDir::new(&ctx.project_name)?;
        let cli_args = create_kind_args(ctx, args, output_dir.path());
        info!(project = %ctx.project_name, "creating Kind cluster via backend");
        self.run(&cli_args, CREATE_TIMEOUT).await?;
        read_metadata(output_dir.path(), false)
    }

    async fn destroy_kind(&self, ctx: &ContextArgs) -> Result<(), EngineError> {
        info!(project = %ctx.project_name, "destroying Kind cluster via backend");
        self.run(&destroy_args("kind", ctx), DESTROY_TIMEOUT).await
    }

    async fn create_openshift(
        &self,
        ctx: &ContextArgs,
        args: &OpenshiftArgs,
    ) -> Result<EngineMetadata, EngineError> {
        let output_dir = OutputDir::new(&ctx.project_name)?;
        let cli_args = create_openshift_args(ctx, args, output_dir.path());
        info!(project = %ctx.project_name, "creating OpenShift cluster via backend");
        self.run(&cli_args, CREATE_TIMEOUT).await?;
        read_metadata(output_dir.path(), true)
    }

    async fn destroy_openshift(&self, ctx: &ContextArgs) -> Result<(), EngineError> {
        info!(project = %ctx.project_name, "destroying OpenShift cluster via backend");
        self.run(&destroy_args("openshift-snc", ctx), DESTROY_TIMEOUT)
            .await
    }
}

/// RAII wrapper for the per-call connection-details directory
struct OutputDir {
    path: PathBuf,
}

impl OutputDir {
    fn new(prefix: &str) -> Result<Self, EngineError> {
        let path = std::env::temp_dir().join(format!("ephemeron-{}-{}", prefix, std::process::id()));
        // Clean up any stale directory from a previous crashed run
        if path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "failed to clean stale output directory");
            }
        }
        std::fs::create_dir_all(&path).map_err(|e| {
            EngineError::Spawn(format!(
                "failed to create output directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to clean up output directory");
        }
    }
}

fn context_flags(ctx: &ContextArgs) -> Vec<String> {
    let mut flags = vec![
        "--project-name".to_string(),
        ctx.project_name.clone(),
        "--backed-url".to_string(),
        ctx.backed_url.clone(),
    ];
    if let Some(rate) = ctx.spot_price_increase_rate {
        flags.push("--spot-increase-rate".to_string());
        flags.push(rate.to_string());
    }
    if !ctx.tags.is_empty() {
        flags.push("--tags".to_string());
        flags.push(format_tags(&ctx.tags));
    }
    flags
}

fn compute_flags(compute: &ComputeRequest) -> Vec<String> {
    match compute {
        ComputeRequest::Shapes(shapes) => {
            vec!["--instance-types".to_string(), shapes.join(",")]
        }
        ComputeRequest::Resources { cpus, memory_gib } => vec![
            "--cpus".to_string(),
            cpus.to_string(),
            "--memory".to_string(),
            memory_gib.to_string(),
        ],
    }
}

fn create_kind_args(ctx: &ContextArgs, args: &KindArgs, output_dir: &Path) -> Vec<String> {
    let mut cli = vec![
        "aws".to_string(),
        "kind".to_string(),
        "create".to_string(),
    ];
    cli.extend(context_flags(ctx));
    cli.push("--version".to_string());
    cli.push(args.version.clone());
    cli.push("--arch".to_string());
    cli.push(args.arch.to_string());
    cli.extend(compute_flags(&args.compute));
    if args.spot {
        cli.push("--spot".to_string());
    }
    cli.push("--conn-details-output".to_string());
    cli.push(output_dir.display().to_string());
    cli
}

fn create_openshift_args(ctx: &ContextArgs, args: &OpenshiftArgs, output_dir: &Path) -> Vec<String> {
    let mut cli = vec![
        "aws".to_string(),
        "openshift-snc".to_string(),
        "create".to_string(),
    ];
    cli.extend(context_flags(ctx));
    cli.push("--version".to_string());
    cli.push(args.version.clone());
    cli.push("--arch".to_string());
    cli.push(args.arch.to_string());
    cli.extend(compute_flags(&args.compute));
    cli.push("--pull-secret-file".to_string());
    cli.push(args.pull_secret_file.display().to_string());
    if args.spot {
        cli.push("--spot".to_string());
    }
    cli.push("--conn-details-output".to_string());
    cli.push(output_dir.display().to_string());
    cli
}

fn destroy_args(action: &str, ctx: &ContextArgs) -> Vec<String> {
    let mut cli = vec![
        "aws".to_string(),
        action.to_string(),
        "destroy".to_string(),
        "--project-name".to_string(),
        ctx.project_name.clone(),
        "--backed-url".to_string(),
        ctx.backed_url.clone(),
    ];
    if ctx.force_destroy {
        cli.push("--force-destroy".to_string());
    }
    cli
}

fn format_tags(tags: &BTreeMap<String, String>) -> String {
    tags.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Read the connection-details artifacts the backend wrote
fn read_metadata(dir: &Path, openshift: bool) -> Result<EngineMetadata, EngineError> {
    let required = |name: &str| -> Result<String, EngineError> {
        std::fs::read_to_string(dir.join(name))
            .map(|s| s.trim().to_string())
            .map_err(|_| EngineError::MissingOutput(name.to_string()))
    };
    let optional = |name: &str| -> Option<String> {
        std::fs::read_to_string(dir.join(name))
            .ok()
            .map(|s| s.trim().to_string())
    };

    Ok(EngineMetadata {
        kubeconfig: required("kubeconfig")?,
        username: optional("username").unwrap_or_default(),
        private_key: optional("id_rsa").unwrap_or_default(),
        host: optional("host").unwrap_or_default(),
        spot_price: optional("spot-price").and_then(|s| s.parse().ok()),
        kubeadmin_password: if openshift {
            optional("kubeadmin-password")
        } else {
            None
        },
        console_url: if openshift { optional("console-url") } else { None },
    })
}
