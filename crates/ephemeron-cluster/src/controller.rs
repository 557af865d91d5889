//! Reconcile loop driver
//!
//! Plugs the adapter into the kube runtime controller: one reconcile
//! function and one error policy shared by both cluster kinds. The
//! controller framework serializes passes per record and runs distinct
//! records concurrently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument};

use ephemeron_common::Error;
use ephemeron_provision::Provisioner;

use crate::adapter::{Adapter, Flow};
use crate::client::{KubeRecordClient, RecordClient};
use crate::record::ClusterRecord;

/// Interval between reconciliations of a settled record
///
/// One interval for both cluster kinds; the termination-policy timer is
/// evaluated against the recorded expiration timestamp on each pass.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Requeue delay after an operation asked to continue immediately
const REQUEUE_DELAY: Duration = Duration::from_secs(1);

/// Requeue delay after a failed pass
const ERROR_REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// Shared context for the cluster controllers
///
/// Holds the record client and the provisioner dispatch as trait objects
/// so reconciliation is testable without a live cluster or backend.
pub struct Context<K: ClusterRecord> {
    /// Store operations for the record kind
    pub records: Arc<dyn RecordClient<K>>,
    /// Provisioner dispatch
    pub provisioner: Arc<dyn Provisioner>,
}

impl<K: ClusterRecord> Context<K> {
    /// Create a production context from a kube client
    pub fn new(client: Client, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            records: Arc::new(KubeRecordClient::new(client)),
            provisioner,
        }
    }

    /// Create a context with explicit clients (primarily for tests)
    pub fn with_clients(
        records: Arc<dyn RecordClient<K>>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        Self {
            records,
            provisioner,
        }
    }
}

/// Reconcile one cluster record
///
/// Runs the ordered operation chain and maps its outcome to a requeue
/// decision. Errors propagate to [`error_policy`] for a backoff requeue.
#[instrument(skip(record, ctx), fields(cluster = %record.name_any()))]
pub async fn reconcile<K: ClusterRecord>(
    record: Arc<K>,
    ctx: Arc<Context<K>>,
) -> Result<Action, Error> {
    info!("reconciling cluster record");

    let mut adapter = Adapter::new(
        (*record).clone(),
        ctx.records.clone(),
        ctx.provisioner.clone(),
    );
    let flow = adapter.run_operations().await?;
    note_expiration(adapter.record());

    Ok(match flow {
        Flow::Requeue => Action::requeue(REQUEUE_DELAY),
        Flow::Continue | Flow::Stop => Action::requeue(RECONCILE_INTERVAL),
    })
}

/// Error policy for the cluster controllers
///
/// Called when a reconciliation pass fails; requeues with a short delay so
/// transient store and backend failures retry promptly.
pub fn error_policy<K: ClusterRecord>(record: Arc<K>, error: &Error, _ctx: Arc<Context<K>>) -> Action {
    error!(
        ?error,
        cluster = %record.name_any(),
        "reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE_DELAY)
}

/// Log when a record has passed its recorded expiration timestamp
///
/// Acting on expiry is a deletion initiated outside this control loop; the
/// pass only observes it.
fn note_expiration<K: ClusterRecord>(record: &K) {
    if let Some(expiration) = record.status().and_then(|s| s.expiration_timestamp) {
        if expiration <= Utc::now() {
            debug!(%expiration, "termination policy expiry reached; deletion is initiated externally");
        }
    }
}
