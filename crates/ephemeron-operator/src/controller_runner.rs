//! Controller runner - builds controller futures for each cluster kind
//!
//! Each build function returns boxed futures that can be composed by the
//! caller. This keeps controller construction pure and testable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use ephemeron_cluster::controller::{error_policy, reconcile, Context};
use ephemeron_common::crd::{KindCluster, OpenshiftCluster};
use ephemeron_provision::Provisioner;

/// Watcher timeout (seconds) - must be less than the client read timeout
/// so the API server closes the watch before the client times out on idle
/// watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the controller futures for both cluster kinds
pub fn build_cluster_controllers(
    client: Client,
    provisioner: Arc<dyn Provisioner>,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let kind_ctx = Arc::new(Context::<KindCluster>::new(
        client.clone(),
        provisioner.clone(),
    ));
    let kind_clusters: Api<KindCluster> = Api::all(client.clone());
    let kind_ctrl = Controller::new(
        kind_clusters,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .shutdown_on_signal()
    .run(
        reconcile::<KindCluster>,
        error_policy::<KindCluster>,
        kind_ctx,
    )
    .for_each(log_reconcile_result("KindCluster"));

    let openshift_ctx = Arc::new(Context::<OpenshiftCluster>::new(client.clone(), provisioner));
    let openshift_clusters: Api<OpenshiftCluster> = Api::all(client);
    let openshift_ctrl = Controller::new(
        openshift_clusters,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .shutdown_on_signal()
    .run(
        reconcile::<OpenshiftCluster>,
        error_policy::<OpenshiftCluster>,
        openshift_ctx,
    )
    .for_each(log_reconcile_result("OpenshiftCluster"));

    tracing::info!("- KindCluster controller");
    tracing::info!("- OpenshiftCluster controller");

    vec![Box::pin(kind_ctrl), Box::pin(openshift_ctrl)]
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
