//! Controller runner - wires the MarimoNotebook controller to the cluster

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use marimo_common::crd::MarimoNotebook;
use marimo_common::OperatorConfig;

use crate::controller::{error_policy, reconcile, NotebookContext};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Run the MarimoNotebook controller until a shutdown signal arrives.
///
/// Changes to owned Pods, Services and ConfigMaps re-trigger their notebook.
/// PVCs carry no owner reference and are not watched.
pub async fn run_notebook_controller(client: Client, config: OperatorConfig) {
    let ctx = Arc::new(NotebookContext::from_client(client.clone(), config));

    let notebooks: Api<MarimoNotebook> = Api::all(client.clone());
    let pods: Api<Pod> = Api::all(client.clone());
    let services: Api<Service> = Api::all(client.clone());
    let config_maps: Api<ConfigMap> = Api::all(client);

    tracing::info!("starting MarimoNotebook controller");

    Controller::new(notebooks, watcher_config())
        .owns(pods, watcher_config())
        .owns(services, watcher_config())
        .owns(config_maps, watcher_config())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("MarimoNotebook"))
        .await;

    tracing::info!("MarimoNotebook controller stopped");
}

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
