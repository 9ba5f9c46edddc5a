mod algorithm;
mod bridgecache;
mod config;
mod constants;
mod error;
mod k8scache;
mod metrics;
mod selector;
mod server;
mod services;
mod vcenter;

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::sync::{mpsc, watch};

use algorithm::{Filter, Filters};
use algorithm::filters::{PodAffinityFilter, PodAntiAffinityFilter};
use bridgecache::{BridgeCache, KubeNodeCache};
use config::Config;
use k8scache::{PodStoreLister, SchedCache};
use services::DrsRuler;
use vcenter::{AffinityRuleClient, ClusterConfigUpdate, Querier, VcenterClient, VcenterEventSource, VmPropertyUpdate};

/// Placeholder virtualization-cluster backend. No real vSphere SDK crate
/// is available in this corpus (see DESIGN.md); a production deployment
/// replaces this with an adapter over the real wire protocol. Mutations
/// are logged and acknowledged; the event streams never produce
/// anything, so `AffinityRuleClient`'s view stays empty until a real
/// backend is wired in.
struct UnconfiguredVcenter {
    cluster: String,
}

#[async_trait::async_trait]
impl VcenterClient for UnconfiguredVcenter {
    async fn reconfigure_add(&self, name: &str, affinity: bool, vms: &[String]) -> error::Result<()> {
        tracing::warn!(
            cluster = self.cluster,
            name,
            affinity,
            ?vms,
            "no vcenter backend configured; rule add is a no-op"
        );
        Ok(())
    }

    async fn reconfigure_remove(&self, key: i32) -> error::Result<()> {
        tracing::warn!(cluster = self.cluster, key, "no vcenter backend configured; rule remove is a no-op");
        Ok(())
    }
}

impl VcenterEventSource for UnconfiguredVcenter {
    fn subscribe_vm_properties(&self) -> mpsc::Receiver<VmPropertyUpdate> {
        let (_tx, rx) = mpsc::channel(1);
        rx
    }

    fn subscribe_cluster_config(&self) -> mpsc::Receiver<ClusterConfigUpdate> {
        let (_tx, rx) = mpsc::channel(1);
        rx
    }
}

async fn run_vm_property_stream(
    querier: Arc<Querier>,
    mut rx: mpsc::Receiver<VmPropertyUpdate>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => {
                if *stop.borrow() {
                    return;
                }
            }
            update = rx.recv() => {
                match update {
                    Some(update) => querier.apply(update),
                    None => {
                        tracing::warn!("vcenter VM property stream closed");
                        return;
                    }
                }
            }
        }
    }
}

async fn run_cluster_config_stream(
    vcenter: Arc<AffinityRuleClient>,
    mut rx: mpsc::Receiver<ClusterConfigUpdate>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => {
                if *stop.borrow() {
                    return;
                }
            }
            update = rx.recv() => {
                match update {
                    Some(update) => vcenter.apply_cluster_update(update),
                    None => {
                        tracing::warn!("vcenter cluster-config stream closed");
                        return;
                    }
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    tracing::info!(?config, "starting vm-affinity-bridge");

    let client = Client::try_default().await?;
    let (stop_tx, stop_rx) = watch::channel(false);

    // C2/C3: node/pod caches, C4's kube-side half.
    let sched_cache = Arc::new(SchedCache::new(client.clone()));
    let kube_nodes = Arc::new(KubeNodeCache::new());

    // C4 vsphere-side half, C5.
    let querier = Arc::new(Querier::new());
    let bridge: Arc<dyn bridgecache::Cache> = Arc::new(BridgeCache::new(kube_nodes.clone(), querier.clone()));

    let vcenter_backend = Arc::new(UnconfiguredVcenter { cluster: config.cluster.clone() });
    let vcenter_client: Arc<dyn VcenterClient> = vcenter_backend.clone();
    let affinity_client = Arc::new(AffinityRuleClient::new(vcenter_client));

    // C7, wired against a pod dispatch built but not yet watching, so the
    // reconciler can register as a subscriber before any event can race it.
    let pod_dispatch = sched_cache.pod_dispatch(vec![]);
    let pod_lister = Arc::new(PodStoreLister(pod_dispatch.clone()));
    let drs_ruler = Arc::new(DrsRuler::new(
        pod_lister.clone(),
        bridge.clone(),
        affinity_client.clone(),
        config.reconcile_interval(),
    ));
    pod_dispatch.subscribe(drs_ruler.clone());

    let kube_node_subscriber: Arc<dyn k8scache::dispatch::Subscriber<k8s_openapi::api::core::v1::Node>> =
        kube_nodes.clone();
    let cache_handles = sched_cache.run(pod_dispatch, vec![kube_node_subscriber], stop_rx.clone());

    let vm_property_task = tokio::spawn(run_vm_property_stream(
        querier.clone(),
        vcenter_backend.subscribe_vm_properties(),
        stop_rx.clone(),
    ));
    let cluster_config_task = tokio::spawn(run_cluster_config_stream(
        affinity_client.clone(),
        vcenter_backend.subscribe_cluster_config(),
        stop_rx.clone(),
    ));

    let reconciler_task = tokio::spawn({
        let drs_ruler = drs_ruler.clone();
        let stop_rx = stop_rx.clone();
        async move { drs_ruler.run(stop_rx).await }
    });

    // C6: the extender's placement filter.
    let filter: Arc<dyn Filter> = Arc::new(Filters(vec![
        Box::new(PodAffinityFilter::new(pod_lister.clone(), sched_cache.clone())),
        Box::new(PodAntiAffinityFilter::new(pod_lister, sched_cache.clone())),
    ]));

    let metrics_routes = metrics::metrics_handler().or(metrics::health_handler());
    let metrics_port = config.metrics_port;
    let metrics_task = tokio::spawn(async move {
        tracing::info!(port = metrics_port, "starting metrics server");
        warp::serve(metrics_routes).run(([0, 0, 0, 0], metrics_port)).await;
    });

    let extender_routes = server::routes(filter, config.debug);
    let extender_port = config.port;
    tracing::info!(port = extender_port, "starting scheduler extender");

    tokio::select! {
        _ = warp::serve(extender_routes).run(([0, 0, 0, 0], extender_port)) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    let _ = stop_tx.send(true);
    metrics_task.abort();
    reconciler_task.abort();
    vm_property_task.abort();
    cluster_config_task.abort();
    for handle in cache_handles {
        handle.abort();
    }

    Ok(())
}
