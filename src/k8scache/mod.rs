//! The event-driven pod/node cache: C2 (host-label cache) and C3
//! (node→pod index), wired to shared `kube` watches.

pub mod dispatch;
pub mod host_label;
pub mod node_pod;

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{Api, Client};
use tokio::sync::watch;

pub use host_label::HostLabelCache;
pub use node_pod::NodePodCache;

use crate::algorithm::{HostCache, PodLister};
use crate::selector::Selector;

struct PodCacheSubscriber(Arc<NodePodCache>);
impl dispatch::Subscriber<Pod> for PodCacheSubscriber {
    fn on_add(&self, obj: &Pod) {
        self.0.on_add(obj);
    }
    fn on_update(&self, old: &Pod, new: &Pod) {
        self.0.on_update(old, new);
    }
    fn on_delete(&self, obj: &Pod) {
        self.0.on_delete(obj);
    }
}

struct NodeCacheSubscriber(Arc<HostLabelCache>);
impl dispatch::Subscriber<Node> for NodeCacheSubscriber {
    fn on_add(&self, obj: &Node) {
        self.0.on_add(obj);
    }
    fn on_update(&self, old: &Node, new: &Node) {
        self.0.on_update(old, new);
    }
    fn on_delete(&self, obj: &Node) {
        self.0.on_delete(obj);
    }
}

/// Owns C2 and C3, and the shared dispatch stores the node/pod informer
/// loops feed. Other components (the reconciler's pod tracking, the
/// bridge cache's hostname index) register as additional subscribers on
/// the same streams rather than opening their own watches — one
/// subscription per resource kind is multiplexed to all subscribers,
/// matching spec.md §9's "shared informers" note.
pub struct SchedCache {
    pub host_label: Arc<HostLabelCache>,
    pub node_pod: Arc<NodePodCache>,
    client: Client,
}

impl SchedCache {
    pub fn new(client: Client) -> Self {
        Self {
            host_label: Arc::new(HostLabelCache::new()),
            node_pod: Arc::new(NodePodCache::new()),
            client,
        }
    }

    /// Builds the pod dispatch (C3 plus `extra_pod_subscribers`) without
    /// starting its watch loop, so a caller can register subscribers that
    /// themselves need a handle to this dispatch (e.g. the reconciler's
    /// `PodLister`) before any event can be delivered.
    pub fn pod_dispatch(
        &self,
        extra_pod_subscribers: Vec<Arc<dyn dispatch::Subscriber<Pod>>>,
    ) -> Arc<dispatch::Dispatch<Pod>> {
        let mut pod_subscribers: Vec<Arc<dyn dispatch::Subscriber<Pod>>> =
            vec![Arc::new(PodCacheSubscriber(self.node_pod.clone()))];
        pod_subscribers.extend(extra_pod_subscribers);
        Arc::new(dispatch::Dispatch::new(pod_subscribers))
    }

    /// Starts the node and pod watch loops against dispatches built by
    /// `pod_dispatch` (and an equivalent node dispatch built here).
    /// Returns join handles for the spawned loops.
    pub fn run(
        &self,
        pod_dispatch: Arc<dispatch::Dispatch<Pod>>,
        extra_node_subscribers: Vec<Arc<dyn dispatch::Subscriber<Node>>>,
        stop: watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut node_subscribers: Vec<Arc<dyn dispatch::Subscriber<Node>>> =
            vec![Arc::new(NodeCacheSubscriber(self.host_label.clone()))];
        node_subscribers.extend(extra_node_subscribers);
        let node_dispatch = Arc::new(dispatch::Dispatch::new(node_subscribers));

        let pods: Api<Pod> = Api::all(self.client.clone());
        let nodes: Api<Node> = Api::all(self.client.clone());

        vec![
            tokio::spawn(dispatch::run(pods, pod_dispatch, stop.clone())),
            tokio::spawn(dispatch::run(nodes, node_dispatch, stop)),
        ]
    }
}

impl HostCache for SchedCache {
    fn get_host(&self, node: &str) -> Option<String> {
        self.host_label.get_host(node)
    }

    fn get_nodes(&self, host: &str) -> Vec<String> {
        self.host_label.get_nodes(host)
    }
}

/// Adapts the pod-object store returned by `SchedCache::run` into the
/// `PodLister` the filters and reconciler consume, mirroring
/// `SchedCache.ListPod` matching a `selector.Selector` against the
/// informer's in-memory store.
pub struct PodStoreLister(pub Arc<dispatch::Dispatch<Pod>>);

impl PodLister for PodStoreLister {
    fn list_pods(&self, selector: &dyn Selector) -> Vec<Pod> {
        self.0
            .snapshot()
            .into_iter()
            .filter(|p| {
                let labels = p.metadata.labels.clone().unwrap_or_default();
                selector.matches(&labels)
            })
            .collect()
    }
}
