//! Hostname↔VM-id bridge (C4): joins the orchestrator's node name to a
//! virtualization-cluster VM reference by matching the node's hostname to
//! the VM's guest-reported hostname.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use k8s_openapi::api::core::v1::Node;

use crate::k8scache::dispatch::Subscriber;
use crate::vcenter::Querier;

#[derive(Default)]
struct Inner {
    hostname_to_node: HashMap<String, String>,
    node_to_hostname: HashMap<String, String>,
}

/// Kubernetes-side half of C4: node name ↔ hostname, kept current by
/// subscribing to the same node watch as C2.
pub struct KubeNodeCache {
    inner: Mutex<Inner>,
}

impl Default for KubeNodeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KubeNodeCache {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    pub fn hostname_of_node(&self, node: &str) -> Option<String> {
        self.inner.lock().unwrap().node_to_hostname.get(node).cloned()
    }

    pub fn node_of_hostname(&self, hostname: &str) -> Option<String> {
        self.inner.lock().unwrap().hostname_to_node.get(hostname).cloned()
    }

    fn insert(&self, node: &str, hostname: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.node_to_hostname.insert(node.to_string(), hostname.to_string());
        inner.hostname_to_node.insert(hostname.to_string(), node.to_string());
    }

    fn remove(&self, node: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(hostname) = inner.node_to_hostname.remove(node) {
            inner.hostname_to_node.remove(&hostname);
        }
    }
}

impl Subscriber<Node> for KubeNodeCache {
    fn on_add(&self, obj: &Node) {
        if let Some(hostname) = node_hostname(obj) {
            self.insert(&node_name(obj), &hostname);
        }
    }

    fn on_update(&self, old: &Node, new: &Node) {
        self.remove(&node_name(old));
        if let Some(hostname) = node_hostname(new) {
            self.insert(&node_name(new), &hostname);
        }
    }

    fn on_delete(&self, obj: &Node) {
        self.remove(&node_name(obj));
    }
}

fn node_name(node: &Node) -> String {
    node.metadata.name.clone().unwrap_or_default()
}

fn node_hostname(node: &Node) -> Option<String> {
    node.status
        .as_ref()?
        .addresses
        .as_ref()?
        .iter()
        .find(|a| a.type_ == "Hostname")
        .map(|a| a.address.clone())
}

/// Bridges a Kubernetes node name to its vSphere VM reference.
pub trait Cache: Send + Sync {
    fn get_vmid_from_node(&self, name: &str) -> Option<String>;
}

pub struct BridgeCache {
    pub kube_nodes: Arc<KubeNodeCache>,
    pub querier: Arc<Querier>,
}

impl BridgeCache {
    pub fn new(kube_nodes: Arc<KubeNodeCache>, querier: Arc<Querier>) -> Self {
        Self { kube_nodes, querier }
    }
}

impl Cache for BridgeCache {
    fn get_vmid_from_node(&self, name: &str) -> Option<String> {
        let hostname = self.kube_nodes.hostname_of_node(name)?;
        tracing::debug!(node = name, hostname, "bridgecache: resolving node to vmid");
        self.querier.vmid_from_hostname(&hostname)
    }
}
