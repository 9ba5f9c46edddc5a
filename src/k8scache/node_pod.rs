//! Node→pod index (C3).
//!
//! Tracks which pod UIDs are assigned to which node name. Entries are
//! garbage-collected when the last pod leaves a node.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use k8s_openapi::api::core::v1::Pod;

#[derive(Default)]
pub struct NodePodCache {
    pods_on_node: Mutex<HashMap<String, HashSet<String>>>,
}

impl NodePodCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_pods_on_node(&self, node: &str) -> Vec<String> {
        self.pods_on_node
            .lock()
            .unwrap()
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn on_add(&self, pod: &Pod) {
        if let Some(node) = node_name(pod) {
            self.insert(&node, &uid(pod));
        }
    }

    pub fn on_update(&self, old: &Pod, new: &Pod) {
        if uid(old) != uid(new) {
            tracing::warn!(old = uid(old), new = uid(new), "cannot update pod with different UID");
            return;
        }

        let (old_node, new_node) = (node_name(old), node_name(new));
        match (old_node, new_node) {
            (Some(o), None) => self.remove(&o, &uid(old)),
            (None, Some(n)) => self.insert(&n, &uid(new)),
            (Some(o), Some(n)) if o != n => {
                self.remove(&o, &uid(old));
                self.insert(&n, &uid(new));
            }
            _ => {}
        }
    }

    pub fn on_delete(&self, pod: &Pod) {
        if let Some(node) = node_name(pod) {
            self.remove(&node, &uid(pod));
        }
    }

    fn insert(&self, node: &str, pod_uid: &str) {
        tracing::debug!(pod_uid, node, "adding pod to node cache");
        let mut inner = self.pods_on_node.lock().unwrap();
        inner.entry(node.to_string()).or_default().insert(pod_uid.to_string());
        crate::metrics::set_cache_size("node_pod", inner.values().map(|s| s.len()).sum());
    }

    fn remove(&self, node: &str, pod_uid: &str) {
        tracing::debug!(pod_uid, node, "deleting pod from node cache");
        let mut inner = self.pods_on_node.lock().unwrap();
        if let Some(set) = inner.get_mut(node) {
            set.remove(pod_uid);
            if set.is_empty() {
                inner.remove(node);
            }
        }
        crate::metrics::set_cache_size("node_pod", inner.values().map(|s| s.len()).sum());
    }
}

fn node_name(pod: &Pod) -> Option<String> {
    pod.spec.as_ref().and_then(|s| s.node_name.clone()).filter(|n| !n.is_empty())
}

fn uid(pod: &Pod) -> String {
    pod.metadata.uid.clone().unwrap_or_default()
}
