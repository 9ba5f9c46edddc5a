//! Node↔host label cache (C2).
//!
//! Maintains `node_to_host` and `host_to_nodes` in lockstep. Mutated only by
//! the node-event dispatch; read by the placement filter and the reconciler.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use k8s_openapi::api::core::v1::Node;

use crate::constants::HOST_LABEL;

#[derive(Default)]
struct Inner {
    node_to_host: HashMap<String, String>,
    host_to_nodes: HashMap<String, HashSet<String>>,
}

/// Index of nodes by the host-label value carried in node metadata.
pub struct HostLabelCache {
    inner: Mutex<Inner>,
}

impl Default for HostLabelCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HostLabelCache {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    /// Returns the host a node currently resides on, if known.
    pub fn get_host(&self, node: &str) -> Option<String> {
        self.inner.lock().unwrap().node_to_host.get(node).cloned()
    }

    /// Returns all nodes known to reside on `host`.
    pub fn get_nodes(&self, host: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .host_to_nodes
            .get(host)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn on_add(&self, node: &Node) {
        let name = match &node.metadata.name {
            Some(n) => n.clone(),
            None => return,
        };
        if let Some(host) = host_label_of(node) {
            self.add_node_host(&name, &host);
        }
    }

    pub fn on_update(&self, old: &Node, new: &Node) {
        let (old_name, new_name) = (&old.metadata.name, &new.metadata.name);
        if old_name != new_name {
            tracing::warn!(?old_name, ?new_name, "cannot update node with different name");
            return;
        }
        let name = match new_name {
            Some(n) => n.clone(),
            None => return,
        };

        let old_host = host_label_of(old);
        let new_host = host_label_of(new);
        if old_host != new_host {
            if let Some(h) = old_host {
                self.remove_node_host(&name, &h);
            }
            if let Some(h) = new_host {
                self.add_node_host(&name, &h);
            }
        }
    }

    pub fn on_delete(&self, node: &Node) {
        let name = match &node.metadata.name {
            Some(n) => n.clone(),
            None => return,
        };
        if let Some(host) = host_label_of(node) {
            self.remove_node_host(&name, &host);
        }
    }

    fn add_node_host(&self, node: &str, host: &str) {
        if host.is_empty() {
            return;
        }
        tracing::debug!(node, host, "hostLabelCache: adding node to host mapping");
        let mut inner = self.inner.lock().unwrap();
        inner.node_to_host.insert(node.to_string(), host.to_string());
        inner.host_to_nodes.entry(host.to_string()).or_default().insert(node.to_string());
        crate::metrics::set_cache_size("host_label", inner.node_to_host.len());
    }

    fn remove_node_host(&self, node: &str, host: &str) {
        if host.is_empty() {
            return;
        }
        tracing::debug!(node, host, "hostLabelCache: removing node to host mapping");
        let mut inner = self.inner.lock().unwrap();
        inner.node_to_host.remove(node);
        if let Some(set) = inner.host_to_nodes.get_mut(host) {
            set.remove(node);
            if set.is_empty() {
                inner.host_to_nodes.remove(host);
            }
        }
        crate::metrics::set_cache_size("host_label", inner.node_to_host.len());
    }
}

fn host_label_of(node: &Node) -> Option<String> {
    node.metadata.labels.as_ref()?.get(HOST_LABEL).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node(name: &str, host: Option<&str>) -> Node {
        let mut labels = std::collections::BTreeMap::new();
        if let Some(h) = host {
            labels.insert(HOST_LABEL.to_string(), h.to_string());
        }
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn add_and_lookup_both_directions() {
        let cache = HostLabelCache::new();
        cache.on_add(&node("n1", Some("h1")));

        assert_eq!(cache.get_host("n1"), Some("h1".to_string()));
        assert_eq!(cache.get_nodes("h1"), vec!["n1".to_string()]);
    }

    #[test]
    fn update_moves_binding_when_host_changes() {
        let cache = HostLabelCache::new();
        cache.on_add(&node("n1", Some("h1")));
        cache.on_update(&node("n1", Some("h1")), &node("n1", Some("h2")));

        assert_eq!(cache.get_host("n1"), Some("h2".to_string()));
        assert!(cache.get_nodes("h1").is_empty());
        assert_eq!(cache.get_nodes("h2"), vec!["n1".to_string()]);
    }

    #[test]
    fn update_is_noop_when_host_unchanged() {
        let cache = HostLabelCache::new();
        cache.on_add(&node("n1", Some("h1")));
        cache.on_update(&node("n1", Some("h1")), &node("n1", Some("h1")));

        assert_eq!(cache.get_host("n1"), Some("h1".to_string()));
    }

    #[test]
    fn delete_removes_binding() {
        let cache = HostLabelCache::new();
        cache.on_add(&node("n1", Some("h1")));
        cache.on_delete(&node("n1", Some("h1")));

        assert_eq!(cache.get_host("n1"), None);
        assert!(cache.get_nodes("h1").is_empty());
    }

    #[test]
    fn empty_host_label_is_ignored() {
        let cache = HostLabelCache::new();
        cache.on_add(&node("n1", Some("")));

        assert_eq!(cache.get_host("n1"), None);
    }

    #[test]
    fn bijectivity_holds_after_mixed_sequence() {
        let cache = HostLabelCache::new();
        cache.on_add(&node("n1", Some("h1")));
        cache.on_add(&node("n2", Some("h1")));
        cache.on_update(&node("n2", Some("h1")), &node("n2", Some("h2")));
        cache.on_delete(&node("n1", Some("h1")));

        let inner = cache.inner.lock().unwrap();
        for (n, h) in inner.node_to_host.iter() {
            assert!(inner.host_to_nodes.get(h).unwrap().contains(n));
        }
        for (h, nodes) in inner.host_to_nodes.iter() {
            for n in nodes {
                assert_eq!(inner.node_to_host.get(n), Some(h));
            }
        }
    }
}
