//! Shared interfaces for the placement filter (C6): `PodLister` and
//! `HostCache`, plus the `Filters` composition.

pub mod filters;

use k8s_openapi::api::core::v1::Pod;

use crate::error::Result;
use crate::selector::Selector;

/// Lists pods whose labels match `selector`.
pub trait PodLister: Send + Sync {
    fn list_pods(&self, selector: &dyn Selector) -> Vec<Pod>;
}

/// Keeps the node-to-host relationship and supports host/node queries (C2).
pub trait HostCache: Send + Sync {
    fn get_host(&self, node: &str) -> Option<String>;
    fn get_nodes(&self, host: &str) -> Vec<String>;
}

/// Filters nodes based on a pod's spec, returning the nodes the pod is
/// still eligible to run on.
pub trait Filter: Send + Sync {
    fn filter(&self, pod: &Pod, nodes: &[String]) -> Result<Vec<String>>;
}

/// An ordered list of `Filter`s. The composition short-circuits on the
/// first error.
pub struct Filters(pub Vec<Box<dyn Filter>>);

impl Filter for Filters {
    fn filter(&self, pod: &Pod, nodes: &[String]) -> Result<Vec<String>> {
        let mut current = nodes.to_vec();
        for f in &self.0 {
            current = f.filter(pod, &current)?;
        }
        Ok(current)
    }
}
