//! Placement filter (C6): the pod-affinity and pod-anti-affinity filters
//! consumed synchronously by the extender endpoint.

mod pod_affinity;
mod pod_anti_affinity;

pub use pod_affinity::PodAffinityFilter;
pub use pod_anti_affinity::PodAntiAffinityFilter;

use k8s_openapi::api::core::v1::PodAffinityTerm;

use crate::constants::HOST_LABEL;
use crate::selector::{self, Selector};

/// Terms whose topology key is not `HOST_LABEL` are ignored (spec.md §3).
pub fn host_label_terms(terms: &[PodAffinityTerm]) -> Vec<&PodAffinityTerm> {
    terms.iter().filter(|t| t.topology_key == HOST_LABEL).collect()
}

pub fn compile_terms(terms: &[&PodAffinityTerm]) -> Vec<Box<dyn Selector>> {
    terms
        .iter()
        .filter_map(|t| t.label_selector.as_ref().map(selector::compile))
        .collect()
}
