//! Pod-anti-affinity filter: anti-affinity is violated if any required
//! term matches, so the forbidden set is an OR of its terms (spec.md
//! §4.6).

use std::collections::HashSet;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;

use super::{compile_terms, host_label_terms};
use crate::algorithm::{Filter, HostCache, PodLister};
use crate::error::Result;
use crate::selector::Or;

pub struct PodAntiAffinityFilter {
    pod_lister: Arc<dyn PodLister>,
    host_cache: Arc<dyn HostCache>,
}

impl PodAntiAffinityFilter {
    pub fn new(pod_lister: Arc<dyn PodLister>, host_cache: Arc<dyn HostCache>) -> Self {
        Self { pod_lister, host_cache }
    }
}

impl Filter for PodAntiAffinityFilter {
    fn filter(&self, pod: &Pod, nodes: &[String]) -> Result<Vec<String>> {
        let terms = pod
            .spec
            .as_ref()
            .and_then(|s| s.affinity.as_ref())
            .and_then(|a| a.pod_anti_affinity.as_ref())
            .and_then(|pa| pa.required_during_scheduling_ignored_during_execution.as_ref());

        let Some(terms) = terms else {
            return Ok(nodes.to_vec());
        };

        let host_terms = host_label_terms(terms);
        if host_terms.is_empty() {
            return Ok(nodes.to_vec());
        }

        let selector = Or(compile_terms(&host_terms));
        let matched = self.pod_lister.list_pods(&selector);

        if matched.is_empty() {
            return Ok(nodes.to_vec());
        }

        let forbidden_hosts: HashSet<String> = matched
            .iter()
            .filter_map(|p| p.spec.as_ref().and_then(|s| s.node_name.clone()))
            .filter(|n| !n.is_empty())
            .filter_map(|n| self.host_cache.get_host(&n))
            .collect();

        let forbidden_nodes: HashSet<String> =
            forbidden_hosts.iter().flat_map(|h| self.host_cache.get_nodes(h)).collect();

        Ok(nodes.iter().filter(|n| !forbidden_nodes.contains(*n)).cloned().collect())
    }
}
