//! The virtualization cluster's two push sources (spec.md §6): the VM
//! property-change stream that feeds C4's `Querier`, and the cluster
//! configuration stream that feeds C5's `AffinityRuleClient`. Modeled as
//! a trait returning `tokio::sync::mpsc` receivers rather than a
//! `PropertyCollector`-style wait-for-updates loop, since no real vSphere
//! SDK crate exists in this corpus (see DESIGN.md).

use tokio::sync::mpsc;

use super::{ClusterConfigUpdate, VmPropertyUpdate};

pub trait VcenterEventSource: Send + Sync {
    fn subscribe_vm_properties(&self) -> mpsc::Receiver<VmPropertyUpdate>;
    fn subscribe_cluster_config(&self) -> mpsc::Receiver<ClusterConfigUpdate>;
}
