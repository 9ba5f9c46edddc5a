//! The virtualization-cluster side: the hostname↔VM-id bridge (the
//! vSphere/DRS half of C4) and the affinity-rule client (C5).
//!
//! No real vSphere SDK crate is available to this corpus (see
//! DESIGN.md), so the property-change stream and the reconfigure
//! mutation surface are modeled as a small trait, `VcenterClient`, that a
//! real SDK adapter would implement against `govmomi`-equivalent wire
//! calls. Everything above this trait — the caches, the reconciler, the
//! rule-conflict handling — is unconditional on that substitution.

pub mod affinity_client;
pub mod client;
pub mod events;
pub mod querier;
pub mod vm_id;

pub use affinity_client::AffinityRuleClient;
pub use client::VcenterClient;
pub use events::VcenterEventSource;
pub use querier::Querier;
pub use vm_id::VmId;

use std::collections::BTreeSet;

/// A VM-to-VM affinity/anti-affinity rule (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub affinity: bool,
    pub vms: BTreeSet<String>,
}

/// One property change observed on a `VirtualMachine` managed object
/// (spec.md §6's "Properties subscribed").
#[derive(Debug, Clone)]
pub enum VmProperty {
    GuestHostname(String),
    RuntimeHostRef(String),
}

#[derive(Debug, Clone)]
pub enum VmPropertyUpdate {
    /// VM entered view or a subscribed property changed.
    Changed { vmid: String, property: VmProperty },
    /// VM left view; purge every index entry for it.
    Left { vmid: String },
}

/// One update to the cluster's installed rule configuration
/// (`configurationEx.rule`), replacing the whole snapshot.
#[derive(Debug, Clone)]
pub enum ClusterConfigUpdate {
    Changed(Vec<RawRule>),
    Left,
}

/// A rule as reported by the cluster, carrying the cluster-assigned
/// numeric key alongside the logical `Rule`.
#[derive(Debug, Clone)]
pub struct RawRule {
    pub key: i32,
    pub rule: Rule,
}
