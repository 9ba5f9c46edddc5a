//! The mutation surface produced against the virtualization cluster
//! (spec.md §6): cluster reconfigure with add / remove-by-key rule specs.

use async_trait::async_trait;

use crate::error::Result;

/// Issues rule mutations against one virtualization cluster and waits for
/// the resulting task, mirroring `cluster.Reconfigure(...).Wait(...)` in
/// the source. A real deployment implements this against the
/// virtualization SDK's wire protocol; that protocol itself is out of
/// scope (spec.md §1).
#[async_trait]
pub trait VcenterClient: Send + Sync {
    /// Adds an affinity or anti-affinity rule spanning `vms`.
    async fn reconfigure_add(&self, name: &str, affinity: bool, vms: &[String]) -> Result<()>;

    /// Removes the rule identified by its cluster-assigned numeric key.
    async fn reconfigure_remove(&self, key: i32) -> Result<()>;
}
