//! Compile-time constants shared across caches, filters and the reconciler.

/// Node label carrying the physical host a node (VM) currently resides on.
///
/// Only pod (anti-)affinity terms whose topology key equals this constant
/// are honored; every other topology key is ignored.
pub const HOST_LABEL: &str = "topology.vmware.com/host";

/// Default port the scheduler extender HTTP surface listens on.
pub const DEFAULT_EXTENDER_PORT: u16 = 12346;

/// Default port the Prometheus metrics / health endpoints listen on.
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default interval between reconciler passes.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 15;
