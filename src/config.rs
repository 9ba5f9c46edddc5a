//! Process configuration (C9), derived from flags/env with `clap`
//! (spec.md §6 plus the ambient metrics-port / reconcile-interval flags
//! this expansion adds).

use std::time::Duration;

use clap::Parser;

use crate::constants::{DEFAULT_EXTENDER_PORT, DEFAULT_METRICS_PORT, DEFAULT_RECONCILE_INTERVAL_SECS};

#[derive(Parser, Debug, Clone)]
#[command(name = "vm-affinity-bridge", author, version, about = "Scheduler extender and VM-affinity reconciler")]
pub struct Config {
    /// Port the scheduler extender HTTP server listens on.
    #[arg(long, env = "VAB_PORT", default_value_t = DEFAULT_EXTENDER_PORT)]
    pub port: u16,

    /// Name of the virtualization cluster to reconcile rules against.
    #[arg(long, env = "VAB_CLUSTER")]
    pub cluster: String,

    /// Logs raw extender request/response bodies at debug level.
    #[arg(long, env = "VAB_DEBUG", default_value_t = false)]
    pub debug: bool,

    /// Port the /metrics, /health endpoints listen on.
    #[arg(long, env = "VAB_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Interval between reconciler sync passes, in seconds.
    #[arg(long, env = "VAB_RECONCILE_INTERVAL_SECS", default_value_t = DEFAULT_RECONCILE_INTERVAL_SECS)]
    pub reconcile_interval_secs: u64,
}

impl Config {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_cluster_flag() {
        let config = Config::parse_from(["vm-affinity-bridge", "--cluster", "prod-cluster-1"]);
        assert_eq!(config.cluster, "prod-cluster-1");
        assert_eq!(config.port, DEFAULT_EXTENDER_PORT);
        assert!(!config.debug);
    }

    #[test]
    fn reconcile_interval_converts_secs_to_duration() {
        let config = Config::parse_from(["vm-affinity-bridge", "--cluster", "c1", "--reconcile-interval-secs", "30"]);
        assert_eq!(config.reconcile_interval(), Duration::from_secs(30));
    }
}
