//! Prometheus metrics for the extender, the reconciler, and the caches.

use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use warp::{Filter, Reply};

lazy_static::lazy_static! {
    static ref RECONCILE_TOTAL: CounterVec = register_counter_vec!(
        "vab_reconcile_passes_total",
        "Total number of DRSRuler reconcile passes",
        &["result"]
    ).unwrap();

    static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "vab_reconcile_duration_seconds",
        "Time spent in one reconcile pass",
        &[] as &[&str],
        vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    static ref RULE_OPS_TOTAL: CounterVec = register_counter_vec!(
        "vab_rule_ops_total",
        "Affinity-rule apply/delete operations against the cluster",
        &["op", "result"]
    ).unwrap();

    static ref EXTENDER_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "vab_extender_requests_total",
        "Scheduler extender requests handled",
        &["path", "result"]
    ).unwrap();

    static ref EXTENDER_DURATION: HistogramVec = register_histogram_vec!(
        "vab_extender_duration_seconds",
        "Scheduler extender request duration",
        &["path"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]
    ).unwrap();

    static ref CACHE_SIZE: GaugeVec = register_gauge_vec!(
        "vab_cache_entries",
        "Entries currently tracked by an in-memory cache",
        &["cache"]
    ).unwrap();
}

/// Starts timing one reconcile pass (C7).
pub fn start_reconcile_pass() -> ReconcilePassTimer {
    ReconcilePassTimer { start: Instant::now() }
}

pub struct ReconcilePassTimer {
    start: Instant,
}

impl ReconcilePassTimer {
    pub fn success(self) {
        RECONCILE_TOTAL.with_label_values(&["success"]).inc();
        RECONCILE_DURATION.with_label_values(&[]).observe(self.start.elapsed().as_secs_f64());
    }
}

/// Records the outcome of a single apply/delete call against the
/// virtualization cluster (`op` is `"apply"` or `"delete"`).
pub fn record_rule_op(op: &str, ok: bool) {
    let result = if ok { "success" } else { "error" };
    RULE_OPS_TOTAL.with_label_values(&[op, result]).inc();
}

/// Starts timing one extender HTTP request (`path` is `filter`,
/// `prioritize`, or `bind`).
pub fn start_extender_request(path: &'static str) -> ExtenderTimer {
    ExtenderTimer { path, start: Instant::now() }
}

pub struct ExtenderTimer {
    path: &'static str,
    start: Instant,
}

impl ExtenderTimer {
    pub fn finish(self, ok: bool) {
        let result = if ok { "success" } else { "error" };
        EXTENDER_REQUESTS_TOTAL.with_label_values(&[self.path, result]).inc();
        EXTENDER_DURATION.with_label_values(&[self.path]).observe(self.start.elapsed().as_secs_f64());
    }
}

/// Sets the current size of a named cache (`node_pod`, `host_label`, ...).
pub fn set_cache_size(cache: &str, count: usize) {
    CACHE_SIZE.with_label_values(&[cache]).set(count as f64);
}

pub fn metrics_handler() -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path("metrics").and(warp::get()).map(|| {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        warp::reply::with_header(
            String::from_utf8(buffer).unwrap(),
            "content-type",
            "text/plain; version=0.0.4; charset=utf-8",
        )
    })
}

pub fn health_handler() -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path("health").and(warp::get()).map(|| {
        let epoch_seconds = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "epoch_seconds": epoch_seconds,
            "version": env!("CARGO_PKG_VERSION"),
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_pass_records_counter_and_duration() {
        let timer = start_reconcile_pass();
        timer.success();

        let families = prometheus::gather();
        assert!(families.iter().any(|f| f.get_name() == "vab_reconcile_passes_total"));
    }

    #[test]
    fn extender_request_records_by_path_and_result() {
        start_extender_request("filter").finish(true);
        start_extender_request("bind").finish(false);

        let families = prometheus::gather();
        assert!(families.iter().any(|f| f.get_name() == "vab_extender_requests_total"));
    }

    #[test]
    fn cache_size_gauge_reflects_last_value() {
        set_cache_size("host_label", 3);
        set_cache_size("host_label", 5);

        let families = prometheus::gather();
        let family = families.iter().find(|f| f.get_name() == "vab_cache_entries").unwrap();
        let metric = family.get_metric().iter().find(|m| {
            m.get_label().iter().any(|l| l.get_name() == "cache" && l.get_value() == "host_label")
        }).unwrap();
        assert_eq!(metric.get_gauge().get_value(), 5.0);
    }
}
