//! Prometheus metrics
//!
//! [`Metrics`] owns its own registry and is handed to the reconciler and the
//! runtime extension at construction time. Clones share the same collectors.

use crds::PoolAddressCounts;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

const NAMESPACE: &str = "capi_vip_allocator";

/// Allocator metrics and the registry they are exposed from.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    allocations_total: IntCounterVec,
    allocation_errors_total: IntCounterVec,
    allocation_duration_seconds: HistogramVec,
    reconcile_total: IntCounterVec,
    reconcile_duration_seconds: HistogramVec,
    pools_available: IntGaugeVec,
    pool_addresses_total: IntGaugeVec,
    pool_addresses_used: IntGaugeVec,
    pool_addresses_free: IntGaugeVec,
    claims_stalled_total: IntCounterVec,
    hook_requests_total: IntCounterVec,
}

fn counter(name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec, prometheus::Error> {
    IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)
}

fn gauge(name: &str, help: &str, labels: &[&str]) -> Result<IntGaugeVec, prometheus::Error> {
    IntGaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)
}

fn histogram(name: &str, help: &str, labels: &[&str]) -> Result<HistogramVec, prometheus::Error> {
    HistogramVec::new(
        HistogramOpts::new(name, help)
            .namespace(NAMESPACE)
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 60.0]),
        labels,
    )
}

impl Metrics {
    /// Create all collectors and register them in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let metrics = Self {
            registry: Registry::new(),
            allocations_total: counter(
                "allocations_total",
                "VIPs successfully written to clusters",
                &["role", "cluster_class"],
            )?,
            allocation_errors_total: counter(
                "allocation_errors_total",
                "VIP allocation attempts that failed",
                &["role", "cluster_class", "reason"],
            )?,
            allocation_duration_seconds: histogram(
                "allocation_duration_seconds",
                "Time from claim request to VIP written",
                &["role", "cluster_class"],
            )?,
            reconcile_total: counter(
                "reconcile_total",
                "Cluster reconciliations by outcome",
                &["cluster_class", "result"],
            )?,
            reconcile_duration_seconds: histogram(
                "reconcile_duration_seconds",
                "Duration of a single cluster reconciliation",
                &["cluster_class"],
            )?,
            pools_available: gauge(
                "pools_available",
                "GlobalInClusterIPPools matching a cluster class and role",
                &["cluster_class", "role"],
            )?,
            pool_addresses_total: gauge(
                "pool_addresses_total",
                "Addresses in a pool as reported by the IPAM provider",
                &["pool_name"],
            )?,
            pool_addresses_used: gauge(
                "pool_addresses_used",
                "Allocated addresses in a pool",
                &["pool_name"],
            )?,
            pool_addresses_free: gauge(
                "pool_addresses_free",
                "Free addresses in a pool",
                &["pool_name"],
            )?,
            claims_stalled_total: counter(
                "claims_stalled_total",
                "Observations of claims still unbound after the maximum pending age",
                &["role", "cluster_class"],
            )?,
            hook_requests_total: counter(
                "hook_requests_total",
                "Runtime extension requests by hook and response status",
                &["hook", "status"],
            )?,
        };

        metrics.registry.register(Box::new(metrics.allocations_total.clone()))?;
        metrics.registry.register(Box::new(metrics.allocation_errors_total.clone()))?;
        metrics.registry.register(Box::new(metrics.allocation_duration_seconds.clone()))?;
        metrics.registry.register(Box::new(metrics.reconcile_total.clone()))?;
        metrics.registry.register(Box::new(metrics.reconcile_duration_seconds.clone()))?;
        metrics.registry.register(Box::new(metrics.pools_available.clone()))?;
        metrics.registry.register(Box::new(metrics.pool_addresses_total.clone()))?;
        metrics.registry.register(Box::new(metrics.pool_addresses_used.clone()))?;
        metrics.registry.register(Box::new(metrics.pool_addresses_free.clone()))?;
        metrics.registry.register(Box::new(metrics.claims_stalled_total.clone()))?;
        metrics.registry.register(Box::new(metrics.hook_requests_total.clone()))?;

        Ok(metrics)
    }

    pub fn record_allocation(&self, role: &str, class: &str, elapsed: Option<Duration>) {
        self.allocations_total.with_label_values(&[role, class]).inc();
        if let Some(elapsed) = elapsed {
            self.allocation_duration_seconds
                .with_label_values(&[role, class])
                .observe(elapsed.as_secs_f64());
        }
    }

    pub fn record_allocation_error(&self, role: &str, class: &str, reason: &str) {
        self.allocation_errors_total
            .with_label_values(&[role, class, reason])
            .inc();
    }

    pub fn record_reconcile(&self, class: &str, result: &str, elapsed: Duration) {
        self.reconcile_total.with_label_values(&[class, result]).inc();
        self.reconcile_duration_seconds
            .with_label_values(&[class])
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_pools_available(&self, class: &str, role: &str, count: usize) {
        self.pools_available
            .with_label_values(&[class, role])
            .set(count as i64);
    }

    pub fn set_pool_addresses(&self, pool: &str, counts: &PoolAddressCounts) {
        self.pool_addresses_total.with_label_values(&[pool]).set(counts.total);
        self.pool_addresses_used.with_label_values(&[pool]).set(counts.used);
        self.pool_addresses_free.with_label_values(&[pool]).set(counts.free);
    }

    pub fn record_stalled_claim(&self, role: &str, class: &str) {
        self.claims_stalled_total.with_label_values(&[role, class]).inc();
    }

    pub fn record_hook_request(&self, hook: &str, status: &str) {
        self.hook_requests_total.with_label_values(&[hook, status]).inc();
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
