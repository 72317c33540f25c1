use anyhow::{Context, Result};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::path::Path;
use tracing::info;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Decision metrics
    pub static ref DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "crosswind_decisions_total",
            "Total number of update decisions, by action"
        ),
        &["action"]
    ).unwrap();

    pub static ref POLICY_REJECTIONS_TOTAL: IntCounter = IntCounter::new(
        "crosswind_policy_rejections_total",
        "Total number of candidates rejected by the release-branch policy"
    ).unwrap();

    // Repository metrics
    pub static ref PULL_REQUESTS_OPENED: IntCounter = IntCounter::new(
        "crosswind_pull_requests_opened_total",
        "Total number of pull requests opened"
    ).unwrap();

    pub static ref BRANCHES_PUSHED: IntCounter = IntCounter::new(
        "crosswind_branches_pushed_total",
        "Total number of update branches pushed"
    ).unwrap();

    pub static ref BRANCHES_PRUNED: IntCounter = IntCounter::new(
        "crosswind_branches_pruned_total",
        "Total number of superseded update branches deleted"
    ).unwrap();

    // Reconciler metrics
    pub static ref RECONCILE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "crosswind_reconcile_duration_seconds",
            "Time spent reconciling one component on one base branch"
        ).buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0])
    ).unwrap();

    pub static ref RECONCILE_ERRORS: IntCounter = IntCounter::new(
        "crosswind_reconcile_errors_total",
        "Total number of reconciliation errors"
    ).unwrap();

    // Registry metrics
    pub static ref REGISTRY_LOOKUPS_TOTAL: IntCounter = IntCounter::new(
        "crosswind_registry_lookups_total",
        "Total number of container registry tag lookups"
    ).unwrap();

    pub static ref REGISTRY_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "crosswind_registry_errors_total",
        "Total number of container registry lookup errors"
    ).unwrap();

    // Notification metrics
    pub static ref NOTIFICATIONS_SENT_TOTAL: IntCounter = IntCounter::new(
        "crosswind_notifications_sent_total",
        "Total number of notifications sent"
    ).unwrap();

    pub static ref NOTIFICATIONS_FAILED_TOTAL: IntCounter = IntCounter::new(
        "crosswind_notifications_failed_total",
        "Total number of failed notification attempts"
    ).unwrap();
}

pub fn register_metrics() {
    REGISTRY.register(Box::new(DECISIONS_TOTAL.clone())).ok();
    REGISTRY
        .register(Box::new(POLICY_REJECTIONS_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(PULL_REQUESTS_OPENED.clone()))
        .ok();
    REGISTRY.register(Box::new(BRANCHES_PUSHED.clone())).ok();
    REGISTRY.register(Box::new(BRANCHES_PRUNED.clone())).ok();
    REGISTRY.register(Box::new(RECONCILE_DURATION.clone())).ok();
    REGISTRY.register(Box::new(RECONCILE_ERRORS.clone())).ok();
    REGISTRY
        .register(Box::new(REGISTRY_LOOKUPS_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(REGISTRY_ERRORS_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(NOTIFICATIONS_SENT_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(NOTIFICATIONS_FAILED_TOTAL.clone()))
        .ok();

    info!("Metrics registered");
}

/// Render every registered metric in the Prometheus text exposition format.
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
}

/// Write the metrics for a node-exporter textfile collector.
///
/// The file is written next to its destination and renamed so the collector never sees a
/// partial scrape.
pub fn write_textfile(path: &Path) -> Result<()> {
    let body = render()?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, body)
        .with_context(|| format!("Failed to write metrics to {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
    info!("Metrics written to {}", path.display());
    Ok(())
}
