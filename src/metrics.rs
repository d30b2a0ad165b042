// src/metrics.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder. Fails if one is already installed.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing prometheus recorder")?;
        describe_all();
        Ok(Self { handle })
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_all() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "feed_fetch_total",
            "Source feed fetch runs by outcome (updated, unchanged, failed)."
        );
        describe_counter!(
            "feed_derive_total",
            "Derived feed runs by outcome."
        );
        describe_counter!(
            "feed_cascade_total",
            "Derive runs scheduled by updated source feeds."
        );
        describe_counter!(
            "translation_tokens_total",
            "Tokens billed by token-metered engines."
        );
        describe_counter!(
            "translation_characters_total",
            "Characters billed by character-metered engines."
        );
        describe_counter!("task_runs_total", "Queue task runs by kind and result.");
        describe_counter!("task_retries_total", "Failed runs put back on the queue.");
        describe_gauge!("task_queue_scheduled", "Tasks waiting on their delay.");
    });
}
