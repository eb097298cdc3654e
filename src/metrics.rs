//! Pipeline metrics, grouped by stage.
//!
//! Every stage records through the `metrics` facade. Nothing is collected
//! unless a recorder is installed; [`init_snapshot_recorder`] installs an
//! in-process Prometheus recorder whose text rendering can be written out
//! at the end of a batch run.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Idempotent. Returns whether a recorder is available for rendering.
pub fn init_snapshot_recorder() -> bool {
    if HANDLE.get().is_some() {
        return true;
    }
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    match metrics::set_global_recorder(recorder) {
        Ok(()) => {
            let _ = HANDLE.set(handle);
            info!("Prometheus snapshot recorder installed");
            true
        }
        Err(e) => {
            warn!("Failed to install metrics recorder: {}", e);
            false
        }
    }
}

/// Prometheus text format of everything recorded so far.
pub fn render_snapshot() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub struct ExtractMetrics;

impl ExtractMetrics {
    pub fn record_fetched(source: &'static str, records: usize, duration_secs: f64) {
        counter!("places_extract_records_total", "source" => source).increment(records as u64);
        histogram!("places_extract_duration_seconds", "source" => source).record(duration_secs);
    }

    pub fn record_failure(source: &'static str) {
        counter!("places_extract_failures_total", "source" => source).increment(1);
    }
}

pub struct TransformMetrics;

impl TransformMetrics {
    pub fn record_batch(processed: usize, missing_ratings: usize, missing_reviews: usize, with_coordinates: usize) {
        counter!("places_transform_records_total").increment(processed as u64);
        counter!("places_transform_defaults_total", "field" => "rating").increment(missing_ratings as u64);
        counter!("places_transform_defaults_total", "field" => "user_ratings_total")
            .increment(missing_reviews as u64);
        counter!("places_transform_coordinates_total").increment(with_coordinates as u64);
    }

    pub fn record_duration(duration_secs: f64) {
        histogram!("places_transform_duration_seconds").record(duration_secs);
    }
}

pub struct RankMetrics;

impl RankMetrics {
    pub fn record_load(rows: usize, categories: usize, duration_secs: f64) {
        counter!("places_load_rows_total").increment(rows as u64);
        histogram!("places_rank_categories").record(categories as f64);
        histogram!("places_rank_duration_seconds").record(duration_secs);
    }

    pub fn record_failure() {
        counter!("places_load_failures_total").increment(1);
    }
}
