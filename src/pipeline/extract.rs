use crate::artifact::write_atomic;
use crate::error::ExtractionError;
use crate::metrics::ExtractMetrics;
use crate::types::{CrawlRequest, PlaceSource, RawPlaceRecord};
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Fetch raw records from `source` and persist them as the raw JSON artifact.
#[instrument(skip(source, request), fields(source = source.source_name(), query = %request.query))]
pub async fn extract_to_file(
    source: &dyn PlaceSource,
    request: &CrawlRequest,
    raw_path: &Path,
) -> Result<Vec<RawPlaceRecord>, ExtractionError> {
    info!(
        "Crawling up to {} places ({} reviews each)",
        request.max_crawled_places, request.max_reviews
    );
    let started = Instant::now();

    let records = match source.fetch(request).await {
        Ok(r) => r,
        Err(e) => {
            ExtractMetrics::record_failure(source.source_name());
            warn!("Extraction failed: {}", e);
            return Err(e);
        }
    };

    let body = serde_json::to_vec_pretty(&records).map_err(|e| ExtractionError::Write {
        path: raw_path.display().to_string(),
        reason: e.to_string(),
    })?;
    write_atomic(raw_path, &body).map_err(|e| ExtractionError::Write {
        path: raw_path.display().to_string(),
        reason: e.to_string(),
    })?;

    ExtractMetrics::record_fetched(source.source_name(), records.len(), started.elapsed().as_secs_f64());
    info!("Saved {} raw records to {}", records.len(), raw_path.display());
    Ok(records)
}
