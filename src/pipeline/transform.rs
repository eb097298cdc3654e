//! Raw records → clean records.
//!
//! The mapping is strictly 1:1: no filtering, deduplication or reordering.
//! `rating` and `user_ratings_total` never fail (they fall back to the
//! configured defaults); a missing `place_id` fails the whole batch before
//! anything is written.

use crate::artifact::{sha256_hex, write_atomic};
use crate::config::ConfigResolver;
use crate::constants::{CLEAN_COLUMNS, UNKNOWN};
use crate::error::{PipelineError, TransformError};
use crate::metrics::TransformMetrics;
use crate::types::{CleanPlaceRecord, RawPlaceRecord};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Substitutes for missing or non-numeric rating/review values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSettings {
    pub default_rating: f64,
    pub default_user_ratings_total: u64,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            default_rating: 0.0,
            default_user_ratings_total: 0,
        }
    }
}

impl TransformSettings {
    pub fn from_config(
        config: &ConfigResolver,
        rating_override: Option<f64>,
        reviews_override: Option<i64>,
    ) -> Result<Self, PipelineError> {
        let default_rating = config.get_f64("processing.default_rating", rating_override)?;
        if !default_rating.is_finite() || default_rating < 0.0 {
            return Err(TransformError::InvalidDefault {
                field: "rating",
                value: default_rating,
            }
            .into());
        }
        let reviews = config.get_i64("processing.default_user_ratings_total", reviews_override)?;
        let default_user_ratings_total = u64::try_from(reviews).map_err(|_| TransformError::InvalidDefault {
            field: "user_ratings_total",
            value: reviews as f64,
        })?;
        Ok(Self {
            default_rating,
            default_user_ratings_total,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransformStats {
    pub processed: usize,
    pub missing_ratings: usize,
    pub missing_reviews: usize,
    pub with_coordinates: usize,
}

#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub records: Vec<CleanPlaceRecord>,
    pub stats: TransformStats,
    /// SHA-256 of the written clean artifact
    pub digest: String,
}

/// Read the raw artifact, clean it, and write the clean artifact.
#[instrument(skip(settings), fields(input = %raw_path.display(), output = %clean_path.display()))]
pub fn transform_file(
    raw_path: &Path,
    clean_path: &Path,
    settings: &TransformSettings,
) -> Result<TransformOutcome, TransformError> {
    let started = Instant::now();
    info!("Starting data transformation");

    let raw = read_raw_artifact(raw_path)?;
    info!("Loaded {} raw records", raw.len());

    let (records, stats) = transform_records(&raw, settings)?;
    if stats.missing_ratings > 0 || stats.missing_reviews > 0 {
        warn!(
            "Filled {} missing ratings and {} missing review counts with defaults (rating={}, reviews={})",
            stats.missing_ratings,
            stats.missing_reviews,
            settings.default_rating,
            settings.default_user_ratings_total
        );
    }
    info!("Extracted coordinates for {} places", stats.with_coordinates);

    let digest = write_clean_artifact(clean_path, &records)?;

    TransformMetrics::record_batch(
        stats.processed,
        stats.missing_ratings,
        stats.missing_reviews,
        stats.with_coordinates,
    );
    TransformMetrics::record_duration(started.elapsed().as_secs_f64());
    info!("Saved {} clean records (sha256 {})", records.len(), digest);

    Ok(TransformOutcome {
        records,
        stats,
        digest,
    })
}

pub fn read_raw_artifact(path: &Path) -> Result<Vec<RawPlaceRecord>, TransformError> {
    let unreadable = |reason: String| TransformError::InputUnreadable {
        path: path.display().to_string(),
        reason,
    };
    let content = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| unreadable(e.to_string()))
}

/// Clean every record, or fail on the first one without a `place_id`.
pub fn transform_records(
    raw: &[RawPlaceRecord],
    settings: &TransformSettings,
) -> Result<(Vec<CleanPlaceRecord>, TransformStats), TransformError> {
    let mut stats = TransformStats::default();
    let mut records = Vec::with_capacity(raw.len());

    for (index, rec) in raw.iter().enumerate() {
        let place_id = rec
            .place_id
            .as_ref()
            .and_then(coerce_identifier)
            .ok_or(TransformError::MissingPlaceId { index })?;

        let rating = match rec.rating.as_ref().and_then(coerce_f64) {
            Some(r) => r,
            None => {
                stats.missing_ratings += 1;
                settings.default_rating
            }
        };
        let user_ratings_total = match rec.user_ratings_total.as_ref().and_then(coerce_count) {
            Some(n) => n,
            None => {
                stats.missing_reviews += 1;
                settings.default_user_ratings_total
            }
        };

        let (latitude, longitude) = extract_coordinates(rec.geometry.as_ref());
        if latitude.is_some() {
            stats.with_coordinates += 1;
        }

        records.push(CleanPlaceRecord {
            place_id,
            name: text_or_unknown(rec.name.as_ref()),
            rating,
            user_ratings_total,
            latitude,
            longitude,
            types: rec.types.as_ref().and_then(render_types),
            address: text_or_unknown(rec.address.as_ref()),
        });
    }

    stats.processed = records.len();
    debug!("Transformed {} records", stats.processed);
    Ok((records, stats))
}

/// Serialize to CSV with the fixed header, then write atomically.
/// Returns the SHA-256 of the bytes written.
pub fn write_clean_artifact(path: &Path, records: &[CleanPlaceRecord]) -> Result<String, TransformError> {
    let write_err = |reason: String| TransformError::Write {
        path: path.display().to_string(),
        reason,
    };

    // Header written by hand so an empty batch still carries the schema
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    wtr.write_record(CLEAN_COLUMNS).map_err(|e| write_err(e.to_string()))?;
    for rec in records {
        wtr.serialize(rec).map_err(|e| write_err(e.to_string()))?;
    }
    let bytes = wtr.into_inner().map_err(|e| write_err(e.to_string()))?;

    write_atomic(path, &bytes).map_err(|e| write_err(e.to_string()))?;
    Ok(sha256_hex(&bytes))
}

/// Latitude/longitude from `{lat, lng}`, `{latitude, longitude}` or a nested
/// `{location: {...}}`. Both are `None` unless both are present; zero is a
/// real coordinate and is kept.
pub fn extract_coordinates(geometry: Option<&Value>) -> (Option<f64>, Option<f64>) {
    let Some(geo) = geometry.filter(|g| g.is_object()) else {
        return (None, None);
    };
    let point = match geo.get("location") {
        Some(loc) if loc.is_object() => loc,
        _ => geo,
    };
    let lat = point.get("lat").or_else(|| point.get("latitude")).and_then(coerce_f64);
    let lng = point.get("lng").or_else(|| point.get("longitude")).and_then(coerce_f64);
    match (lat, lng) {
        (Some(lat), Some(lng)) => (Some(lat), Some(lng)),
        _ => (None, None),
    }
}

/// Category list as a single string. Arrays render as `["a", "b"]` with
/// string items left unescaped; strings are kept verbatim.
pub fn render_types(types: &Value) -> Option<String> {
    match types {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|i| match i {
                    Value::String(s) => format!("\"{s}\""),
                    other => other.to_string(),
                })
                .collect();
            Some(format!("[{}]", parts.join(", ")))
        }
        other => Some(other.to_string()),
    }
}

fn coerce_identifier(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_f64(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

fn coerce_count(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    let f = coerce_f64(v)?;
    (f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}

/// Non-blank strings and numbers are kept; anything else is `Unknown`.
fn text_or_unknown(v: Option<&Value>) -> String {
    v.and_then(coerce_identifier)
        .unwrap_or_else(|| UNKNOWN.to_string())
}
