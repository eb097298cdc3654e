use crate::error::ExtractionError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A place listing as handed over by the crawler boundary.
///
/// Every field the pipeline coerces stays as loose JSON so missing or
/// oddly typed values reach the transformer instead of failing
/// deserialization of the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPlaceRecord {
    #[serde(default)]
    pub place_id: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub rating: Option<Value>,
    #[serde(default)]
    pub user_ratings_total: Option<Value>,
    #[serde(default)]
    pub geometry: Option<Value>,
    #[serde(default)]
    pub address: Option<Value>,
    #[serde(default)]
    pub types: Option<Value>,
    #[serde(
        default,
        deserialize_with = "lenient_reviews",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub reviews: Vec<RawReview>,
}

/// Reviews are carried through, never cleaned: `null` or a malformed list
/// reads as no reviews.
fn lenient_reviews<'de, D>(deserializer: D) -> Result<Vec<RawReview>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReview {
    pub author_name: Option<String>,
    pub rating: Option<Value>,
    pub text: Option<String>,
    pub time: Option<String>,
}

/// Flat, defaulted form written to the clean artifact.
/// Field order matches [`crate::constants::CLEAN_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanPlaceRecord {
    pub place_id: String,
    pub name: String,
    pub rating: f64,
    pub user_ratings_total: u64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub types: Option<String>,
    pub address: String,
}

/// One row of the ranked (or top-N) artifact.
/// Field order matches [`crate::constants::RANKED_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPlaceRow {
    pub place_id: String,
    pub name: String,
    pub rating: f64,
    pub user_ratings_total: u64,
    pub category: Option<String>,
    pub rating_rank: u64,
}

/// How ties share rank numbers within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMode {
    /// `RANK()`: 1, 1, 3
    Gapped,
    /// `DENSE_RANK()`: 1, 1, 2
    Gapless,
}

impl RankMode {
    pub fn sql_function(self) -> &'static str {
        match self {
            RankMode::Gapped => "RANK",
            RankMode::Gapless => "DENSE_RANK",
        }
    }

    /// Maps the `sql.use_dense_rank` switch.
    pub fn from_dense_flag(use_dense_rank: bool) -> Self {
        if use_dense_rank {
            RankMode::Gapless
        } else {
            RankMode::Gapped
        }
    }
}

impl fmt::Display for RankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankMode::Gapped => write!(f, "gapped"),
            RankMode::Gapless => write!(f, "gapless"),
        }
    }
}

impl FromStr for RankMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gapped" | "rank" => Ok(RankMode::Gapped),
            "gapless" | "dense" | "dense_rank" => Ok(RankMode::Gapless),
            other => Err(format!("unknown rank mode '{other}' (expected gapped or gapless)")),
        }
    }
}

/// Parameters for one crawl.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRequest {
    pub query: String,
    pub max_crawled_places: usize,
    pub max_reviews: usize,
    pub scrape_place_detail_page: bool,
    pub reviews_sort: String,
}

/// Supplier of raw place records for a query.
#[async_trait::async_trait]
pub trait PlaceSource: Send + Sync {
    /// Identifier used in logs and metrics labels.
    fn source_name(&self) -> &'static str;

    async fn fetch(&self, request: &CrawlRequest) -> Result<Vec<RawPlaceRecord>, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rank_mode_parsing() {
        assert_eq!("gapped".parse::<RankMode>().unwrap(), RankMode::Gapped);
        assert_eq!("GAPLESS".parse::<RankMode>().unwrap(), RankMode::Gapless);
        assert_eq!("dense_rank".parse::<RankMode>().unwrap(), RankMode::Gapless);
        assert!("row_number".parse::<RankMode>().is_err());
    }

    #[test]
    fn test_rank_mode_sql_function() {
        assert_eq!(RankMode::Gapped.sql_function(), "RANK");
        assert_eq!(RankMode::Gapless.sql_function(), "DENSE_RANK");
        assert_eq!(RankMode::from_dense_flag(true), RankMode::Gapless);
    }

    #[test]
    fn test_raw_record_tolerates_missing_fields() {
        let raw: RawPlaceRecord = serde_json::from_value(json!({"place_id": "p1"})).unwrap();
        assert_eq!(raw.place_id, Some(json!("p1")));
        assert!(raw.rating.is_none());
        assert!(raw.geometry.is_none());
        assert!(raw.reviews.is_empty());
    }

    #[test]
    fn test_raw_record_tolerates_odd_reviews_and_names() {
        let raw: RawPlaceRecord =
            serde_json::from_value(json!({"place_id": "p1", "name": 12345, "reviews": null})).unwrap();
        assert_eq!(raw.name, Some(json!(12345)));
        assert!(raw.reviews.is_empty());

        let raw: RawPlaceRecord =
            serde_json::from_value(json!({"place_id": "p1", "reviews": "not a list"})).unwrap();
        assert!(raw.reviews.is_empty());

        let raw: RawPlaceRecord = serde_json::from_value(json!({
            "place_id": "p1",
            "reviews": [{"author_name": "Lan", "rating": 5, "text": "Great", "time": null}]
        }))
        .unwrap();
        assert_eq!(raw.reviews[0].author_name.as_deref(), Some("Lan"));
    }
}
