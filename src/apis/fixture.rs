use crate::constants::FIXTURE_SOURCE;
use crate::error::ExtractionError;
use crate::types::{CrawlRequest, PlaceSource, RawPlaceRecord};
use std::path::Path;

/// Serves a fixed set of records, for tests and offline runs.
///
/// Honors `max_crawled_places` the way the crawler would, and reports an
/// empty fixture as "no results".
#[derive(Debug, Clone, Default)]
pub struct FixturePlaceSource {
    records: Vec<RawPlaceRecord>,
}

impl FixturePlaceSource {
    pub fn new(records: Vec<RawPlaceRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array of raw records, e.g. a raw artifact from an earlier run.
    pub fn from_json_file(path: &Path) -> Result<Self, ExtractionError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ExtractionError::Decode(format!("{}: {}", path.display(), e)))?;
        let records = serde_json::from_str(&content)
            .map_err(|e| ExtractionError::Decode(format!("{}: {}", path.display(), e)))?;
        Ok(Self { records })
    }
}

#[async_trait::async_trait]
impl PlaceSource for FixturePlaceSource {
    fn source_name(&self) -> &'static str {
        FIXTURE_SOURCE
    }

    async fn fetch(&self, request: &CrawlRequest) -> Result<Vec<RawPlaceRecord>, ExtractionError> {
        if self.records.is_empty() {
            return Err(ExtractionError::NoResults(request.query.clone()));
        }
        Ok(self
            .records
            .iter()
            .take(request.max_crawled_places)
            .cloned()
            .collect())
    }
}
