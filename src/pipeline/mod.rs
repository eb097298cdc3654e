//! Extract → Transform → Load/Rank, strictly in sequence.
//!
//! Each stage fully owns its output artifact until it returns; the next
//! stage only ever reads the artifact from disk. Every stage replaces its
//! artifact on re-run.

pub mod extract;
pub mod rank;
pub mod transform;

use crate::config::{ConfigResolver, PathOverrides, PipelinePaths};
use crate::error::{ExtractionError, PipelineError, Result};
use crate::types::{CrawlRequest, PlaceSource, RankMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub use rank::{RankOutcome, RankSettings};
pub use transform::{TransformOutcome, TransformSettings, TransformStats};

/// Caller overrides for one crawl; anything `None` comes from `apify.*`.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    pub query: String,
    pub max_crawled_places: Option<usize>,
    pub max_reviews: Option<usize>,
}

/// Everything a caller can override for one run. `crawl: None` skips the
/// extract stage and reuses the raw artifact on disk.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub crawl: Option<CrawlOptions>,
    pub paths: PathOverrides,
    pub default_rating: Option<f64>,
    pub default_reviews: Option<i64>,
    pub rank_mode: Option<RankMode>,
    pub top_n: Option<usize>,
    pub skip_transform: bool,
    pub skip_load: bool,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub extracted: Option<usize>,
    pub transformed: Option<TransformStats>,
    pub clean_digest: Option<String>,
    pub ranked: Option<usize>,
    pub categories: Option<usize>,
    pub ranked_digest: Option<String>,
}

pub struct Pipeline {
    paths: PipelinePaths,
    crawl: Option<CrawlRequest>,
    transform: TransformSettings,
    rank: RankSettings,
    skip_transform: bool,
    skip_load: bool,
}

impl Pipeline {
    /// Resolve every setting up front so a bad key fails before any stage runs.
    pub fn new(config: &ConfigResolver, options: PipelineOptions) -> Result<Self> {
        let paths = PipelinePaths::resolve(config, &options.paths)?;

        let crawl = match options.crawl {
            Some(c) => Some(CrawlRequest {
                query: c.query,
                max_crawled_places: config.get_usize("apify.default_max_places", c.max_crawled_places)?,
                max_reviews: config.get_usize("apify.default_max_reviews", c.max_reviews)?,
                scrape_place_detail_page: config.get_bool("apify.scrape_place_detail_page", None)?,
                reviews_sort: config.get_str("apify.reviews_sort", None)?,
            }),
            None => None,
        };

        Ok(Self {
            paths,
            crawl,
            transform: TransformSettings::from_config(config, options.default_rating, options.default_reviews)?,
            rank: RankSettings::from_config(config, options.rank_mode, options.top_n)?,
            skip_transform: options.skip_transform,
            skip_load: options.skip_load,
        })
    }

    pub fn paths(&self) -> &PipelinePaths {
        &self.paths
    }

    pub fn needs_source(&self) -> bool {
        self.crawl.is_some()
    }

    /// Run the enabled stages. `source` is only consulted when crawling.
    pub async fn run(&self, source: Option<&dyn PlaceSource>) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("pipeline", %run_id);

        async move {
            info!("Raw JSON path: {}", self.paths.raw_json.display());
            info!("Clean CSV path: {}", self.paths.clean_csv.display());
            info!("Database path: {}", self.paths.database.display());
            info!("Ranked CSV path: {}", self.paths.ranked_csv.display());

            let mut report = PipelineReport {
                run_id,
                started_at,
                finished_at: started_at,
                extracted: None,
                transformed: None,
                clean_digest: None,
                ranked: None,
                categories: None,
                ranked_digest: None,
            };

            match &self.crawl {
                Some(request) => {
                    info!("Step 1/3: Crawling places for query '{}'", request.query);
                    let source = source.ok_or(ExtractionError::NoSource)?;
                    let records = extract::extract_to_file(source, request, &self.paths.raw_json).await?;
                    report.extracted = Some(records.len());
                }
                None => info!("Skipping crawl step"),
            }

            if self.skip_transform {
                info!("Skipping transform step");
            } else {
                info!("Step 2/3: Transforming raw data");
                let outcome = transform::transform_file(&self.paths.raw_json, &self.paths.clean_csv, &self.transform)?;
                report.transformed = Some(outcome.stats);
                report.clean_digest = Some(outcome.digest);
            }

            if self.skip_load {
                info!("Skipping load/ranking step");
            } else {
                info!("Step 3/3: Loading into SQLite and ranking ({})", self.rank.query.mode);
                let outcome = rank::load_and_rank(
                    &self.paths.clean_csv,
                    &self.paths.database,
                    &self.paths.ranked_csv,
                    &self.paths.top_csv,
                    &self.rank,
                )?;
                report.ranked = Some(outcome.ranked_rows);
                report.categories = Some(outcome.categories);
                report.ranked_digest = Some(outcome.digest);
            }

            report.finished_at = Utc::now();
            info!("Pipeline completed successfully");
            Ok::<_, PipelineError>(report)
        }
        .instrument(span)
        .await
    }
}
