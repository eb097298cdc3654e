use anyhow::Context;
use clap::Parser;
use places_ranker::apis::{ApifyPlaceSource, FixturePlaceSource};
use places_ranker::config::{ConfigResolver, PathOverrides};
use places_ranker::error::PipelineError;
use places_ranker::pipeline::{CrawlOptions, Pipeline, PipelineOptions};
use places_ranker::types::{PlaceSource, RankMode};
use places_ranker::{artifact, logging, metrics};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "places-ranker")]
#[command(about = "Crawl place listings, clean them and rank them per category")]
#[command(version)]
#[command(after_help = "Examples:
  places-ranker --query \"billiard, Ho Chi Minh City\"
  places-ranker --query \"coffee shop, Hanoi\" --raw-output-name coffee_raw.json --clean-output-name coffee_clean.csv
  places-ranker --skip-crawl --raw-path data/raw/existing.json --rank-mode gapped
  places-ranker --query \"cafe\" --fixture data/raw/saved_places.json")]
struct Cli {
    /// Search query for the crawler
    #[arg(long, required_unless_present = "skip_crawl")]
    query: Option<String>,

    /// Max places to crawl (overrides apify.default_max_places)
    #[arg(long)]
    max_crawled_places: Option<usize>,

    /// Max reviews per place (overrides apify.default_max_reviews)
    #[arg(long)]
    max_reviews: Option<usize>,

    /// Explicit path to the raw JSON artifact
    #[arg(long)]
    raw_path: Option<PathBuf>,

    /// File name for the raw JSON artifact inside paths.raw_data_dir
    #[arg(long)]
    raw_output_name: Option<String>,

    /// Explicit path to the clean CSV artifact
    #[arg(long)]
    clean_path: Option<PathBuf>,

    /// File name for the clean CSV inside paths.clean_data_dir
    #[arg(long)]
    clean_output_name: Option<String>,

    /// Explicit path to the SQLite database
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// File name for the SQLite database inside paths.output_dir
    #[arg(long)]
    database_name: Option<String>,

    /// Explicit path to the ranked CSV output
    #[arg(long)]
    ranked_path: Option<PathBuf>,

    /// File name for the ranked CSV inside paths.output_dir
    #[arg(long)]
    ranked_output_name: Option<String>,

    /// Explicit path to the top-N CSV report
    #[arg(long)]
    top_path: Option<PathBuf>,

    /// Rows per category in the top-N report (overrides sql.ranking_limit)
    #[arg(long)]
    top_n: Option<usize>,

    /// Value for missing ratings (overrides processing.default_rating)
    #[arg(long)]
    default_rating: Option<f64>,

    /// Value for missing review counts (overrides processing.default_user_ratings_total)
    #[arg(long)]
    default_reviews: Option<i64>,

    /// gapped (1,1,3) or gapless (1,1,2); defaults to sql.use_dense_rank
    #[arg(long)]
    rank_mode: Option<RankMode>,

    /// Path to config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve crawl results from a saved JSON array instead of Apify
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Reuse the raw artifact on disk instead of crawling
    #[arg(long)]
    skip_crawl: bool,

    /// Skip the transform step
    #[arg(long)]
    skip_transform: bool,

    /// Skip the load + ranking step
    #[arg(long)]
    skip_load: bool,
}

impl Cli {
    fn into_options(self) -> PipelineOptions {
        let crawl = if self.skip_crawl {
            None
        } else {
            self.query.map(|query| CrawlOptions {
                query,
                max_crawled_places: self.max_crawled_places,
                max_reviews: self.max_reviews,
            })
        };
        PipelineOptions {
            crawl,
            paths: PathOverrides {
                raw_path: self.raw_path,
                raw_name: self.raw_output_name,
                clean_path: self.clean_path,
                clean_name: self.clean_output_name,
                database_path: self.database_path,
                database_name: self.database_name,
                ranked_path: self.ranked_path,
                ranked_name: self.ranked_output_name,
                top_path: self.top_path,
            },
            default_rating: self.default_rating,
            default_reviews: self.default_reviews,
            rank_mode: self.rank_mode,
            top_n: self.top_n,
            skip_transform: self.skip_transform,
            skip_load: self.skip_load,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let loaded = ConfigResolver::load(cli.config.as_deref());
    let config = loaded.resolver;
    let _log_guard = logging::init_logging(&config);
    if let Some(w) = loaded.warning {
        warn!("{}", w);
    }

    let snapshot_file = config
        .get_str("metrics.snapshot_file", None)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from);
    if snapshot_file.is_some() {
        metrics::init_snapshot_recorder();
    }

    let fixture = cli.fixture.clone();
    let result = run(&config, cli.into_options(), fixture).await;

    if let Some(path) = snapshot_file {
        if let Some(text) = metrics::render_snapshot() {
            if let Err(e) = artifact::write_atomic(&path, text.as_bytes()) {
                warn!("Failed to write metrics snapshot {}: {}", path.display(), e);
            }
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<PipelineError>() {
                Some(pe) => error!(stage = pe.stage(), "Pipeline failed: {:#}", e),
                None => error!("Pipeline failed: {:#}", e),
            }
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    config: &ConfigResolver,
    options: PipelineOptions,
    fixture: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("Configuration source: {:?}", config.source());
    let pipeline = Pipeline::new(config, options).context("invalid pipeline settings")?;

    let source: Option<Box<dyn PlaceSource>> = match (pipeline.needs_source(), fixture) {
        (false, _) => None,
        (true, Some(path)) => {
            info!("Using fixture source {}", path.display());
            Some(Box::new(FixturePlaceSource::from_json_file(&path)?))
        }
        (true, None) => Some(Box::new(ApifyPlaceSource::from_config(config)?)),
    };

    let report = pipeline.run(source.as_deref()).await?;

    let paths = pipeline.paths();
    info!("Outputs:");
    info!("  Raw JSON: {}", paths.raw_json.display());
    info!("  Clean CSV: {}", paths.clean_csv.display());
    if report.ranked.is_some() {
        info!("  SQLite DB: {}", paths.database.display());
        info!("  Ranked CSV: {}", paths.ranked_csv.display());
        info!("  Top-N CSV: {}", paths.top_csv.display());
    }
    info!("Run summary: {}", serde_json::to_string(&report)?);
    Ok(())
}
