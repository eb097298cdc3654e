use crate::artifact::{sha256_hex, write_atomic_all};
use crate::config::ConfigResolver;
use crate::constants::{CLEAN_COLUMNS, RANKED_COLUMNS};
use crate::error::{ConfigKeyError, LoadError, PipelineError};
use crate::metrics::RankMetrics;
use crate::storage::{is_valid_identifier, PlaceStore, RankQuery};
use crate::types::{CleanPlaceRecord, RankMode, RankedPlaceRow};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RankSettings {
    pub query: RankQuery,
    /// Rows per category in the top-N report
    pub top_n: usize,
}

impl RankSettings {
    pub fn from_config(
        config: &ConfigResolver,
        mode_override: Option<RankMode>,
        top_n_override: Option<usize>,
    ) -> Result<Self, PipelineError> {
        let places_table = table_name(config, "sql.places_table")?;
        let ranking_table = table_name(config, "sql.ranking_table")?;
        let mode = match mode_override {
            Some(m) => m,
            None => RankMode::from_dense_flag(config.get_bool("sql.use_dense_rank", None)?),
        };
        Ok(Self {
            query: RankQuery {
                places_table,
                ranking_table,
                mode,
                reviews_break_ties: config.get_bool("sql.reviews_break_ties", None)?,
            },
            top_n: config.get_usize("sql.ranking_limit", top_n_override)?,
        })
    }
}

fn table_name(config: &ConfigResolver, key: &str) -> Result<String, ConfigKeyError> {
    let name = config.get_str(key, None)?;
    if is_valid_identifier(&name) {
        Ok(name)
    } else {
        Err(ConfigKeyError::WrongType {
            key: key.to_string(),
            expected: "a plain SQL identifier",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankOutcome {
    pub rows_loaded: usize,
    pub categories: usize,
    pub ranked_rows: usize,
    pub top_rows: usize,
    /// SHA-256 of the ranked artifact
    pub digest: String,
}

/// Import the clean artifact, rank it, and export the full and top-N reports.
///
/// The clean artifact is validated in full before the database is touched,
/// so an import failure leaves the previous tables and reports in place.
#[instrument(skip(settings), fields(mode = %settings.query.mode))]
pub fn load_and_rank(
    clean_csv: &Path,
    db_path: &Path,
    ranked_csv: &Path,
    top_csv: &Path,
    settings: &RankSettings,
) -> Result<RankOutcome, LoadError> {
    let started = Instant::now();
    info!("Loading cleaned data from {}", clean_csv.display());

    let records = match read_clean_artifact(clean_csv) {
        Ok(r) => r,
        Err(e) => {
            RankMetrics::record_failure();
            warn!("Import aborted: {}", e);
            return Err(e);
        }
    };

    let mut store = PlaceStore::open(db_path)?;
    info!("Writing {} rows to {}", records.len(), db_path.display());
    let rows_loaded = store.replace_and_rank(&records, &settings.query)?;

    let ranked = store.ranked_rows(&settings.query.ranking_table)?;
    let top = store.top_rows(&settings.query.ranking_table, settings.top_n)?;
    drop(store);

    let categories = ranked
        .iter()
        .map(|r| r.category.as_deref())
        .collect::<BTreeSet<_>>()
        .len();

    let ranked_bytes = render_ranked_csv(ranked_csv, &ranked)?;
    let top_bytes = render_ranked_csv(top_csv, &top)?;
    info!(
        "Exporting ranked results to {} and top {} per category to {}",
        ranked_csv.display(),
        settings.top_n,
        top_csv.display()
    );
    write_atomic_all(&[(ranked_csv, ranked_bytes.as_slice()), (top_csv, top_bytes.as_slice())]).map_err(
        |(path, e)| LoadError::Write {
            path: path.display().to_string(),
            reason: e.to_string(),
        },
    )?;
    let digest = sha256_hex(&ranked_bytes);

    RankMetrics::record_load(rows_loaded, categories, started.elapsed().as_secs_f64());
    info!("Ranked {} rows across {} categories", ranked.len(), categories);

    Ok(RankOutcome {
        rows_loaded,
        categories,
        ranked_rows: ranked.len(),
        top_rows: top.len(),
        digest,
    })
}

/// Parse the clean artifact, rejecting any header that differs from the
/// declared column list.
pub fn read_clean_artifact(path: &Path) -> Result<Vec<CleanPlaceRecord>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| LoadError::InputUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let headers = rdr.headers().map_err(|e| LoadError::InputUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let found: Vec<&str> = headers.iter().collect();
    if found != CLEAN_COLUMNS {
        return Err(LoadError::SchemaMismatch {
            path: path.display().to_string(),
            expected: CLEAN_COLUMNS.join(", "),
            found: found.join(", "),
        });
    }

    let mut records = Vec::new();
    for (i, result) in rdr.deserialize::<CleanPlaceRecord>().enumerate() {
        let record = result.map_err(|e| LoadError::BadRow {
            path: path.display().to_string(),
            // header is line 1
            row: i + 2,
            reason: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// CSV bytes of a ranked report, header included. `path` only labels errors.
pub fn render_ranked_csv(path: &Path, rows: &[RankedPlaceRow]) -> Result<Vec<u8>, LoadError> {
    let write_err = |reason: String| LoadError::Write {
        path: path.display().to_string(),
        reason,
    };
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    wtr.write_record(RANKED_COLUMNS).map_err(|e| write_err(e.to_string()))?;
    for row in rows {
        wtr.serialize(row).map_err(|e| write_err(e.to_string()))?;
    }
    wtr.into_inner().map_err(|e| write_err(e.to_string()))
}
