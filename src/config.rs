//! Configuration lookup with `override > file > built-in default` precedence.
//!
//! Keys are dotted paths into a TOML document (`paths.default_raw_json`).
//! A resolver is an immutable value; components receive it (or settings
//! derived from it) at construction.

use crate::error::ConfigKeyError;
use once_cell::sync::Lazy;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// Looked up when no `--config` path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

const DEFAULT_CONFIG: &str = r#"
[paths]
raw_data_dir = "data/raw"
clean_data_dir = "data/clean"
output_dir = "output"
default_raw_json = "raw_places.json"
default_clean_csv = "clean_places.csv"
default_database = "places.db"
default_ranked_csv = "ranked_places.csv"
default_top_csv = "top_places.csv"

[apify]
actor_id = "compass/crawler-google-places"
base_url = "https://api.apify.com"
default_max_places = 25
default_max_reviews = 5
scrape_place_detail_page = false
reviews_sort = "newest"
timeout_seconds = 300

[processing]
default_rating = 0
default_user_ratings_total = 0

[sql]
places_table = "places"
ranking_table = "place_ranking"
use_dense_rank = true
ranking_limit = 20
reviews_break_ties = false

[logging]
log_dir = "logs"
log_file = "pipeline.log"
log_level = "info"

[metrics]
snapshot_file = ""
"#;

static DEFAULTS: Lazy<Value> = Lazy::new(|| {
    let table: Table = toml::from_str(DEFAULT_CONFIG).expect("built-in configuration is valid TOML");
    Value::Table(table)
});

/// Where the loaded (non-default) values came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

#[derive(Debug, Clone)]
pub struct ConfigResolver {
    loaded: Value,
    source: ConfigSource,
}

/// Result of [`ConfigResolver::load`]. A missing or malformed file still
/// yields a usable resolver; the reason is carried in `warning`.
#[derive(Debug)]
pub struct LoadedConfig {
    pub resolver: ConfigResolver,
    pub warning: Option<String>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::defaults()
    }
}

impl ConfigResolver {
    /// A resolver backed only by the built-in defaults.
    pub fn defaults() -> Self {
        Self {
            loaded: (*DEFAULTS).clone(),
            source: ConfigSource::Defaults,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let table: Table = toml::from_str(content)?;
        Ok(Self {
            loaded: Value::Table(table),
            source: ConfigSource::Defaults,
        })
    }

    /// Load `path` (or [`DEFAULT_CONFIG_PATH`]). Never fails.
    pub fn load(path: Option<&Path>) -> LoadedConfig {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                return LoadedConfig {
                    resolver: Self::defaults(),
                    warning: Some(format!(
                        "config file '{}' could not be read ({}), using defaults",
                        path.display(),
                        e
                    )),
                }
            }
        };

        match Self::from_toml_str(&content) {
            Ok(mut resolver) => {
                resolver.source = ConfigSource::File(path);
                LoadedConfig {
                    resolver,
                    warning: None,
                }
            }
            Err(e) => LoadedConfig {
                resolver: Self::defaults(),
                warning: Some(format!(
                    "config file '{}' is malformed ({}), using defaults",
                    path.display(),
                    e.message()
                )),
            },
        }
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Resolve `key` against the loaded document, then the defaults.
    pub fn lookup(&self, key: &str) -> Result<&Value, ConfigKeyError> {
        if let Some(v) = walk(&self.loaded, key)? {
            return Ok(v);
        }
        walk(&DEFAULTS, key)?.ok_or_else(|| ConfigKeyError::Missing {
            key: key.to_string(),
        })
    }

    pub fn get_str(&self, key: &str, override_value: Option<&str>) -> Result<String, ConfigKeyError> {
        if let Some(v) = override_value {
            return Ok(v.to_string());
        }
        self.lookup(key)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| wrong_type(key, "a string"))
    }

    pub fn get_i64(&self, key: &str, override_value: Option<i64>) -> Result<i64, ConfigKeyError> {
        if let Some(v) = override_value {
            return Ok(v);
        }
        self.lookup(key)?
            .as_integer()
            .ok_or_else(|| wrong_type(key, "an integer"))
    }

    /// Integers are accepted where a float is expected (`default_rating = 0`).
    pub fn get_f64(&self, key: &str, override_value: Option<f64>) -> Result<f64, ConfigKeyError> {
        if let Some(v) = override_value {
            return Ok(v);
        }
        match self.lookup(key)? {
            Value::Float(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            _ => Err(wrong_type(key, "a number")),
        }
    }

    pub fn get_bool(&self, key: &str, override_value: Option<bool>) -> Result<bool, ConfigKeyError> {
        if let Some(v) = override_value {
            return Ok(v);
        }
        self.lookup(key)?
            .as_bool()
            .ok_or_else(|| wrong_type(key, "a boolean"))
    }

    /// Non-negative integer, used for counts and limits.
    pub fn get_usize(&self, key: &str, override_value: Option<usize>) -> Result<usize, ConfigKeyError> {
        if let Some(v) = override_value {
            return Ok(v);
        }
        let raw = self.get_i64(key, None)?;
        usize::try_from(raw).map_err(|_| wrong_type(key, "a non-negative integer"))
    }
}

/// `Ok(None)` when a segment is absent; an error when the path continues
/// through a scalar or array.
fn walk<'a>(root: &'a Value, key: &str) -> Result<Option<&'a Value>, ConfigKeyError> {
    let mut current = root;
    let mut walked = String::new();
    for segment in key.split('.') {
        let table = current.as_table().ok_or_else(|| ConfigKeyError::NotATable {
            key: key.to_string(),
            segment: if walked.is_empty() { "<root>".to_string() } else { walked.clone() },
        })?;
        match table.get(segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);
    }
    Ok(Some(current))
}

fn wrong_type(key: &str, expected: &'static str) -> ConfigKeyError {
    ConfigKeyError::WrongType {
        key: key.to_string(),
        expected,
    }
}

/// Pick a file location: an explicit path wins, then `name` inside
/// `base_dir`, then `default_name` inside `base_dir`. Absolute names are
/// used as given.
pub fn resolve_file_path(
    base_dir: &Path,
    explicit: Option<&Path>,
    name: Option<&str>,
    default_name: &str,
) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let file_name = Path::new(name.unwrap_or(default_name));
    if file_name.is_absolute() {
        return file_name.to_path_buf();
    }
    base_dir.join(file_name)
}

/// Caller-supplied path overrides (CLI flags).
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub raw_path: Option<PathBuf>,
    pub raw_name: Option<String>,
    pub clean_path: Option<PathBuf>,
    pub clean_name: Option<String>,
    pub database_path: Option<PathBuf>,
    pub database_name: Option<String>,
    pub ranked_path: Option<PathBuf>,
    pub ranked_name: Option<String>,
    pub top_path: Option<PathBuf>,
}

/// Every artifact location for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePaths {
    pub raw_json: PathBuf,
    pub clean_csv: PathBuf,
    pub database: PathBuf,
    pub ranked_csv: PathBuf,
    pub top_csv: PathBuf,
}

impl PipelinePaths {
    pub fn resolve(config: &ConfigResolver, overrides: &PathOverrides) -> Result<Self, ConfigKeyError> {
        let raw_dir = PathBuf::from(config.get_str("paths.raw_data_dir", None)?);
        let clean_dir = PathBuf::from(config.get_str("paths.clean_data_dir", None)?);
        let output_dir = PathBuf::from(config.get_str("paths.output_dir", None)?);

        Ok(Self {
            raw_json: resolve_file_path(
                &raw_dir,
                overrides.raw_path.as_deref(),
                overrides.raw_name.as_deref(),
                &config.get_str("paths.default_raw_json", None)?,
            ),
            clean_csv: resolve_file_path(
                &clean_dir,
                overrides.clean_path.as_deref(),
                overrides.clean_name.as_deref(),
                &config.get_str("paths.default_clean_csv", None)?,
            ),
            database: resolve_file_path(
                &output_dir,
                overrides.database_path.as_deref(),
                overrides.database_name.as_deref(),
                &config.get_str("paths.default_database", None)?,
            ),
            ranked_csv: resolve_file_path(
                &output_dir,
                overrides.ranked_path.as_deref(),
                overrides.ranked_name.as_deref(),
                &config.get_str("paths.default_ranked_csv", None)?,
            ),
            top_csv: resolve_file_path(
                &output_dir,
                overrides.top_path.as_deref(),
                None,
                &config.get_str("paths.default_top_csv", None)?,
            ),
        })
    }
}
