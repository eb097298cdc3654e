use thiserror::Error;

/// A configuration key could not be resolved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigKeyError {
    #[error("key '{key}' is not set and has no default")]
    Missing { key: String },

    #[error("key '{key}' passes through '{segment}', which is not a table")]
    NotATable { key: String, segment: String },

    #[error("key '{key}' must be {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// Failures at the crawler boundary. Never retried by the pipeline.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("missing credentials: environment variable {0} is not set")]
    MissingCredentials(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("crawler responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("crawler returned an unexpected payload: {0}")]
    Decode(String),

    #[error("no place source configured for crawling")]
    NoSource,

    #[error("no places found for query '{0}'")]
    NoResults(String),

    #[error("failed to write raw artifact {path}: {reason}")]
    Write { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("input unreadable: {path}: {reason}")]
    InputUnreadable { path: String, reason: String },

    #[error("record {index} has no place_id")]
    MissingPlaceId { index: usize },

    #[error("default {field} must be non-negative, got {value}")]
    InvalidDefault { field: &'static str, value: f64 },

    #[error("failed to write clean artifact {path}: {reason}")]
    Write { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("clean artifact unreadable: {path}: {reason}")]
    InputUnreadable { path: String, reason: String },

    #[error("schema mismatch in {path}: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("row {row} of {path} could not be imported: {reason}")]
    BadRow {
        path: String,
        row: usize,
        reason: String,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Top-level error; the Display output is prefixed with the failing stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(#[from] ConfigKeyError),

    #[error("extract: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("transform: {0}")]
    Transform(#[from] TransformError),

    #[error("load: {0}")]
    Load(#[from] LoadError),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Extraction(_) => "extract",
            PipelineError::Transform(_) => "transform",
            PipelineError::Load(_) => "load",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
