pub mod apis;
pub mod artifact;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use config::ConfigResolver;
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineOptions, PipelineReport};
pub use types::{CleanPlaceRecord, PlaceSource, RankMode, RankedPlaceRow, RawPlaceRecord};
