use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the pipeline.
///
/// Conditions the pipeline can work around (an unparsable extract, missing
/// coordinate columns, an empty feature list) are reported through warnings
/// and outcome enums instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot read extract directory {path}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("target column '{0}' is also listed as a feature")]
    TargetInFeatures(String),

    #[error("model fitting failed: {0}")]
    Model(String),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
