//! Error types for s3plz

use thiserror::Error;

/// Result type alias for s3plz operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in s3plz operations
///
/// Absence is not an error: lookups return `None` and conditional writes
/// return [`crate::Created::Exists`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid S3 URI: {0}")]
    InvalidRootUri(String),

    #[error("{name} is not a supported serializer. Try one of: {supported}")]
    UnsupportedStage { name: String, supported: String },

    #[error("Invalid pipeline `{pipeline}`: {reason}")]
    InvalidPipeline { pipeline: String, reason: String },

    #[error("Missing field `{0}` in key template")]
    MissingField(String),

    #[error("Invalid key template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Config error: {0}")]
    Config(String),
}
