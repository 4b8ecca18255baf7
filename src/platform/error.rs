//! Crate-wide error type.

use thiserror::Error;

pub type FuzzResult<T> = Result<T, FuzzError>;

#[derive(Debug, Error)]
pub enum FuzzError {
    /// The surface model or tuning is inconsistent. Raised at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A builder asked for an operation the surface model does not declare.
    #[error("generation error: {0}")]
    Generation(String),

    #[error("corpus error: {0}")]
    Corpus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}
