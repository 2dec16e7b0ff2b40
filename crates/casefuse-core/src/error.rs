use thiserror::Error;

/// Configuration and contract violations.
///
/// Bad or missing case data is never reported through this type; it degrades to
/// `None`, `false`, or a review flag on the fused record instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown source kind: {0}")]
    UnknownSourceKind(String),

    #[error("Unknown catalog category: {0}")]
    UnknownCatalogCategory(String),

    #[error("Unknown extraction mode: {0}")]
    UnknownMode(String),

    #[error("Reliability for {source_kind} must be within [0, 1], got {value}")]
    ReliabilityOutOfRange { source_kind: String, value: f64 },

    #[error("Missing reliability weight for source kind: {0}")]
    MissingReliability(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
