use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn the configuration file into a usable track.
///
/// Any of these stops the tracker from starting; nothing falls back to defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("track has no checkpoints")]
    EmptyTrack,

    #[error("checkpoint #{index} is not a valid 'x;y;z' triple: '{raw}'")]
    InvalidCheckpoint { index: usize, raw: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Rejection of a query condition instruction at registration time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("not enough arguments in '{instruction}'")]
    MissingArgument { instruction: String },

    #[error("could not parse amount '{raw}'")]
    InvalidAmount { raw: String },

    #[error("unknown condition kind '{kind}'")]
    UnknownKind { kind: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create parent dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize stats for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
