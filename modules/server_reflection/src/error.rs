use std::path::PathBuf;

use thiserror::Error;

/// Construction-time failures of the descriptor index.
///
/// A malformed descriptor set is rejected before any query is served.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("file descriptor without a name")]
    EmptyFileName,

    #[error("duplicate file descriptor: {0}")]
    DuplicateFile(String),

    #[error("symbol '{symbol}' is defined in both '{first}' and '{second}'")]
    DuplicateSymbol {
        symbol: String,
        first: String,
        second: String,
    },

    #[error("file '{file}' depends on '{dependency}', which is not part of the descriptor set")]
    UnresolvedDependency { file: String, dependency: String },
}

/// Errors raised while assembling a reflection endpoint from its descriptor sources.
#[derive(Debug, Error)]
pub enum ReflectionError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("failed to decode file descriptor set from {source_name}")]
    Decode {
        source_name: String,
        #[source]
        source: prost::DecodeError,
    },

    #[error("failed to read descriptor set file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file '{0}' is registered twice with different contents")]
    ConflictingFile(String),

    #[error("descriptor source failed: {0}")]
    Source(String),
}
