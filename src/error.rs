// error.rs — Error taxonomy for the retrieval core.
//
// Loader errors are recovered where they happen (skip file / empty base) and only
// surface as values in `CorpusLoad`. Build and query errors are returned to the caller.

use std::path::PathBuf;

/// Failure reported by an external provider (embedding or completion endpoint).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("could not decode provider response: {0}")]
    Decode(String),

    #[error("no API key configured (set {0})")]
    MissingCredentials(&'static str),

    #[error("provider returned an empty response")]
    EmptyResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum KbError {
    #[error("knowledge directory not found: {}", .0.display())]
    CorpusMissing(PathBuf),

    #[error("failed to read {}: {reason}", .path.display())]
    FileRead { path: PathBuf, reason: String },

    #[error("embedding provider failed for {}: {source}", describe_target(.position))]
    EmbeddingProvider {
        /// Fragment position, or `None` for the query embedding.
        position: Option<usize>,
        #[source]
        source: ProviderError,
    },

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("snapshot misaligned: {fragments} fragments but {embeddings} embeddings")]
    Misaligned { fragments: usize, embeddings: usize },

    #[error("snapshot cache error: {0}")]
    Cache(String),
}

impl KbError {
    pub(crate) fn provider(position: Option<usize>, source: ProviderError) -> Self {
        KbError::EmbeddingProvider { position, source }
    }
}

impl From<rusqlite::Error> for KbError {
    fn from(e: rusqlite::Error) -> Self {
        KbError::Cache(e.to_string())
    }
}

fn describe_target(position: &Option<usize>) -> String {
    match position {
        Some(i) => format!("fragment #{i}"),
        None => "query".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, KbError>;
