// embeddings/ — Fragment embeddings and their memoized snapshots.
//
// Provides:
// - The provider boundary (model id + text → vector)
// - Snapshot type holding fragments aligned 1:1 with embeddings
// - Content-addressed snapshot caches (in-memory, SQLite)
// - The index builder that ties them together

pub mod cache;
pub mod index;
pub mod snapshot;

use crate::error::ProviderError;

/// External capability that turns text into a fixed-length vector.
///
/// Implementations must be deterministic per `(model, text)` for the similarity
/// scores of one snapshot to be comparable.
pub trait EmbeddingProvider {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Single entry point for fragment and query embeddings: rejects empty vectors.
pub(crate) fn embed_checked(
    provider: &dyn EmbeddingProvider,
    model: &str,
    text: &str,
) -> Result<Vec<f32>, ProviderError> {
    let vector = provider.embed(model, text)?;
    if vector.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(vector)
}

pub use cache::{MemoryCache, SnapshotCache, SqliteCache};
pub use index::{BuildOutcome, EmbeddingIndex};
pub use snapshot::{Snapshot, SnapshotKey};
