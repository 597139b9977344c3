// snapshot.rs — Immutable fragment/embedding pairs produced by one index build.

use std::fmt;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config;
use crate::error::{KbError, Result};

/// Content identity of a fragment sequence under one embedding model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey(String);

impl SnapshotKey {
    /// SHA-256 over the model id, the embedding length threshold and every fragment,
    /// length-prefixed so that `["ab", "c"]` and `["a", "bc"]` never collide.
    ///
    /// The threshold decides which fragments are absent, so a snapshot built under one
    /// threshold is never served under another.
    pub fn for_fragments(model: &str, min_fragment_chars: usize, fragments: &[String]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(config::CACHE_SCHEMA_VERSION.to_le_bytes());
        hasher.update((model.len() as u64).to_le_bytes());
        hasher.update(model.as_bytes());
        hasher.update((min_fragment_chars as u64).to_le_bytes());
        hasher.update((fragments.len() as u64).to_le_bytes());
        for fragment in fragments {
            hasher.update((fragment.len() as u64).to_le_bytes());
            hasher.update(fragment.as_bytes());
        }
        SnapshotKey(hex::encode(hasher.finalize()))
    }

    pub fn from_hex(hex: impl Into<String>) -> Self {
        SnapshotKey(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fragments and their embeddings, aligned by position.
///
/// `embeddings[i]` is `None` when fragment `i` was too short to embed. All present
/// vectors share one dimension.
#[derive(Debug, Clone)]
pub struct Snapshot {
    key: SnapshotKey,
    model: String,
    fragments: Vec<String>,
    embeddings: Vec<Option<Vec<f32>>>,
    dims: Option<usize>,
    built_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(
        key: SnapshotKey,
        model: impl Into<String>,
        fragments: Vec<String>,
        embeddings: Vec<Option<Vec<f32>>>,
        built_at: DateTime<Utc>,
    ) -> Result<Self> {
        if fragments.len() != embeddings.len() {
            return Err(KbError::Misaligned {
                fragments: fragments.len(),
                embeddings: embeddings.len(),
            });
        }

        let mut dims = None;
        for v in embeddings.iter().flatten() {
            check_dimension(&mut dims, v.len())?;
        }

        Ok(Self {
            key,
            model: model.into(),
            fragments,
            embeddings,
            dims,
            built_at,
        })
    }

    /// Snapshot of an empty corpus.
    pub fn empty(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            key: SnapshotKey::for_fragments(&model, config::embedding::MIN_FRAGMENT_CHARS, &[]),
            model,
            fragments: Vec::new(),
            embeddings: Vec::new(),
            dims: None,
            built_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &SnapshotKey {
        &self.key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn embeddings(&self) -> &[Option<Vec<f32>>] {
        &self.embeddings
    }

    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn embedded_count(&self) -> usize {
        self.embeddings.iter().filter(|e| e.is_some()).count()
    }

    pub fn absent_count(&self) -> usize {
        self.len() - self.embedded_count()
    }

    /// `(position, fragment, embedding)` in fragment order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str, Option<&[f32]>)> {
        self.fragments
            .iter()
            .zip(self.embeddings.iter())
            .enumerate()
            .map(|(i, (f, e))| (i, f.as_str(), e.as_deref()))
    }
}

/// Record the first dimension seen, reject any vector that disagrees with it.
pub(crate) fn check_dimension(expected: &mut Option<usize>, got: usize) -> Result<()> {
    match *expected {
        Some(dims) if dims != got => Err(KbError::DimensionMismatch { expected: dims, got }),
        Some(_) => Ok(()),
        None => {
            *expected = Some(got);
            Ok(())
        }
    }
}
