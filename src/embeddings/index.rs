// index.rs — Builds aligned embedding snapshots for a fragment sequence.
//
// One provider call per embeddable fragment, one model id for the whole index.
// A build either completes and is cached, or fails and leaves the cache untouched.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::config;
use crate::embeddings::cache::SnapshotCache;
use crate::embeddings::snapshot::{check_dimension, Snapshot, SnapshotKey};
use crate::embeddings::{embed_checked, EmbeddingProvider};
use crate::error::{KbError, Result};

/// Whether `build` reused a cached snapshot or called the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Cached,
    Built,
}

pub struct EmbeddingIndex {
    provider: Box<dyn EmbeddingProvider>,
    cache: Box<dyn SnapshotCache>,
    model: String,
    min_fragment_chars: usize,
}

impl EmbeddingIndex {
    pub fn new(
        provider: Box<dyn EmbeddingProvider>,
        cache: Box<dyn SnapshotCache>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            cache,
            model: model.into(),
            min_fragment_chars: config::embedding::MIN_FRAGMENT_CHARS,
        }
    }

    pub fn with_min_fragment_chars(mut self, min_chars: usize) -> Self {
        self.min_fragment_chars = min_chars;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Fragments at or below the threshold carry no signal and are never embedded.
    pub fn is_embeddable(&self, fragment: &str) -> bool {
        fragment.trim().chars().count() > self.min_fragment_chars
    }

    /// Return the snapshot for `fragments`, building it only on a cache miss.
    pub fn build(&mut self, fragments: &[String]) -> Result<(Arc<Snapshot>, BuildOutcome)> {
        let key = SnapshotKey::for_fragments(&self.model, self.min_fragment_chars, fragments);

        match self.cache.get(&key) {
            Ok(Some(snapshot)) => {
                log::info!(
                    "Reusing cached snapshot {} ({} fragments)",
                    key.short(),
                    snapshot.len()
                );
                return Ok((snapshot, BuildOutcome::Cached));
            }
            Ok(None) => {}
            Err(e) => log::warn!("Snapshot cache lookup failed, rebuilding: {}", e),
        }

        let started = Instant::now();
        log::info!(
            "Building snapshot {} for {} fragments with model {}",
            key.short(),
            fragments.len(),
            self.model
        );

        let mut embeddings = Vec::with_capacity(fragments.len());
        let mut dims = None;
        for (position, fragment) in fragments.iter().enumerate() {
            if !self.is_embeddable(fragment) {
                log::debug!("Fragment #{} below length threshold, no embedding", position);
                embeddings.push(None);
                continue;
            }

            let vector = embed_checked(self.provider.as_ref(), &self.model, fragment).map_err(|e| {
                log::error!("Embedding failed for fragment #{}: {}", position, e);
                KbError::provider(Some(position), e)
            })?;
            check_dimension(&mut dims, vector.len())?;
            embeddings.push(Some(vector));
        }

        let snapshot = Arc::new(Snapshot::new(
            key,
            self.model.clone(),
            fragments.to_vec(),
            embeddings,
            Utc::now(),
        )?);

        log::info!(
            "Snapshot {} built in {:?}: {} embedded, {} absent",
            snapshot.key().short(),
            started.elapsed(),
            snapshot.embedded_count(),
            snapshot.absent_count()
        );

        if let Err(e) = self.cache.put(snapshot.clone()) {
            log::warn!("Could not cache snapshot {}: {}", snapshot.key().short(), e);
        }

        Ok((snapshot, BuildOutcome::Built))
    }

    pub fn invalidate(&mut self, key: &SnapshotKey) -> Result<bool> {
        self.cache.invalidate(key)
    }

    pub fn clear_cache(&mut self) -> Result<()> {
        self.cache.clear()
    }
}
