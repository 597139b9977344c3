// knowledge.rs — Owns the servable snapshot for one knowledge directory.
//
// The snapshot is replaced only by a successful build; a failed refresh leaves the
// previous one in place for queries.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::corpus::{self, CorpusLoad};
use crate::embeddings::{BuildOutcome, EmbeddingIndex, EmbeddingProvider, Snapshot, SnapshotCache};
use crate::error::Result;
use crate::retrieval::{QueryContext, Retriever};
use crate::settings::Settings;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KbStats {
    pub knowledge_dir: String,
    pub corpus_missing: bool,
    pub files: usize,
    pub skipped_files: usize,
    pub fragments: usize,
    pub embedded: usize,
    pub absent: usize,
    pub dims: Option<usize>,
    pub model: String,
    pub snapshot_key: String,
    pub built_at_ms: i64,
}

pub struct KnowledgeBase {
    knowledge_dir: PathBuf,
    top_k: usize,
    index: EmbeddingIndex,
    snapshot: Arc<Snapshot>,
    last_load: CorpusLoad,
}

impl KnowledgeBase {
    /// Load the corpus and build (or reuse) its snapshot. Blocks until ready.
    pub fn open(
        settings: &Settings,
        provider: Box<dyn EmbeddingProvider>,
        cache: Box<dyn SnapshotCache>,
    ) -> Result<Self> {
        let mut index = EmbeddingIndex::new(provider, cache, settings.embedding_model.clone())
            .with_min_fragment_chars(settings.min_fragment_chars);

        let load = corpus::load_fragments(&settings.knowledge_dir);
        let (snapshot, _) = index.build(&load.fragments)?;

        Ok(Self {
            knowledge_dir: settings.knowledge_dir.clone(),
            top_k: settings.top_k,
            index,
            snapshot,
            last_load: load,
        })
    }

    /// Reload the corpus and swap in its snapshot.
    ///
    /// Returns true if the served snapshot changed. On error the current snapshot
    /// stays servable.
    pub fn refresh(&mut self) -> Result<bool> {
        let load = corpus::load_fragments(&self.knowledge_dir);
        let (snapshot, outcome) = self.index.build(&load.fragments)?;
        let changed = snapshot.key() != self.snapshot.key() || outcome == BuildOutcome::Built;
        if changed {
            log::info!(
                "Serving snapshot {} ({} fragments)",
                snapshot.key().short(),
                snapshot.len()
            );
        }
        self.snapshot = snapshot;
        self.last_load = load;
        Ok(changed)
    }

    /// Drop the served snapshot from the cache so the next refresh re-embeds.
    /// The in-memory snapshot keeps serving until then.
    pub fn invalidate(&mut self) -> Result<bool> {
        let key = self.snapshot.key().clone();
        let removed = self.index.invalidate(&key)?;
        log::info!("Invalidated snapshot {} (was cached: {})", key.short(), removed);
        Ok(removed)
    }

    /// Empty the snapshot cache, including entries for other corpora or settings.
    /// Like `invalidate`, the served snapshot stays until the next refresh.
    pub fn clear_cache(&mut self) -> Result<()> {
        self.index.clear_cache()?;
        log::info!("Snapshot cache cleared for {}", self.knowledge_dir.display());
        Ok(())
    }

    pub fn retrieve(&self, query: &str) -> Result<QueryContext> {
        self.retriever(self.top_k).retrieve(query)
    }

    pub fn retrieve_top(&self, query: &str, top_k: usize) -> Result<QueryContext> {
        self.retriever(top_k).retrieve(query)
    }

    pub fn retriever(&self, top_k: usize) -> Retriever<'_> {
        Retriever::new(self.index.provider(), &self.snapshot).with_top_k(top_k)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn stats(&self) -> KbStats {
        KbStats {
            knowledge_dir: self.knowledge_dir.to_string_lossy().to_string(),
            corpus_missing: self.last_load.missing.is_some(),
            files: self.last_load.files.len(),
            skipped_files: self.last_load.skipped.len(),
            fragments: self.snapshot.len(),
            embedded: self.snapshot.embedded_count(),
            absent: self.snapshot.absent_count(),
            dims: self.snapshot.dims(),
            model: self.snapshot.model().to_string(),
            snapshot_key: self.snapshot.key().to_string(),
            built_at_ms: self.snapshot.built_at().timestamp_millis(),
        }
    }
}
