// retrieval.rs — Cosine scoring and top-K selection over a snapshot.
//
// 1. Embed the query with the snapshot's model
// 2. Score every fragment (absent embeddings get ABSENT_SCORE)
// 3. Sort by score DESC, then position ASC
// 4. Keep at most K fragments that have an embedding
//
// Purely read-only over the snapshot.

use std::cmp::Ordering;

use serde::Serialize;

use crate::config;
use crate::embeddings::{embed_checked, EmbeddingProvider, Snapshot};
use crate::error::{KbError, Result};

/// Cosine similarity: dot(a, b) / (|a| * |b|).
///
/// A zero-magnitude or non-finite vector scores 0.0 against anything. Vectors of different
/// length are a configuration error and are never truncated or padded.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(KbError::DimensionMismatch {
            expected: b.len(),
            got: a.len(),
        });
    }

    // Accumulate in f64: squares of any finite f32 neither underflow nor overflow there.
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }
    let cos = dot / denom;
    // NaN/inf components must never outrank a real match.
    if !cos.is_finite() {
        return Ok(0.0);
    }
    Ok(cos.clamp(-1.0, 1.0) as f32)
}

/// One selected fragment with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedFragment {
    pub position: usize,
    pub score: f32,
    pub text: String,
}

/// Fragments selected for one query, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    pub fragments: Vec<RankedFragment>,
    pub block: String,
}

impl QueryContext {
    pub fn from_ranked(fragments: Vec<RankedFragment>) -> Self {
        let block = fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(config::retrieval::CONTEXT_SEPARATOR);
        Self { fragments, block }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

pub struct Retriever<'a> {
    provider: &'a dyn EmbeddingProvider,
    snapshot: &'a Snapshot,
    top_k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, snapshot: &'a Snapshot) -> Self {
        Self {
            provider,
            snapshot,
            top_k: config::retrieval::DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn retrieve(&self, query: &str) -> Result<QueryContext> {
        if self.snapshot.embedded_count() == 0 || self.top_k == 0 {
            log::info!("No embedded fragments to search, returning empty context");
            return Ok(QueryContext::default());
        }

        let query_vec = embed_checked(self.provider, self.snapshot.model(), query)
            .map_err(|e| KbError::provider(None, e))?;

        let ranked = self.rank(&query_vec)?;
        log::info!(
            "Retrieved {} fragments for query \"{}\" (top score {:.4})",
            ranked.len(),
            preview(query),
            ranked.first().map(|f| f.score).unwrap_or(config::retrieval::ABSENT_SCORE)
        );
        Ok(QueryContext::from_ranked(ranked))
    }

    /// Rank the snapshot against an already computed query embedding.
    pub fn rank(&self, query_vec: &[f32]) -> Result<Vec<RankedFragment>> {
        if let Some(dims) = self.snapshot.dims() {
            if dims != query_vec.len() {
                return Err(KbError::DimensionMismatch {
                    expected: dims,
                    got: query_vec.len(),
                });
            }
        }

        let mut scored: Vec<(usize, f32, bool)> = Vec::with_capacity(self.snapshot.len());
        for (position, _, embedding) in self.snapshot.entries() {
            match embedding {
                Some(v) => scored.push((position, cosine_similarity(query_vec, v)?, true)),
                None => scored.push((position, config::retrieval::ABSENT_SCORE, false)),
            }
        }

        scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });

        let fragments = self.snapshot.fragments();
        Ok(scored
            .into_iter()
            .filter(|&(_, _, has_embedding)| has_embedding)
            .take(self.top_k)
            .map(|(position, score, _)| RankedFragment {
                position,
                score,
                text: fragments[position].clone(),
            })
            .collect())
    }
}

fn preview(s: &str) -> String {
    s.chars().take(config::logging::LOG_TEXT_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::index::tests::{scenario_fragments, scenario_provider, FakeProvider};
    use crate::embeddings::{EmbeddingIndex, MemoryCache, SnapshotKey};
    use chrono::Utc;

    fn snapshot_of(fragments: &[&str], embeddings: Vec<Option<Vec<f32>>>) -> Snapshot {
        let fragments: Vec<String> = fragments.iter().map(|s| s.to_string()).collect();
        let key = SnapshotKey::for_fragments("m", 20, &fragments);
        Snapshot::new(key, "m", fragments, embeddings, Utc::now()).unwrap()
    }

    #[test]
    fn test_cosine_self_similarity_is_one() {
        for v in [vec![1.0, 2.0, 3.0], vec![-0.3, 0.0, 7.5, 1e-3], vec![42.0]] {
            let s = cosine_similarity(&v, &v).unwrap();
            assert!((s - 1.0).abs() < 1e-6, "got {s}");
        }
    }

    #[test]
    fn test_cosine_orthogonal_opposite_and_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]).unwrap() + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 0.0);
        // Magnitude does not matter.
        let a = cosine_similarity(&[1.0, 1.0], &[3.0, 3.0]).unwrap();
        assert!((a - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_self_similarity_at_extreme_magnitudes() {
        for v in [vec![1e-30f32, 2e-30], vec![1e20f32, 2e20], vec![f32::MAX, f32::MAX], vec![1e-45f32, 0.0]] {
            let s = cosine_similarity(&v, &v).unwrap();
            assert!((s - 1.0).abs() < 1e-6, "{v:?} got {s}");
        }
    }

    #[test]
    fn test_cosine_non_finite_scores_zero() {
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_nan_embedding_never_outranks_real_match() {
        let snap = snapshot_of(&["broken", "good"], vec![Some(vec![f32::NAN, 0.0]), Some(vec![1.0, 0.1])]);
        let provider = FakeProvider::default();
        let ranked = Retriever::new(&provider, &snap).with_top_k(2).rank(&[1.0, 0.0]).unwrap();
        assert_eq!(ranked[0].text, "good");
        assert_eq!(ranked[1].score, 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch_is_an_error() {
        let err = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, KbError::DimensionMismatch { expected: 2, got: 3 }));
    }

    #[test]
    fn test_scenario_returns_valid_fragments_only_in_rank_order() {
        let provider = scenario_provider();
        let mut index = EmbeddingIndex::new(
            Box::new(provider.clone()),
            Box::new(MemoryCache::new()),
            "test-model",
        );
        let (snap, _) = index.build(&scenario_fragments()).unwrap();

        let ctx = Retriever::new(index.provider(), &snap)
            .with_top_k(3)
            .retrieve("How to optimize processes?")
            .unwrap();

        let texts: Vec<&str> = ctx.fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Fragment B about process optimization.", "Fragment A about finance."]
        );
        assert_eq!(
            ctx.block,
            "Fragment B about process optimization.\n\nFragment A about finance."
        );
        assert!(ctx.fragments[0].score > ctx.fragments[1].score);
        // Query embedded with the index model.
        assert_eq!(provider.calls.borrow().last().unwrap().0, "test-model");
    }

    #[test]
    fn test_top_k_is_a_maximum() {
        let snap = snapshot_of(
            &["a", "b", "c", "d"],
            vec![
                Some(vec![1.0, 0.0]),
                Some(vec![0.9, 0.1]),
                Some(vec![0.0, 1.0]),
                Some(vec![0.5, 0.5]),
            ],
        );
        let provider = FakeProvider::default();
        let ranked = Retriever::new(&provider, &snap).with_top_k(2).rank(&[1.0, 0.0]).unwrap();
        assert_eq!(ranked.iter().map(|r| r.position).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_ties_break_by_lower_position() {
        let snap = snapshot_of(
            &["first", "second", "third"],
            vec![Some(vec![0.0, 1.0]), Some(vec![1.0, 0.0]), Some(vec![2.0, 0.0])],
        );
        let provider = FakeProvider::default();
        let ranked = Retriever::new(&provider, &snap).with_top_k(3).rank(&[1.0, 0.0]).unwrap();
        assert_eq!(ranked.iter().map(|r| r.position).collect::<Vec<_>>(), vec![1, 2, 0]);
    }

    #[test]
    fn test_absent_never_selected_even_against_negative_scores() {
        let snap = snapshot_of(&["opposite", "short"], vec![Some(vec![-1.0, 0.0]), None]);
        let provider = FakeProvider::default();
        let ranked = Retriever::new(&provider, &snap).with_top_k(2).rank(&[1.0, 0.0]).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].text, "opposite");
    }

    #[test]
    fn test_query_dimension_mismatch_fails() {
        let snap = snapshot_of(&["a"], vec![Some(vec![1.0, 0.0])]);
        let provider = FakeProvider::default();
        let err = Retriever::new(&provider, &snap).rank(&[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, KbError::DimensionMismatch { expected: 2, got: 3 }));
    }

    #[test]
    fn test_empty_snapshot_skips_provider() {
        let snap = Snapshot::empty("m");
        let provider = FakeProvider::default();
        provider.failing.set(true);
        let ctx = Retriever::new(&provider, &snap).retrieve("anything").unwrap();
        assert!(ctx.is_empty());
        assert_eq!(ctx.block, "");
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_query_embedding_failure_is_surfaced() {
        let snap = snapshot_of(&["a"], vec![Some(vec![1.0, 0.0])]);
        let provider = FakeProvider::default();
        provider.failing.set(true);
        let err = Retriever::new(&provider, &snap).retrieve("q").unwrap_err();
        assert!(matches!(err, KbError::EmbeddingProvider { position: None, .. }));
    }

    #[test]
    fn test_empty_query_vector_is_rejected() {
        let snap = snapshot_of(&["a"], vec![Some(vec![1.0, 0.0])]);
        let provider = FakeProvider::with(&[("q", vec![])]);
        let err = Retriever::new(&provider, &snap).retrieve("q").unwrap_err();
        assert!(matches!(
            err,
            KbError::EmbeddingProvider { position: None, source: crate::error::ProviderError::EmptyResponse }
        ));
    }

    #[test]
    fn test_repeated_retrieval_is_identical() {
        let provider = scenario_provider();
        let mut index = EmbeddingIndex::new(
            Box::new(provider.clone()),
            Box::new(MemoryCache::new()),
            "test-model",
        );
        let (snap, _) = index.build(&scenario_fragments()).unwrap();
        let retriever = Retriever::new(index.provider(), &snap);
        let first = retriever.retrieve("How to optimize processes?").unwrap();
        let second = retriever.retrieve("How to optimize processes?").unwrap();
        assert_eq!(first, second);
    }
}
