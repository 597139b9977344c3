//! Retrieval core for a knowledge-base chat assistant.
//!
//! A folder of text documents is split into paragraph fragments, each fragment is
//! embedded once per distinct corpus content, and queries are answered with the
//! top-K fragments by cosine similarity, joined into a context block for the
//! downstream language-model call.
//!
//! ```text
//! knowledge/*.txt ──corpus──▶ fragments ──EmbeddingIndex──▶ Snapshot (cached by content)
//!                                                              │
//!                        query ──Retriever (cosine, top-K)─────┘──▶ QueryContext
//! ```

pub mod completion;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod knowledge;
pub mod openai;
pub mod retrieval;
pub mod settings;

pub use embeddings::{EmbeddingIndex, EmbeddingProvider, MemoryCache, Snapshot, SnapshotCache, SqliteCache};
pub use error::{KbError, ProviderError};
pub use knowledge::KnowledgeBase;
pub use retrieval::{cosine_similarity, QueryContext, RankedFragment, Retriever};
pub use settings::Settings;
