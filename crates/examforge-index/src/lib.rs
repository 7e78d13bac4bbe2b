//! examforge-index — In-memory semantic question index.
//!
//! Implements the `QuestionSource` trait for the adaptive selector:
//! per-exam-type collections with metadata-filtered, exclusion-aware
//! nearest-neighbor search and a bounded embedding cache.

pub mod cache;
pub mod repository;

pub use cache::EmbeddingCache;
pub use repository::{CollectionStats, QuestionRepository, RepositoryConfig};
