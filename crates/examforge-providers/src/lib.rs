//! examforge-providers — Embedding and analysis backend integrations.
//!
//! Implements the `EmbeddingProvider` trait for an HTTP embeddings API and
//! a deterministic local embedder, and the `AnalysisProvider` trait for an
//! Anthropic-style messages API, allowing examforge to run fully offline or
//! against hosted backends.

pub mod anthropic;
pub mod config;
pub mod http;
pub mod local;
pub mod mock;

pub use config::{
    create_analyzer, create_embedder, load_config, load_config_from, AnalysisConfig,
    EmbeddingConfig, ExamforgeConfig,
};
