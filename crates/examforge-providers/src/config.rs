//! Provider configuration and factories.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examforge_core::traits::{AnalysisProvider, EmbeddingProvider};

use crate::anthropic::AnthropicAnalysisProvider;
use crate::http::HttpEmbeddingProvider;
use crate::local::{LocalEmbeddingProvider, DEFAULT_DIMENSION};

/// Configuration for the embedding backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in
/// logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint.
    Http {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default = "default_embedding_model")]
        model: String,
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
    /// Deterministic trigram-hash embedder; fully offline.
    Local {
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingConfig::Http {
                api_key: _,
                base_url,
                model,
                dimension,
            } => f
                .debug_struct("Http")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .field("dimension", dimension)
                .finish(),
            EmbeddingConfig::Local { dimension } => {
                f.debug_struct("Local").field("dimension", dimension).finish()
            }
        }
    }
}

/// Configuration for the analysis collaborator.
#[derive(Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_analysis_model")]
    pub model: String,
    /// Deadline for one analysis call; the caller falls back after it.
    #[serde(default = "default_analysis_timeout")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Top-level examforge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamforgeConfig {
    #[serde(default = "default_embedding")]
    pub embedding: EmbeddingConfig,
    /// Absent means analysis always resolves to the deterministic fallback.
    #[serde(default)]
    pub analysis: Option<AnalysisConfig>,
    /// Where the CLI keeps profiles and sessions.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_exam")]
    pub default_exam: String,
}

fn default_embedding() -> EmbeddingConfig {
    EmbeddingConfig::Local {
        dimension: DEFAULT_DIMENSION,
    }
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_analysis_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_analysis_timeout() -> u64 {
    60
}
fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("./examforge-state")
}
fn default_exam() -> String {
    "JEE_MAIN".to_string()
}

impl Default for ExamforgeConfig {
    fn default() -> Self {
        Self {
            embedding: default_embedding(),
            analysis: None,
            state_dir: default_state_dir(),
            default_exam: default_exam(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examforge.toml` in the current directory
/// 2. `~/.config/examforge/config.toml`
///
/// Environment variable overrides: `EXAMFORGE_EMBEDDING_KEY`,
/// `EXAMFORGE_ANTHROPIC_KEY`.
pub fn load_config() -> Result<ExamforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamforgeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examforge.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ExamforgeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ExamforgeConfig::default(),
    };

    // Apply env var overrides.
    if let Ok(key) = std::env::var("EXAMFORGE_EMBEDDING_KEY") {
        if let EmbeddingConfig::Http { api_key, .. } = &mut config.embedding {
            *api_key = key;
        }
    }
    if let Ok(key) = std::env::var("EXAMFORGE_ANTHROPIC_KEY") {
        match &mut config.analysis {
            Some(analysis) => analysis.api_key = key,
            None => {
                config.analysis = Some(AnalysisConfig {
                    api_key: key,
                    base_url: None,
                    model: default_analysis_model(),
                    timeout_secs: default_analysis_timeout(),
                });
            }
        }
    }

    // Resolve env vars in keys and URLs.
    if let EmbeddingConfig::Http { api_key, base_url, .. } = &mut config.embedding {
        *api_key = resolve_env_vars(api_key);
        *base_url = base_url.as_ref().map(|u| resolve_env_vars(u));
    }
    if let Some(analysis) = &mut config.analysis {
        analysis.api_key = resolve_env_vars(&analysis.api_key);
        analysis.base_url = analysis.base_url.as_ref().map(|u| resolve_env_vars(u));
    }

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examforge"))
}

/// Create an embedding provider from its configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    match config {
        EmbeddingConfig::Http {
            api_key,
            base_url,
            model,
            dimension,
        } => Arc::new(HttpEmbeddingProvider::new(
            api_key,
            base_url.clone(),
            model,
            *dimension,
        )),
        EmbeddingConfig::Local { dimension } => Arc::new(LocalEmbeddingProvider::new(*dimension)),
    }
}

/// Create an analysis provider from its configuration.
pub fn create_analyzer(config: &AnalysisConfig) -> Arc<dyn AnalysisProvider> {
    Arc::new(AnthropicAnalysisProvider::new(
        &config.api_key,
        config.base_url.clone(),
        &config.model,
    ))
}
