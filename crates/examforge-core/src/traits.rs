//! Core trait definitions for embedding backends, the analysis
//! collaborator, and the question source.
//!
//! These async traits are implemented by the `examforge-providers` and
//! `examforge-index` crates respectively.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisReport, PerformanceSummary};
use crate::model::{Difficulty, ExamType, Question};

// ---------------------------------------------------------------------------
// Embedding provider trait
// ---------------------------------------------------------------------------

/// Trait for backends that turn question text into embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai").
    fn name(&self) -> &str;

    /// Embed one text into a fixed-length vector.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Length of the vectors this provider produces.
    fn dimension(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Analysis collaborator trait
// ---------------------------------------------------------------------------

/// Trait for the narrative analysis collaborator.
///
/// Implementations may fail or stall; callers go through
/// [`crate::analysis::analyze_or_fallback`], which bounds the call with a
/// deadline and substitutes a deterministic fallback report.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a structured analysis of one evaluated test.
    async fn analyze(&self, summary: &PerformanceSummary) -> anyhow::Result<AnalysisReport>;
}

// ---------------------------------------------------------------------------
// Question source trait
// ---------------------------------------------------------------------------

/// A metadata-filtered, exclusion-aware question lookup.
///
/// With `query` set, results are ranked by semantic similarity (closest
/// first). Without it, results carry no ordering guarantee and callers must
/// not read relevance into the order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub exam_type: Option<ExamType>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub exclude_ids: HashSet<String>,
    pub limit: usize,
}

impl SearchRequest {
    pub fn for_exam(exam_type: ExamType, limit: usize) -> Self {
        Self {
            exam_type: Some(exam_type),
            limit,
            ..Self::default()
        }
    }
}

/// Trait for the question repository the selector draws from.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Search questions by semantic query and/or metadata filters.
    async fn search(&self, request: &SearchRequest) -> anyhow::Result<Vec<Question>>;

    /// Fetch a single question by id.
    async fn get(&self, exam_type: ExamType, id: &str) -> Option<Question>;

    /// Number of questions indexed for an exam type.
    async fn count(&self, exam_type: ExamType) -> usize;
}

// ---------------------------------------------------------------------------
// JSON extraction from collaborator replies
// ---------------------------------------------------------------------------

/// Extract the first JSON object from a possibly markdown-fenced reply.
///
/// Handles:
/// - ```json fenced blocks (fence content returned)
/// - generic ``` fences
/// - raw replies with surrounding prose (outermost `{ ... }` returned)
pub fn extract_json_from_markdown(response: &str) -> Option<String> {
    let trimmed = response.trim();

    // Fenced block first.
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        let body = match body.find("```") {
            Some(end) => &body[..end],
            None => body, // truncated fence, take what is there
        };
        let body = body.trim();
        if body.starts_with('{') {
            return Some(body.to_string());
        }
    }

    // Outermost braces in a raw reply.
    let open = trimmed.find('{')?;
    let close = trimmed.rfind('}')?;
    if close > open {
        Some(trimmed[open..=close].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_from_json_fence() {
        let input = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json_from_markdown(input).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn extract_from_generic_fence() {
        let input = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_from_markdown(input).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn extract_from_raw_reply_with_prose() {
        let input = "The analysis follows. {\"a\": {\"b\": 2}} Hope it helps.";
        assert_eq!(
            extract_json_from_markdown(input).unwrap(),
            "{\"a\": {\"b\": 2}}"
        );
    }

    #[test]
    fn extract_from_truncated_fence() {
        let input = "```json\n{\"a\": 1}";
        assert_eq!(extract_json_from_markdown(input).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn extract_nothing_from_plain_text() {
        assert!(extract_json_from_markdown("no json here").is_none());
    }

    #[test]
    fn search_request_default_is_unfiltered() {
        let req = SearchRequest::for_exam(ExamType::JeeMain, 10);
        assert!(req.query.is_none());
        assert!(req.exclude_ids.is_empty());
        assert_eq!(req.limit, 10);
    }
}
