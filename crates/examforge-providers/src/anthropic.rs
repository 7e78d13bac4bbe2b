//! Anthropic messages API implementation of the analysis collaborator.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use examforge_core::analysis::{
    AnalysisMetadata, AnalysisReport, OverallAnalysis, PerformanceSummary, SubjectAnalysis,
    ANALYSIS_VERSION,
};
use examforge_core::error::ProviderError;
use examforge_core::traits::{extract_json_from_markdown, AnalysisProvider};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const SYSTEM_PROMPT: &str = "You are an exam-preparation analyst. You receive a JSON performance summary of one practice test. Respond ONLY with a JSON object of the shape {\"overall\": {\"score_percentage\": number, \"performance_level\": string, \"summary\": string}, \"subjects\": {\"<subject>\": {\"accuracy\": number, \"recommendations\": [string]}}}. No prose outside the JSON.";

/// Analysis provider backed by the Anthropic messages API.
pub struct AnthropicAnalysisProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicAnalysisProvider {
    pub fn new(api_key: &str, base_url: Option<String>, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.to_string(),
            client,
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// The collaborator's reply shape; metadata is stamped on locally.
#[derive(Deserialize)]
struct ParsedAnalysis {
    overall: OverallAnalysis,
    #[serde(default)]
    subjects: HashMap<String, SubjectAnalysis>,
}

#[async_trait]
impl AnalysisProvider for AnthropicAnalysisProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, summary), fields(model = %self.model, test_id = %summary.test_id))]
    async fn analyze(&self, summary: &PerformanceSummary) -> anyhow::Result<AnalysisReport> {
        let start = Instant::now();

        let prompt = format!(
            "Performance summary:\n{}",
            serde_json::to_string_pretty(summary)?
        );

        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: 2048,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(DEFAULT_TIMEOUT_SECS)
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                * 1000;
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            }
            .into());
        }
        if status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::AuthenticationFailed(body).into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ProviderError::ApiError { status, message }.into());
        }

        let api_response: MessagesResponse =
            response.json().await.map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let text = api_response
            .content
            .first()
            .map(|c| c.text.as_str())
            .unwrap_or_default();
        let json = extract_json_from_markdown(text)
            .ok_or_else(|| ProviderError::MalformedResponse("no JSON object in reply".into()))?;
        let parsed: ParsedAnalysis = serde_json::from_str(&json)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        tracing::debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "analysis generated"
        );

        Ok(AnalysisReport {
            overall: parsed.overall,
            subjects: parsed.subjects,
            metadata: AnalysisMetadata {
                generated_at: chrono::Utc::now(),
                model: api_response.model,
                version: ANALYSIS_VERSION.to_string(),
            },
        })
    }
}
