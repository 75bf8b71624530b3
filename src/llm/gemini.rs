//! Google Gemini 텍스트 생성
//!
//! source: https://ai.google.dev/api/generate-content

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerationParams, LlmProvider};
use crate::error::{from_request_error, RagError, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 기본 모델
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Gemini 생성 모델
pub struct GeminiChat {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    params: GenerationParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiChat {
    pub fn new(
        api_key: Option<String>,
        model: String,
        params: GenerationParams,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
            params,
        })
    }

    /// 베이스 URL 변경
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.params.temperature,
                max_output_tokens: self.params.max_tokens,
            },
        }
    }
}

/// 첫 후보의 텍스트 파트를 이어 붙임
fn extract_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    Some(text)
}

#[async_trait]
impl LlmProvider for GeminiChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            RagError::MissingApiKey("GEMINI_API_KEY or GOOGLE_AI_API_KEY".to_string())
        })?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| from_request_error(e, "Gemini generate request", RagError::Generation))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "Gemini API error ({}): {}",
                status, body
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| from_request_error(e, "Gemini generate response", RagError::Generation))?;

        extract_text(parsed)
            .ok_or_else(|| RagError::Generation("Gemini returned no candidates".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let llm = GeminiChat::new(
            Some("k".to_string()),
            DEFAULT_GEMINI_MODEL.to_string(),
            GenerationParams {
                temperature: 0.1,
                max_tokens: 64,
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let json = serde_json::to_value(llm.build_request("hello")).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 64);
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello, "},{"text":"world"}]}}]}"#;
        let response: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(extract_text(response), Some("Hello, world".to_string()));

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(extract_text(empty), None);
    }

    #[tokio::test]
    async fn test_missing_key_fails_on_call() {
        let llm = GeminiChat::new(
            None,
            DEFAULT_GEMINI_MODEL.to_string(),
            GenerationParams::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(matches!(
            llm.complete("hi").await,
            Err(RagError::MissingApiKey(_))
        ));
    }
}
