//! OpenAI Chat Completions
//!
//! source: https://platform.openai.com/docs/api-reference/chat

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use super::{GenerationParams, LlmProvider, Message, TokenStream};
use crate::error::{from_request_error, RagError, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// 기본 모델
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// OpenAI 채팅 모델
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    params: GenerationParams,
    /// 비스트리밍 요청 전체 타임아웃
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(
        api_key: Option<String>,
        model: String,
        params: GenerationParams,
        timeout: Duration,
    ) -> Result<Self> {
        // 스트리밍 응답은 길어질 수 있으므로 클라이언트에는 연결/읽기 간격만 제한
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
            params,
            timeout,
        })
    }

    /// 베이스 URL 변경 (호환 서버용)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_builder(&self, prompt: &str, stream: bool) -> Result<reqwest::RequestBuilder> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RagError::MissingApiKey("OPENAI_API_KEY".to_string()))?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![Message::user(prompt)],
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
            stream,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        tracing::debug!("OpenAI request to {} (stream={})", url, stream);

        let builder = self.client.post(url).bearer_auth(api_key).json(&body);
        Ok(if stream {
            builder
        } else {
            builder.timeout(self.timeout)
        })
    }
}

/// SSE 데이터 한 줄에서 텍스트 조각 추출
fn parse_delta(data: &str) -> Result<Option<String>> {
    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| RagError::Generation(format!("failed to parse stream chunk: {}", e)))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}

fn map_stream_error(err: reqwest_eventsource::Error) -> RagError {
    match err {
        reqwest_eventsource::Error::Transport(e) => {
            from_request_error(e, "OpenAI streaming request", RagError::Generation)
        }
        other => RagError::Generation(format!("OpenAI stream error: {}", other)),
    }
}

#[async_trait]
impl LlmProvider for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .request_builder(prompt, false)?
            .send()
            .await
            .map_err(|e| from_request_error(e, "OpenAI chat request", RagError::Generation))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| from_request_error(e, "OpenAI chat response", RagError::Generation))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                RagError::Generation("missing choices[0].message.content".to_string())
            })
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let builder = self.request_builder(prompt, true)?;
        let mut es = EventSource::new(builder)
            .map_err(|e| RagError::Generation(format!("failed to open event stream: {}", e)))?;
        // 재연결하지 않음 - 재시도 정책은 호출자 몫
        es.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        let stream = async_stream::stream! {
            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(msg)) => {
                        if msg.data.trim() == "[DONE]" {
                            break;
                        }
                        match parse_delta(&msg.data) {
                            Ok(Some(text)) => {
                                yield Ok::<String, RagError>(text);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                yield Err(e);
                                break;
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        yield Err(map_stream_error(e));
                        break;
                    }
                }
            }
            es.close();
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
