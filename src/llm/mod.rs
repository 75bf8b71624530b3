//! LLM 모듈 - 답변 생성 백엔드
//!
//! - [`OpenAiChat`]: OpenAI Chat Completions (SSE 스트리밍 지원)
//! - [`GeminiChat`]: Gemini `generateContent`

mod gemini;
mod openai;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;

use crate::error::Result;

pub use gemini::{GeminiChat, DEFAULT_GEMINI_MODEL};
pub use openai::{OpenAiChat, DEFAULT_OPENAI_MODEL};

/// 기본 temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// 기본 최대 출력 토큰 수
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// 부분 응답 스트림 (각 항목은 새로 생성된 텍스트 조각)
pub type TokenStream = BoxStream<'static, Result<String>>;

/// 채팅 메시지
///
/// 파이프라인은 완성된 프롬프트 하나를 사용자 메시지로 보냅니다.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// 생성 파라미터
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

// ============================================================================
// LlmProvider Trait
// ============================================================================

/// LLM 프로바이더 트레이트
///
/// 완성된 프롬프트를 받아 답변 텍스트를 생성합니다.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 프롬프트에 대한 전체 답변 생성
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// 답변을 조각 단위로 스트리밍 (기본 구현: `complete` 결과를 한 조각으로)
    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let answer = self.complete(prompt).await?;
        Ok(stream::once(async move { Ok(answer) }).boxed())
    }

    /// 모델 식별자
    fn model_name(&self) -> &str;
}
