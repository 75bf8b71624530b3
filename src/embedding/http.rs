//! 임베딩 API 공통 HTTP 처리 - 요청 속도 제한, 재시도
//!
//! 재시도는 `embedding.max_retries`가 설정된 경우에만 수행합니다 (기본 0).
//! 재시도하지 않으면 타임아웃은 그대로 `RagError::Timeout`으로 호출자에게 전달됩니다.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{from_request_error, RagError, Result};

/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

// ============================================================================
// RateLimiter
// ============================================================================

/// 분당 요청 수 제한 + 호출 간 최소 딜레이
#[derive(Debug)]
pub struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    /// 분당 `rpm` 요청으로 제한 (최소 딜레이 = 60초 / rpm)
    pub fn per_minute(rpm: u32) -> Self {
        let rpm = rpm.max(1);
        Self {
            requests: Vec::new(),
            max_requests: rpm,
            window: Duration::from_secs(60),
            min_delay: Duration::from_millis(60_000 / rpm as u64),
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    pub async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();

        // 2. 윈도우 밖의 오래된 요청 제거
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// Request with retry
// ============================================================================

/// OpenAI / Gemini 공통 에러 응답 형태
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// JSON POST 요청 후 성공 응답 본문 반환
///
/// 429 / 5xx / 전송 오류는 `max_retries`만큼 지수 백오프로 재시도합니다.
/// 그 밖의 HTTP 에러는 즉시 `RagError::Embedding`으로 실패합니다.
pub(crate) async fn post_with_retry<F>(
    build: F,
    max_retries: u32,
    operation: &str,
    limiter: Option<&Mutex<RateLimiter>>,
) -> Result<String>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error: Option<RagError> = None;

    for attempt in 0..=max_retries {
        if let Some(limiter) = limiter {
            limiter.lock().await.acquire().await;
        }

        let response = match build().send().await {
            Ok(resp) => resp,
            Err(e) => {
                let err = from_request_error(e, operation, RagError::Embedding);
                if attempt < max_retries {
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        "{} failed ({}), retrying in {:?} (attempt {}/{})",
                        operation,
                        err,
                        backoff,
                        attempt + 1,
                        max_retries
                    );
                    last_error = Some(err);
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                return Err(err);
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| from_request_error(e, operation, RagError::Embedding))?;

        if status.is_success() {
            return Ok(body);
        }

        let message = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(api) => match api.error.status {
                Some(s) => format!("{} API error ({}): {}", operation, s, api.error.message),
                None => format!("{} API error ({}): {}", operation, status, api.error.message),
            },
            Err(_) => format!("{} API error ({}): {}", operation, status, body),
        };

        let retryable = status.as_u16() == 429 || status.is_server_error();
        if retryable && attempt < max_retries {
            let backoff = backoff_for(attempt);
            tracing::warn!(
                "{} returned {}, backing off {:?} (attempt {}/{})",
                operation,
                status,
                backoff,
                attempt + 1,
                max_retries
            );
            last_error = Some(RagError::Embedding(message));
            tokio::time::sleep(backoff).await;
            continue;
        }

        return Err(RagError::Embedding(message));
    }

    Err(last_error.unwrap_or_else(|| {
        RagError::Embedding(format!("{} failed after {} retries", operation, max_retries))
    }))
}

fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}
