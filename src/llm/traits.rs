//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Groq / Mock / Scripted）实现 LlmClient::complete(messages, model)。
//! RetryingLlmClient 为任意后端加单次超时与有限次指数退避重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// completion 后端错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("api error: {0}")]
    ApiError(String),
}

impl LlmError {
    /// ApiError 一般是请求本身有问题（4xx），重试无意义
    pub fn is_transient(&self) -> bool {
        !matches!(self, LlmError::ApiError(_))
    }
}

/// LLM 客户端 trait：有序消息 + 模型名 -> 文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message], model: &str) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试配置：最大尝试次数、退避区间、单次调用超时
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次失败后的等待时间（attempt 从 1 开始），指数增长并封顶
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// 带超时与重试的包装客户端
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message], model: &str) -> Result<String, LlmError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(
                self.config.attempt_timeout,
                self.inner.complete(messages, model),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(LlmError::Timeout(self.config.attempt_timeout)),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let mut wait = self.config.backoff_for(attempt);
                    if let LlmError::RateLimited { retry_after_ms } = &e {
                        wait = wait.max(Duration::from_millis(*retry_after_ms));
                    }
                    tracing::warn!(attempt, error = %e, wait_ms = wait.as_millis() as u64, "completion failed, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
