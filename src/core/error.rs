//! 错误分类
//!
//! 图误用（UnknownAgent / UnauthorizedRoute）、上游输出不可解析（MalformedCompletion）、
//! 状态机误用（AgencyNotFound / InvalidState）、校验失败（VerificationFailed）、外部服务失败（ExternalService）。
//! 下层只返回类型化错误，面向用户的文案只在 Orchestrator 渲染。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 外部服务（completion / search / fetch）失败：超时或传输错误，属于正常失败而非崩溃
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{service} timed out after {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },

    #[error("{service} transport error: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} rate limited (retry after {retry_after_ms} ms)")]
    RateLimited {
        service: &'static str,
        retry_after_ms: u64,
    },
}

impl ServiceError {
    pub fn transport(service: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            service,
            message: message.into(),
        }
    }
}

impl From<LlmError> for ServiceError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(after) => ServiceError::Timeout {
                service: "completion",
                after,
            },
            LlmError::RateLimited { retry_after_ms } => ServiceError::RateLimited {
                service: "completion",
                retry_after_ms,
            },
            LlmError::ApiError(message) | LlmError::Transport(message) => {
                ServiceError::Transport {
                    service: "completion",
                    message,
                }
            }
        }
    }
}

/// 校验拒绝：第一个不满足策略的 (task, file) 对
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub task_id: String,
    pub file_name: String,
    pub reason: String,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (task {}): {}",
            self.file_name, self.task_id, self.reason
        )
    }
}

/// 系统内所有组件级操作的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unauthorized route: {from} -> {to}")]
    UnauthorizedRoute { from: String, to: String },

    #[error("Agent {agent} does not handle action '{action}'")]
    UnsupportedAction { agent: String, action: &'static str },

    #[error("Unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply {
        expected: &'static str,
        got: &'static str,
    },

    #[error("Malformed completion: {0}")]
    MalformedCompletion(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid suggestion: {0}")]
    InvalidSuggestion(String),

    #[error("No plan available, describe a project idea first")]
    NoPlan,

    #[error("Agency not found: {0}")]
    AgencyNotFound(String),

    #[error("Agency already exists: {0}")]
    AgencyExists(String),

    #[error("Agency {agency}: '{operation}' is not valid in state {state}")]
    InvalidState {
        agency: String,
        state: &'static str,
        operation: &'static str,
    },

    #[error("Verification failed: {0}")]
    VerificationFailed(Rejection),

    #[error("External service error: {0}")]
    ExternalService(#[from] ServiceError),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        AgentError::ExternalService(err.into())
    }
}

impl AgentError {
    /// 只有外部服务失败值得由调用方重试；其余错误重试也不会改变结果
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::ExternalService(_) | AgentError::ToolTimeout(_))
    }
}
