//! Mock / Scripted LLM 客户端（用于测试与无 Key 运行，无需 API）
//!
//! - MockLlmClient：回显最后一条 User 消息
//! - ScriptedLlmClient：按顺序弹出预置回复，并记录每次调用的消息，便于断言调用次数与 prompt

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], _model: &str) -> Result<String, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("Echo from Mock: {}", last_user))
    }
}

/// 记录下来的一次调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<Message>,
}

impl RecordedCall {
    /// 最后一条 User 消息内容
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// 脚本化客户端：队列为空时返回 ApiError("script exhausted")
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for r in responses {
            client.push_ok(r);
        }
        client
    }

    pub fn push_ok(&self, text: impl Into<String>) {
        self.lock_responses().push_back(Ok(text.into()));
    }

    pub fn push_err(&self, err: LlmError) {
        self.lock_responses().push_back(Err(err));
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock_calls().clone()
    }

    pub fn remaining(&self) -> usize {
        self.lock_responses().len()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, LlmError>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<RecordedCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message], model: &str) -> Result<String, LlmError> {
        self.lock_calls().push(RecordedCall {
            model: model.to_string(),
            messages: messages.to_vec(),
        });
        self.lock_responses()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::ApiError("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_last_user_message() {
        let out = MockLlmClient
            .complete(&[Message::system("sys"), Message::user("hello")], "m")
            .await
            .unwrap();
        assert_eq!(out, "Echo from Mock: hello");
    }

    #[tokio::test]
    async fn test_scripted_records_and_exhausts() {
        let client = ScriptedLlmClient::with_responses(["a"]);
        assert_eq!(client.complete(&[Message::user("q1")], "m1").await.unwrap(), "a");
        assert!(client.complete(&[Message::user("q2")], "m2").await.is_err());
        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].prompt(), "q1");
        assert_eq!(calls[1].model, "m2");
    }
}
