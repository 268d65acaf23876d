//! 工具执行器
//!
//! 持有 ToolHandler 与超时，execute(call) 在超时内调用 handler.run；
//! 超时转为 ToolTimeout，其余错误原样上抛；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolCall, ToolOutput};

/// 工具实现：对 ToolCall 穷尽匹配
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn run(&self, call: ToolCall) -> Result<ToolOutput, AgentError>;
}

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    handler: Arc<dyn ToolHandler>,
    timeout: Duration,
    /// 机构类操作（assign / implement）的超时
    long_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(handler: Arc<dyn ToolHandler>, timeout_secs: u64, long_timeout_secs: u64) -> Self {
        Self {
            handler,
            timeout: Duration::from_secs(timeout_secs),
            long_timeout: Duration::from_secs(long_timeout_secs),
        }
    }

    pub fn timeout_for(&self, call: &ToolCall) -> Duration {
        if call.is_long_running() {
            self.long_timeout
        } else {
            self.timeout
        }
    }

    /// 执行工具；超时返回 ToolTimeout；输出 JSON 审计日志
    pub async fn execute(&self, call: ToolCall) -> Result<ToolOutput, AgentError> {
        let start = Instant::now();
        let tool_name = call.name();
        let args_preview = args_preview(&call);
        let result = timeout(self.timeout_for(&call), self.handler.run(call)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(r) => r,
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }
}

fn args_preview(call: &ToolCall) -> String {
    let s = serde_json::to_string(call).unwrap_or_default();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
