//! completion 输出解析
//!
//! 模型可能把 JSON 包在 ```json 代码块或说明文字里；取出第一个 JSON 对象/数组后反序列化，
//! 失败即 MalformedCompletion，不做猜测。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use crate::core::AgentError;

/// 从文本中提取 JSON 片段（```json 块优先，其次首个 `{`/`[` 到最后一个对应的 `}`/`]`）
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let block = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some(block.trim());
    }

    let obj = trimmed.find('{');
    let arr = trimmed.find('[');
    let (open, close) = match (obj, arr) {
        (Some(o), Some(a)) if a < o => (a, ']'),
        (Some(o), _) => (o, '}'),
        (None, Some(a)) => (a, ']'),
        (None, None) => return None,
    };
    let end = trimmed.rfind(close)?;
    if end < open {
        return None;
    }
    Some(&trimmed[open..=end])
}

/// 解析 completion 为 T；`what` 用于错误信息
pub fn parse_completion<T: DeserializeOwned>(output: &str, what: &str) -> Result<T, AgentError> {
    let json = extract_json(output).ok_or_else(|| {
        AgentError::MalformedCompletion(format!("expected {what}, found no JSON in: {}", preview(output)))
    })?;
    serde_json::from_str(json).map_err(|e| {
        AgentError::MalformedCompletion(format!("expected {what}: {e}: {}", preview(json)))
    })
}

/// 结构的 JSON Schema，拼进 prompt 约束模型输出
pub fn schema_json<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
