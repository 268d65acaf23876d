//! Groq API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.groq.com/openai/v1
//! - 默认模型: llama-3.1-70b-versatile

use crate::llm::OpenAiClient;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.1-70b-versatile";

/// 创建 Groq 客户端
///
/// - 优先使用环境变量 `GROQ_API_KEY`，其次 `OPENAI_API_KEY`
/// - base_url 可覆盖（自建代理）
pub fn create_groq_client(base_url: Option<&str>, model: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("GROQ_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    let model = model.unwrap_or(GROQ_DEFAULT_MODEL);
    OpenAiClient::new(
        Some(base_url.unwrap_or(GROQ_BASE_URL)),
        model,
        Some(api_key.as_str()),
    )
}
