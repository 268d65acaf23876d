//! 抓取服务：GET URL，HTML 转可读文本
//!
//! 域名白名单为空时不限制；响应超过 max_result_chars 时截断并追加 ...[truncated]。
//! 对 HTML 响应使用 html2text 提取可读文本，并从 <title> 取标题。

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::ServiceError;
use crate::web::search::request_error;

/// 抓取到的文档
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text_content: String,
    pub title: Option<String>,
    /// 来源 URL
    pub source: String,
}

/// 抓取服务边界
#[async_trait]
pub trait FetchService: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Document, ServiceError>;
}

pub struct HttpFetcher {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 判断内容是否像 HTML
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20 && s.contains('<') && (s.contains("</") || s.contains("<head") || s.contains("<title")))
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex is valid"))
}

/// 从 HTML 取 <title>
pub fn extract_title(html: &str) -> Option<String> {
    title_regex()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}

/// 从 URL 中提取 host
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

fn truncate(body: String, max_chars: usize) -> String {
    if body.chars().count() > max_chars {
        body.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        body
    }
}

impl HttpFetcher {
    pub fn new(allowed_domains: Vec<String>, timeout_secs: u64, max_result_chars: usize) -> Self {
        const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains: allowed_domains.into_iter().map(|s| s.to_lowercase()).collect(),
            max_result_chars,
        }
    }

    fn is_allowed(&self, url: &str) -> Result<(), ServiceError> {
        let domain = extract_domain(url)
            .ok_or_else(|| ServiceError::transport("fetch", format!("invalid url: {url}")))?;
        if self.allowed_domains.is_empty() || self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(ServiceError::transport(
            "fetch",
            format!("domain not in allowlist: {domain}"),
        ))
    }

    /// 原始响应体 -> Document
    pub fn to_document(&self, url: &str, mut body: String) -> Document {
        if body.starts_with('\u{FEFF}') {
            body = body['\u{FEFF}'.len_utf8()..].to_string();
        }
        let (title, text) = if looks_like_html(&body) {
            let title = extract_title(&body);
            let text = match from_read(body.as_bytes(), 120) {
                Ok(t) if !t.trim().is_empty() => t,
                _ => strip_html_tags(&body),
            };
            (title, text)
        } else {
            (None, body)
        };
        Document {
            text_content: truncate(text, self.max_result_chars),
            title,
            source: url.to_string(),
        }
    }
}

#[async_trait]
impl FetchService for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Document, ServiceError> {
        self.is_allowed(url)?;
        tracing::info!(url = %url, "fetch");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error("fetch", e))?;
        if !resp.status().is_success() {
            return Err(ServiceError::Status {
                service: "fetch",
                status: resp.status().as_u16(),
            });
        }
        let body = resp
            .text()
            .await
            .map_err(|e| ServiceError::transport("fetch", format!("read body: {e}")))?;
        Ok(self.to_document(url, body))
    }
}
