//! 搜索服务：SearxNG JSON API
//!
//! GET `{instance}/search?q=..&format=json`，可选 categories / engines（逗号拼接）/ language / pageno；
//! 解析 results[] 与 suggestions[]。请求带超时与 User-Agent。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::ServiceError;

/// 搜索选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub engines: Vec<String>,
    pub language: Option<String>,
    pub page: Option<u32>,
}

impl SearchOptions {
    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Self::default()
        }
    }
}

/// 单条搜索结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub img_src: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// 搜索服务边界
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, ServiceError>;
}

/// SearxNG 实例客户端
pub struct SearxngClient {
    client: Client,
    instance: String,
}

impl SearxngClient {
    pub fn new(instance: impl Into<String>, timeout_secs: u64) -> Self {
        const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            instance: instance.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/search", self.instance)
    }
}

/// 构造查询参数
pub fn query_params(query: &str, options: &SearchOptions) -> Vec<(&'static str, String)> {
    let mut params = vec![("q", query.to_string()), ("format", "json".to_string())];
    if !options.categories.is_empty() {
        params.push(("categories", options.categories.join(",")));
    }
    if !options.engines.is_empty() {
        params.push(("engines", options.engines.join(",")));
    }
    if let Some(language) = &options.language {
        params.push(("language", language.clone()));
    }
    if let Some(page) = options.page {
        params.push(("pageno", page.to_string()));
    }
    params
}

#[async_trait]
impl SearchService for SearxngClient {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, ServiceError> {
        tracing::info!(query = %query, "searxng search");
        let resp = self
            .client
            .get(self.endpoint())
            .query(&query_params(query, options))
            .send()
            .await
            .map_err(|e| request_error("search", e))?;
        if !resp.status().is_success() {
            return Err(ServiceError::Status {
                service: "search",
                status: resp.status().as_u16(),
            });
        }
        resp.json::<SearchResponse>()
            .await
            .map_err(|e| ServiceError::transport("search", format!("decode body: {e}")))
    }
}

/// reqwest 超时映射为 Timeout，其余为 Transport
pub(crate) fn request_error(service: &'static str, err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout {
            service,
            after: Duration::ZERO,
        }
    } else {
        ServiceError::transport(service, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_join_lists() {
        let opts = SearchOptions {
            categories: vec!["general".into(), "it".into()],
            engines: vec!["duckduckgo".into()],
            language: Some("en".into()),
            page: Some(2),
        };
        let params = query_params("rust orm", &opts);
        assert!(params.contains(&("q", "rust orm".to_string())));
        assert!(params.contains(&("format", "json".to_string())));
        assert!(params.contains(&("categories", "general,it".to_string())));
        assert!(params.contains(&("engines", "duckduckgo".to_string())));
        assert!(params.contains(&("language", "en".to_string())));
        assert!(params.contains(&("pageno", "2".to_string())));
    }

    #[test]
    fn test_query_params_minimal() {
        let params = query_params("x", &SearchOptions::default());
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let resp: SearchResponse = serde_json::from_str(
            r#"{"results": [{"title": "T", "url": "https://a", "score": 1.0}]}"#,
        )
        .unwrap();
        assert_eq!(resp.results[0].content, None);
        assert!(resp.suggestions.is_empty());
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let c = SearxngClient::new("https://searx.be/", 5);
        assert_eq!(c.endpoint(), "https://searx.be/search");
    }
}
