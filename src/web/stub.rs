//! 内存版搜索 / 抓取服务（测试与离线运行）

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::ServiceError;
use crate::web::{Document, FetchService, SearchOptions, SearchResponse, SearchService};

/// 对任何查询返回同一个响应，并记录查询
#[derive(Debug, Default)]
pub struct StaticSearch {
    response: SearchResponse,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new(response: SearchResponse) -> Self {
        Self {
            response,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SearchService for StaticSearch {
    async fn search(
        &self,
        query: &str,
        _options: &SearchOptions,
    ) -> Result<SearchResponse, ServiceError> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());
        Ok(self.response.clone())
    }
}

/// URL -> 文档表；未知 URL 返回 HTTP 404
#[derive(Debug, Default)]
pub struct StaticFetch {
    pages: HashMap<String, Document>,
    hits: AtomicUsize,
}

impl StaticFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, title: &str, text: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Document {
                text_content: text.to_string(),
                title: Some(title.to_string()),
                source: url.to_string(),
            },
        );
        self
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchService for StaticFetch {
    async fn fetch(&self, url: &str) -> Result<Document, ServiceError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.pages.get(url).cloned().ok_or(ServiceError::Status {
            service: "fetch",
            status: 404,
        })
    }
}
