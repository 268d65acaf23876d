//! Browser：搜索 / 抓取 / 研究问答
//!
//! 研究管线 `answer(query, chat_history)`：
//! 1. 改写：让模型改写问题，判断是否需要搜索、是否给出了链接
//! 2. 取文档：有链接则并发抓取；否则搜索一次，每条结果视为一份伪文档
//! 3. 可信度评估：每份文档一次 completion，可并发
//! 4. 对比：所有评估完成后一次 completion（汇合点）
//! 5. 最终回答：带上下文与对话历史再一次 completion
//!
//! 没有取到任何文档时直接返回固定回复，不进入 4、5。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use regex::Regex;

use crate::agents::{
    bounded, require_non_empty, Agent, AgentRole, Capabilities, Envelope, ExternalService, Reply,
    RouteContext,
};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{format_chat_history, Message};
use crate::web::{Document, FetchService, SearchOptions, SearchResponse, SearchService};

/// 改写结果为 not_needed 时的回复
pub const NOT_NEEDED_REPLY: &str = "How can I assist you with your task or writing assignment?";

/// 没有取到任何文档时的回复
pub const NO_INFORMATION_REPLY: &str =
    "I couldn't find any relevant information for this query. Try rephrasing it or asking a related question.";

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub name: String,
    pub model: String,
    /// 搜索语言
    pub language: String,
    /// 单次 completion / search / fetch 的超时
    pub service_timeout: Duration,
}

impl BrowserConfig {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            language: "en".to_string(),
            service_timeout: Duration::from_secs(60),
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        require_non_empty("browser.name", &self.name)?;
        require_non_empty("browser.language", &self.language)?;
        if self.service_timeout.is_zero() {
            return Err(AgentError::Config("browser.service_timeout must be > 0".to_string()));
        }
        Ok(())
    }
}

/// 改写步骤的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rephrased {
    /// 写作任务 / 问候，不需要检索
    NotNeeded,
    /// 用户给了链接
    Links { links: Vec<String>, question: String },
    /// 改写后的搜索词
    Query(String),
}

fn links_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<links>(.*?)</links>").expect("links regex is valid"))
}

fn question_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<question>(.*?)</question>").expect("question regex is valid"))
}

/// 解析改写输出：`not_needed`、`<links>` + `<question>` 块，或整段文本作为查询
pub fn parse_rephrased(output: &str) -> Rephrased {
    let text = output.trim();
    if text.eq_ignore_ascii_case("not_needed") {
        return Rephrased::NotNeeded;
    }

    let links: Vec<String> = links_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let question = question_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    if !links.is_empty() {
        return Rephrased::Links {
            links,
            question: question.unwrap_or_else(|| text.to_string()),
        };
    }
    Rephrased::Query(question.unwrap_or_else(|| text.to_string()))
}

pub struct Browser {
    config: BrowserConfig,
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchService>,
    fetcher: Arc<dyn FetchService>,
}

impl Browser {
    pub fn new(
        config: BrowserConfig,
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchService>,
        fetcher: Arc<dyn FetchService>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self {
            config,
            llm,
            search,
            fetcher,
        })
    }

    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, AgentError> {
        bounded(
            "search",
            self.config.service_timeout,
            self.search.search(query, options),
        )
        .await
    }

    pub async fn fetch(&self, url: &str) -> Result<Document, AgentError> {
        bounded("fetch", self.config.service_timeout, self.fetcher.fetch(url)).await
    }

    async fn complete(&self, prompt: String) -> Result<String, AgentError> {
        let messages = [Message::user(prompt)];
        bounded(
            "completion",
            self.config.service_timeout,
            self.llm.complete(&messages, &self.config.model),
        )
        .await
    }

    /// 完整研究管线
    pub async fn answer(&self, query: &str, chat_history: &[Message]) -> Result<String, AgentError> {
        let history = format_chat_history(chat_history);
        let rephrased = parse_rephrased(&self.complete(rephrase_prompt(query, &history)).await?);

        let (question, docs) = match rephrased {
            Rephrased::NotNeeded => {
                tracing::debug!(agent = %self.config.name, "research not needed");
                return Ok(NOT_NEEDED_REPLY.to_string());
            }
            Rephrased::Links { links, question } => {
                tracing::info!(agent = %self.config.name, links = links.len(), "fetching linked documents");
                let docs = try_join_all(links.iter().map(|l| self.fetch(l))).await?;
                (question, docs)
            }
            Rephrased::Query(q) => {
                let options = SearchOptions::with_language(self.config.language.clone());
                let response = self.search(&q, &options).await?;
                tracing::info!(agent = %self.config.name, results = response.results.len(), "search done");
                let docs = response
                    .results
                    .into_iter()
                    .map(|r| Document {
                        text_content: r.content.unwrap_or_default(),
                        title: Some(r.title),
                        source: r.url,
                    })
                    .collect::<Vec<_>>();
                (q, docs)
            }
        };

        if docs.is_empty() {
            return Ok(NO_INFORMATION_REPLY.to_string());
        }

        let assessments =
            try_join_all(docs.iter().map(|d| self.complete(assessment_prompt(d)))).await?;
        let comparison = self.complete(comparison_prompt(&question, &docs)).await?;
        let context = processed_context(&docs, &assessments, &comparison);

        self.complete(final_prompt(query, &context, &history)).await
    }

    fn derived_answer_query(envelope: &Envelope) -> Option<String> {
        match envelope {
            Envelope::GetInfo { query } => Some(query.clone()),
            Envelope::GetTechStack { requirements } => Some(format!(
                "What is the best backend and frontend tech stack (languages, frameworks, UI libraries) for a project with these requirements: {requirements}"
            )),
            Envelope::GetArchitecture { tech_stack } => Some(format!(
                "What software architecture best fits a project built with this tech stack: {tech_stack}"
            )),
            _ => None,
        }
    }
}

fn rephrase_prompt(query: &str, history: &str) -> String {
    format!(
        "Analyze the conversation and follow-up question below. Rephrase the question for web searching if needed.\n\
         - For writing tasks or greetings, return 'not_needed'.\n\
         - If links are provided, return them one per line inside a <links> block and the question inside a <question> block.\n\
         - For summarization requests, use 'Summarize' as the question.\n\
         - Otherwise return only the rephrased question.\n\n\
         Conversation:\n{history}\n\nFollow-up question: {query}\nRephrased question:"
    )
}

fn assessment_prompt(doc: &Document) -> String {
    format!(
        "Analyze the following content for credibility and potential biases:\n\n{}\n\n\
         Briefly assess the credibility of the source, potential biases or limitations, and corroboration with other sources.\n\nAssessment:",
        doc.text_content
    )
}

fn comparison_prompt(question: &str, docs: &[Document]) -> String {
    let listed = docs
        .iter()
        .enumerate()
        .map(|(i, d)| format!("Document {}:\n{}", i + 1, d.text_content))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Compare the following documents in relation to the query: \"{question}\"\n\nDocuments:\n{listed}\n\n\
         Highlight key similarities, notable differences and unique insights from each source.\n\nComparison:"
    )
}

fn processed_context(docs: &[Document], assessments: &[String], comparison: &str) -> String {
    let numbered = docs
        .iter()
        .zip(assessments)
        .enumerate()
        .map(|(i, (d, a))| format!("{}. {}\nCredibility Assessment: {}", i + 1, d.text_content, a))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{numbered}\n\nComparison Analysis:\n{comparison}")
}

fn final_prompt(query: &str, context: &str, history: &str) -> String {
    format!(
        "You are a research assistant. Answer the user query from the context below in an unbiased, journalistic tone, \
         using markdown and citing sources with [number] notation. If the context is insufficient, say so.\n\n\
         Context:\n<context>\n{context}\n</context>\n\n\
         Today's date is {}\n\nChat History:\n{history}\n\nUser Query: {query}\n\nResponse:",
        chrono::Local::now().to_rfc3339()
    )
}

#[async_trait]
impl Agent for Browser {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn role(&self) -> AgentRole {
        AgentRole::Browser
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            services: &[
                ExternalService::Completion,
                ExternalService::Search,
                ExternalService::Fetch,
            ],
            peers: &[],
            actions: &[
                "search",
                "fetch",
                "answer",
                "get_info",
                "get_tech_stack",
                "get_architecture",
            ],
        }
    }

    async fn handle(&self, envelope: Envelope, _ctx: &RouteContext<'_>) -> Result<Reply, AgentError> {
        if let Some(query) = Self::derived_answer_query(&envelope) {
            return self.answer(&query, &[]).await.map(Reply::Text);
        }
        match envelope {
            Envelope::Search { query, options } => self.search(&query, &options).await.map(Reply::Search),
            Envelope::Fetch { url } => self.fetch(&url).await.map(Reply::Document),
            Envelope::Answer {
                query,
                chat_history,
            } => self.answer(&query, &chat_history).await.map(Reply::Text),
            other => Err(AgentError::UnsupportedAction {
                agent: self.config.name.clone(),
                action: other.action(),
            }),
        }
    }
}
