//! Suggester：评审计划并给出 add / modify / remove 建议
//!
//! 评审是 (plan, 一次 completion) 的纯函数，不修改输入；开启 consult_browser 时先经图向 Browser 要一次资料。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::agents::{
    bounded, require_non_empty, Agent, AgentRole, Capabilities, Envelope, ExternalService, Reply,
    RouteContext,
};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::plan::{parse_completion, schema_json, Plan, Suggestion};

#[derive(Debug, Clone)]
pub struct SuggesterConfig {
    pub name: String,
    pub model: String,
    /// 转发 get_info 的目标
    pub browser: String,
    pub consult_browser: bool,
    pub service_timeout: Duration,
}

impl SuggesterConfig {
    pub fn new(name: impl Into<String>, model: impl Into<String>, browser: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            browser: browser.into(),
            consult_browser: false,
            service_timeout: Duration::from_secs(60),
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        require_non_empty("suggester.name", &self.name)?;
        require_non_empty("suggester.browser", &self.browser)
    }
}

/// 建议列表的两种可接受形态：裸数组，或 {"suggestions": [...]}
#[derive(Deserialize)]
#[serde(untagged)]
enum SuggestionsPayload {
    List(Vec<Suggestion>),
    Wrapped { suggestions: Vec<Suggestion> },
}

pub fn parse_suggestions(output: &str) -> Result<Vec<Suggestion>, AgentError> {
    let payload: SuggestionsPayload = parse_completion(output, "suggestion list")?;
    Ok(match payload {
        SuggestionsPayload::List(s) | SuggestionsPayload::Wrapped { suggestions: s } => s,
    })
}

pub struct Suggester {
    config: SuggesterConfig,
    llm: Arc<dyn LlmClient>,
}

impl Suggester {
    pub fn new(config: SuggesterConfig, llm: Arc<dyn LlmClient>) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self { config, llm })
    }

    pub async fn review_plan(
        &self,
        plan: &Plan,
        ctx: &RouteContext<'_>,
    ) -> Result<Vec<Suggestion>, AgentError> {
        let plan_json = serde_json::to_string_pretty(plan)
            .map_err(|e| AgentError::InvalidPlan(e.to_string()))?;

        let background = if self.config.consult_browser {
            let query = format!("Best practices and common pitfalls for building: {}", plan.project_name);
            let info = ctx
                .send(&self.config.browser, Envelope::GetInfo { query })
                .await?
                .into_text()?;
            format!("\n\nBackground research:\n{info}")
        } else {
            String::new()
        };

        let prompt = format!(
            "Review the following project plan and suggest improvements.\n\
             Respond with a JSON array of suggestions matching this schema (keys are top-level plan keys; \
             'project_name' takes a string, 'tasks' takes the full task list):\n{}\n\nPlan:\n{plan_json}{background}",
            schema_json::<Vec<Suggestion>>()
        );
        let messages = [Message::user(prompt)];
        let output = bounded(
            "completion",
            self.config.service_timeout,
            self.llm.complete(&messages, &self.config.model),
        )
        .await?;

        let suggestions = parse_suggestions(&output)?;
        tracing::info!(agent = %self.config.name, count = suggestions.len(), "plan reviewed");
        Ok(suggestions)
    }
}

#[async_trait]
impl Agent for Suggester {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn role(&self) -> AgentRole {
        AgentRole::Suggester
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            services: &[ExternalService::Completion],
            peers: &[AgentRole::Browser],
            actions: &["review_plan", "get_info"],
        }
    }

    async fn handle(&self, envelope: Envelope, ctx: &RouteContext<'_>) -> Result<Reply, AgentError> {
        match envelope {
            Envelope::ReviewPlan { plan } => self.review_plan(&plan, ctx).await.map(Reply::Suggestions),
            Envelope::GetInfo { query } => {
                ctx.send(&self.config.browser, Envelope::GetInfo { query }).await
            }
            other => Err(AgentError::UnsupportedAction {
                agent: self.config.name.clone(),
                action: other.action(),
            }),
        }
    }
}
