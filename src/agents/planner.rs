//! Planner：用户想法 -> 计划草稿 -> Suggester 评审 -> 合入建议 -> Browser 调研技术栈与架构
//!
//! 草稿只调用一次 completion；输出解析不了就是 MalformedCompletion，不猜。
//! 调研结果写回进行中的计划（tech_stack / architecture 键），返回的计划即交付用的冻结版本。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::{
    bounded, require_non_empty, Agent, AgentRole, Capabilities, Envelope, ExternalService, Reply,
    RouteContext,
};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::plan::{
    incorporate, parse_completion, schema_json, Plan, KEY_ARCHITECTURE, KEY_REQUIREMENTS,
    KEY_TECH_STACK,
};

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub name: String,
    pub model: String,
    pub suggester: String,
    pub browser: String,
    /// 是否向 Browser 调研技术栈与架构
    pub research_stack: bool,
    pub service_timeout: Duration,
}

impl PlannerConfig {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        suggester: impl Into<String>,
        browser: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            suggester: suggester.into(),
            browser: browser.into(),
            research_stack: true,
            service_timeout: Duration::from_secs(60),
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        require_non_empty("planner.name", &self.name)?;
        require_non_empty("planner.suggester", &self.suggester)?;
        require_non_empty("planner.browser", &self.browser)
    }
}

pub struct Planner {
    config: PlannerConfig,
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(config: PlannerConfig, llm: Arc<dyn LlmClient>) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self { config, llm })
    }

    /// 一次 completion 产出计划草稿；缺 requirements 时以用户想法补上
    pub async fn draft_plan(&self, idea: &str) -> Result<Plan, AgentError> {
        let prompt = format!(
            "You are the planning agent of a development team. Turn the user's idea into a project plan: \
             choose a project name, list the requirements, and break the work into tasks with unique task_id values, \
             a description and the function names to implement.\n\
             Respond with a single JSON object matching this schema (extra keys such as requirements, tech_stack \
             and architecture are allowed):\n{}\n\nUser's idea: {idea}",
            schema_json::<Plan>()
        );
        let messages = [Message::user(prompt)];
        let output = bounded(
            "completion",
            self.config.service_timeout,
            self.llm.complete(&messages, &self.config.model),
        )
        .await?;

        let mut plan: Plan = parse_completion(&output, "plan")?;
        plan.validate()
            .map_err(|e| AgentError::MalformedCompletion(format!("drafted plan is invalid: {e}")))?;
        if plan.get(KEY_REQUIREMENTS).is_none() {
            plan.set_extra(KEY_REQUIREMENTS, Value::String(idea.to_string()));
        }
        Ok(plan)
    }

    /// 草稿 -> 评审 -> 合入
    pub async fn create_plan(&self, idea: &str, ctx: &RouteContext<'_>) -> Result<Plan, AgentError> {
        let draft = self.draft_plan(idea).await?;
        let suggestions = ctx
            .send(
                &self.config.suggester,
                Envelope::ReviewPlan {
                    plan: draft.clone(),
                },
            )
            .await?
            .into_suggestions()?;
        let plan = incorporate(&draft, &suggestions)?;
        tracing::info!(
            agent = %self.config.name,
            project = %plan.project_name,
            tasks = plan.tasks.len(),
            suggestions = suggestions.len(),
            "plan created"
        );
        Ok(plan)
    }

    pub async fn get_tech_stack(
        &self,
        plan: &mut Plan,
        ctx: &RouteContext<'_>,
    ) -> Result<String, AgentError> {
        let requirements = plan
            .extra_text(KEY_REQUIREMENTS)
            .unwrap_or_else(|| plan.project_name.clone());
        let tech_stack = ctx
            .send(&self.config.browser, Envelope::GetTechStack { requirements })
            .await?
            .into_text()?;
        plan.set_extra(KEY_TECH_STACK, Value::String(tech_stack.clone()));
        Ok(tech_stack)
    }

    pub async fn get_architecture(
        &self,
        plan: &mut Plan,
        ctx: &RouteContext<'_>,
    ) -> Result<String, AgentError> {
        let tech_stack = plan
            .extra_text(KEY_TECH_STACK)
            .unwrap_or_else(|| "unspecified".to_string());
        let architecture = ctx
            .send(&self.config.browser, Envelope::GetArchitecture { tech_stack })
            .await?
            .into_text()?;
        plan.set_extra(KEY_ARCHITECTURE, Value::String(architecture.clone()));
        Ok(architecture)
    }

    /// 完整流程；已有 tech_stack / architecture 的计划不重复调研
    pub async fn run(&self, idea: &str, ctx: &RouteContext<'_>) -> Result<Plan, AgentError> {
        let mut plan = self.create_plan(idea, ctx).await?;
        if self.config.research_stack {
            if plan.get(KEY_TECH_STACK).is_none() {
                self.get_tech_stack(&mut plan, ctx).await?;
            }
            if plan.get(KEY_ARCHITECTURE).is_none() {
                self.get_architecture(&mut plan, ctx).await?;
            }
        }
        Ok(plan)
    }
}

#[async_trait]
impl Agent for Planner {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn role(&self) -> AgentRole {
        AgentRole::Planner
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            services: &[ExternalService::Completion],
            peers: &[AgentRole::Suggester, AgentRole::Browser],
            actions: &["create_plan"],
        }
    }

    async fn handle(&self, envelope: Envelope, ctx: &RouteContext<'_>) -> Result<Reply, AgentError> {
        match envelope {
            Envelope::CreatePlan { idea } => self.run(&idea, ctx).await.map(Reply::Plan),
            other => Err(AgentError::UnsupportedAction {
                agent: self.config.name.clone(),
                action: other.action(),
            }),
        }
    }
}
