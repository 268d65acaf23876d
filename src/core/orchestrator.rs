//! 编排器：主控入口
//!
//! 负责：按配置创建 LLM / 搜索 / 抓取后端与全部 Agent，建立通信图（planner→suggester、planner→browser、
//! suggester→browser），SeniorDeveloper 与它的机构注册表只挂在图上，保存当前计划与 /ask 对话历史。
//! 只有这里把结果和错误渲染成面向用户的文字。

use std::sync::Arc;
use std::time::Duration;

use crate::agency::{policy_from_name, AgencyRegistry};
use crate::agents::senior::StandardAgencyFactory;
use crate::agents::{
    Browser, BrowserConfig, CodeGenerator, CommunicationGraph, Envelope, LlmGenerator, Planner,
    PlannerConfig, SeniorDeveloper, SeniorDeveloperConfig, Suggester, SuggesterConfig,
    TemplateGenerator,
};
use crate::cli::{parse_command, Command};
use crate::config::AppConfig;
use crate::core::{AgentError, SessionSupervisor};
use crate::llm::{create_groq_client, LlmClient, MockLlmClient, OpenAiClient, RetryingLlmClient};
use crate::memory::{ConversationMemory, Message};
use crate::plan::{Plan, KEY_ARCHITECTURE, KEY_TECH_STACK};
use crate::tools::{ImplementReport, ToolCall, ToolOutput};
use crate::web::{FetchService, HttpFetcher, SearchService, SearxngClient};

pub const PLANNER: &str = "Planner";
pub const SUGGESTER: &str = "Suggester";
pub const BROWSER: &str = "Browser";
pub const SENIOR: &str = "SeniorDeveloper";

/// 根据配置与环境变量选择 LLM 后端（Groq / OpenAI 兼容 / Mock），真实后端外包一层重试
pub(crate) fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let groq_key = std::env::var("GROQ_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    let inner: Arc<dyn LlmClient> = match provider.as_str() {
        "groq" if groq_key.is_some() || openai_key.is_some() => {
            tracing::info!("Using Groq LLM ({})", cfg.llm.model);
            Arc::new(create_groq_client(cfg.llm.base_url.as_deref(), Some(&cfg.llm.model)))
        }
        "openai" if openai_key.is_some() => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                openai_key.as_deref(),
            ))
        }
        "mock" => return Arc::new(MockLlmClient),
        _ => {
            tracing::warn!(provider = %provider, "No API key set or provider unknown, using Mock LLM");
            return Arc::new(MockLlmClient);
        }
    };
    Arc::new(RetryingLlmClient::new(inner, cfg.llm.retry_config()))
}

/// Agent 侧的单次服务超时：要覆盖 RetryingLlmClient 的全部尝试与退避
fn service_timeout(cfg: &AppConfig) -> Duration {
    let attempts = u64::from(cfg.llm.retry.max_attempts.max(1));
    Duration::from_secs(cfg.llm.timeouts.request * attempts)
        + Duration::from_millis(cfg.llm.retry.max_backoff_ms * attempts)
}

/// 一条命令的结果
#[derive(Debug, Clone)]
pub enum Outcome {
    Plan(Plan),
    Answer(String),
    Tool(ToolOutput),
    Built(ImplementReport),
    Exit,
}

pub struct Orchestrator {
    graph: CommunicationGraph,
    /// 所有 Agent 共用的后端，用于汇总 token 用量
    llm: Arc<dyn LlmClient>,
    conversation: ConversationMemory,
    current_plan: Option<Plan>,
    supervisor: Arc<SessionSupervisor>,
}

impl Orchestrator {
    /// 按配置创建真实后端
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let llm = create_llm_from_config(cfg);
        let search = Arc::new(SearxngClient::new(
            cfg.search.searxng_instance.clone(),
            cfg.search.timeout_secs,
        ));
        let fetcher = Arc::new(HttpFetcher::new(
            cfg.search.allowed_domains.clone(),
            cfg.search.timeout_secs,
            cfg.search.max_result_chars,
        ));
        Self::new(cfg, llm, search, fetcher)
    }

    /// 注入后端（测试用替身）
    pub fn new(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchService>,
        fetcher: Arc<dyn FetchService>,
    ) -> Result<Self, AgentError> {
        let timeout = service_timeout(cfg);
        let agents = &cfg.agents;

        let mut planner_cfg = PlannerConfig::new(PLANNER, cfg.model_for(&agents.planner.model), SUGGESTER, BROWSER);
        planner_cfg.research_stack = agents.planner.research_stack;
        planner_cfg.service_timeout = timeout;

        let mut suggester_cfg = SuggesterConfig::new(SUGGESTER, cfg.model_for(&agents.suggester.model), BROWSER);
        suggester_cfg.consult_browser = agents.suggester.consult_browser;
        suggester_cfg.service_timeout = timeout;

        let mut browser_cfg = BrowserConfig::new(BROWSER, cfg.model_for(&agents.browser.model));
        browser_cfg.language = cfg.search.language.clone();
        browser_cfg.service_timeout = timeout;

        let generator: Arc<dyn CodeGenerator> = match agents.developer.generator.as_str() {
            "template" => Arc::new(TemplateGenerator),
            "llm" => Arc::new(LlmGenerator::new(
                llm.clone(),
                cfg.model_for(&agents.developer.model),
                timeout,
            )),
            other => {
                return Err(AgentError::Config(format!(
                    "unknown developer generator '{other}' (expected template or llm)"
                )))
            }
        };
        let factory = StandardAgencyFactory::new(
            generator,
            agents.developer.extension.clone(),
            policy_from_name(&agents.verifier.policy)?,
        );

        let mut senior_cfg = SeniorDeveloperConfig::new(SENIOR, cfg.output_root());
        senior_cfg.search_language = cfg.search.language.clone();
        senior_cfg.tool_timeout_secs = cfg.tools.tool_timeout_secs;
        senior_cfg.agency_timeout_secs = cfg.tools.agency_timeout_secs;
        let senior = SeniorDeveloper::new(
            senior_cfg,
            Arc::new(AgencyRegistry::new()),
            Arc::new(factory),
            search.clone(),
        )?;

        let mut graph = CommunicationGraph::new();
        graph.add_agent(Arc::new(Planner::new(planner_cfg, llm.clone())?))?;
        graph.add_agent(Arc::new(Suggester::new(suggester_cfg, llm.clone())?))?;
        graph.add_agent(Arc::new(Browser::new(browser_cfg, llm.clone(), search, fetcher)?))?;
        graph.add_agent(Arc::new(senior))?;
        graph.add_channel(PLANNER, SUGGESTER)?;
        graph.add_channel(PLANNER, BROWSER)?;
        graph.add_channel(SUGGESTER, BROWSER)?;

        tracing::info!(
            agents = ?graph.agent_names(),
            output_root = %cfg.output_root().display(),
            "orchestrator ready"
        );
        Ok(Self {
            graph,
            llm,
            conversation: ConversationMemory::new(cfg.app.max_context_turns),
            current_plan: None,
            supervisor: Arc::new(SessionSupervisor::new()),
        })
    }

    pub fn graph(&self) -> &CommunicationGraph {
        &self.graph
    }

    pub fn supervisor(&self) -> Arc<SessionSupervisor> {
        self.supervisor.clone()
    }

    /// 本会话累计的 (prompt, completion, total) token
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub fn current_plan(&self) -> Option<&Plan> {
        self.current_plan.as_ref()
    }

    /// 想法 → 计划；成功后成为当前计划
    pub async fn create_plan(&mut self, idea: &str) -> Result<Plan, AgentError> {
        let plan = self
            .graph
            .deliver(PLANNER, Envelope::CreatePlan { idea: idea.to_string() })
            .await?
            .into_plan()?;
        self.current_plan = Some(plan.clone());
        Ok(plan)
    }

    /// Browser 研究，携带此前的问答
    pub async fn ask(&mut self, question: &str) -> Result<String, AgentError> {
        let answer = self
            .graph
            .deliver(
                BROWSER,
                Envelope::Answer {
                    query: question.to_string(),
                    chat_history: self.conversation.messages().to_vec(),
                },
            )
            .await?
            .into_text()?;
        self.conversation.push(Message::user(question));
        self.conversation.push(Message::assistant(answer.clone()));
        Ok(answer)
    }

    pub async fn tool(&self, call: ToolCall) -> Result<ToolOutput, AgentError> {
        self.graph.deliver(SENIOR, Envelope::Tool(call)).await?.into_tool()
    }

    fn plan_for_assignment(&self) -> Result<Plan, AgentError> {
        self.current_plan.clone().ok_or(AgentError::NoPlan)
    }

    /// 计划 → 建机构 → 分配 → 实现
    pub async fn build_project(
        &mut self,
        agency: &str,
        developers: usize,
        idea: &str,
    ) -> Result<ImplementReport, AgentError> {
        let plan = self.create_plan(idea).await?;
        self.tool(ToolCall::CreateAgency {
            name: agency.to_string(),
            developers,
        })
        .await?;
        self.tool(ToolCall::AssignPlan {
            agency: agency.to_string(),
            plan,
        })
        .await?;
        match self
            .tool(ToolCall::ImplementCode {
                agency: agency.to_string(),
            })
            .await?
        {
            ToolOutput::Implemented(report) => Ok(report),
            _ => Err(AgentError::UnexpectedReply {
                expected: "implemented",
                got: "tool",
            }),
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<Outcome, AgentError> {
        let call = match command {
            Command::Idea(idea) => return Ok(Outcome::Plan(self.create_plan(&idea).await?)),
            Command::Ask(q) => return Ok(Outcome::Answer(self.ask(&q).await?)),
            Command::Build {
                agency,
                developers,
                idea,
            } => {
                let report = self.build_project(&agency, developers, &idea).await?;
                return Ok(Outcome::Built(report));
            }
            Command::Exit => return Ok(Outcome::Exit),
            Command::AssignPlan { agency } => ToolCall::AssignPlan {
                agency,
                plan: self.plan_for_assignment()?,
            },
            Command::CreateAgency { name, developers } => ToolCall::CreateAgency { name, developers },
            Command::ImplementCode { agency } => ToolCall::ImplementCode { agency },
            Command::DestroyAgency { agency } => ToolCall::DestroyAgency { agency },
            Command::ListAgencies => ToolCall::ListAgencies,
            Command::Search(query) => ToolCall::Search { query },
            Command::Read(path) => ToolCall::ReadFile { path },
            Command::Init { project, dir } => ToolCall::InitializeProject { project, dir },
            Command::CheckDir(dir) => ToolCall::CheckDirectory { dir },
        };
        Ok(Outcome::Tool(self.tool(call).await?))
    }

    /// 处理一行输入，返回要显示的文字；`None` 表示退出
    pub async fn handle_line(&mut self, line: &str) -> Option<String> {
        let command = match parse_command(line) {
            Ok(Some(c)) => c,
            Ok(None) => return Some(String::new()),
            Err(e) => return Some(e.to_string()),
        };
        if command == Command::Exit {
            return None;
        }

        let token = self.supervisor.begin();
        let result = tokio::select! {
            _ = token.cancelled() => Err(AgentError::Cancelled),
            r = self.execute(command) => r,
        };
        match result {
            Ok(Outcome::Exit) => None,
            Ok(outcome) => Some(outcome.to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "command failed");
                Some(render_error(&e))
            }
        }
    }
}

/// 错误 → 面向用户的文字；可重试的错误附带重试提示
pub fn render_error(err: &AgentError) -> String {
    let text = match err {
        AgentError::NoPlan => "No plan yet. Describe your project idea first.".to_string(),
        AgentError::AgencyNotFound(name) => {
            format!("No agency named '{name}'. Create it with /create agency {name} <developers>.")
        }
        AgentError::AgencyExists(name) => format!("An agency named '{name}' already exists."),
        AgentError::InvalidState {
            agency,
            state,
            operation,
        } => format!("Agency '{agency}' is {state}; {operation} is not allowed now."),
        AgentError::VerificationFailed(r) => format!(
            "Verification failed for {} (task {}): {}. No files were written.",
            r.file_name, r.task_id, r.reason
        ),
        AgentError::MalformedCompletion(detail) => {
            format!("The model returned something I could not understand: {detail}")
        }
        AgentError::ExternalService(e) => format!("An external service failed: {e}."),
        AgentError::ToolTimeout(tool) => format!("{tool} took too long and was stopped."),
        AgentError::Cancelled => "Cancelled.".to_string(),
        AgentError::PathEscape(p) => format!("Path '{p}' is outside the workspace."),
        other => format!("Error: {other}"),
    };
    if err.is_retryable() {
        format!("{text} This is usually temporary, try again.")
    } else {
        text
    }
}

fn write_plan(f: &mut std::fmt::Formatter<'_>, plan: &Plan) -> std::fmt::Result {
    writeln!(f, "Project: {}", plan.project_name)?;
    for task in &plan.tasks {
        write!(f, "  [{}] {}", task.task_id, task.description)?;
        if !task.functions.is_empty() {
            write!(f, " ({})", task.functions.join(", "))?;
        }
        writeln!(f)?;
    }
    for key in [KEY_TECH_STACK, KEY_ARCHITECTURE] {
        if let Some(text) = plan.extra_text(key) {
            writeln!(f, "{key}: {text}")?;
        }
    }
    Ok(())
}

fn write_report(f: &mut std::fmt::Formatter<'_>, report: &ImplementReport) -> std::fmt::Result {
    writeln!(
        f,
        "Agency '{}' implemented {}: {} file(s) verified and written",
        report.agency,
        report.project_name,
        report.written.len()
    )?;
    for path in &report.written {
        writeln!(f, "  {}", path.display())?;
    }
    for u in &report.unfinished {
        writeln!(f, "  unfinished: task {} ({}): {}", u.task_id, u.developer, u.reason)?;
    }
    Ok(())
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Plan(plan) => write_plan(f, plan),
            Outcome::Answer(text) => f.write_str(text),
            Outcome::Built(report) => write_report(f, report),
            Outcome::Exit => f.write_str("Bye."),
            Outcome::Tool(out) => match out {
                ToolOutput::AgencyCreated { name, developers } => {
                    write!(f, "Agency '{name}' created with {developers} developer(s).")
                }
                ToolOutput::PlanAssigned {
                    agency,
                    assignments,
                } => {
                    writeln!(f, "Plan assigned to '{agency}':")?;
                    for (dev, task) in assignments {
                        writeln!(f, "  task {task} -> {dev}")?;
                    }
                    Ok(())
                }
                ToolOutput::Implemented(report) => write_report(f, report),
                ToolOutput::Agencies(list) if list.is_empty() => f.write_str("No agencies."),
                ToolOutput::Agencies(list) => {
                    for a in list {
                        write!(f, "{} ({} developer(s), {})", a.name, a.developers, a.state)?;
                        if let Some(p) = &a.project_name {
                            write!(f, " building {p}")?;
                        }
                        writeln!(f)?;
                    }
                    Ok(())
                }
                ToolOutput::AgencyDestroyed(name) => write!(f, "Agency '{name}' destroyed."),
                ToolOutput::FileWritten(path) => write!(f, "Wrote {}", path.display()),
                ToolOutput::FileContent { content, .. } => f.write_str(content),
                ToolOutput::FileEdited { path, summary } => write!(
                    f,
                    "Edited {} at line {} ({} line(s) replaced)",
                    path.display(),
                    summary.start_line,
                    summary.replaced_lines
                ),
                ToolOutput::ProjectInitialized(path) => {
                    write!(f, "Project initialized at {}", path.display())
                }
                ToolOutput::Directory { path, entries: None } => {
                    write!(f, "{} does not exist.", path.display())
                }
                ToolOutput::Directory {
                    path,
                    entries: Some(entries),
                } => {
                    writeln!(f, "{}:", path.display())?;
                    for e in entries {
                        writeln!(f, "  {e}")?;
                    }
                    Ok(())
                }
                ToolOutput::SearchResults(resp) if resp.results.is_empty() => {
                    f.write_str("No results.")
                }
                ToolOutput::SearchResults(resp) => {
                    for (i, r) in resp.results.iter().enumerate() {
                        writeln!(f, "{}. {} <{}>", i + 1, r.title, r.url)?;
                        if let Some(c) = &r.content {
                            writeln!(f, "   {c}")?;
                        }
                    }
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Rejection;
    use crate::llm::ScriptedLlmClient;
    use crate::web::{StaticFetch, StaticSearch};

    fn orchestrator(dir: &std::path::Path, llm: Arc<ScriptedLlmClient>) -> Orchestrator {
        let mut cfg = AppConfig::default();
        cfg.app.output_root = Some(dir.to_path_buf());
        cfg.agents.planner.research_stack = false;
        Orchestrator::new(
            &cfg,
            llm,
            Arc::new(StaticSearch::empty()),
            Arc::new(StaticFetch::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_graph_topology() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(dir.path(), Arc::new(ScriptedLlmClient::new()));
        assert!(o.graph().can_route(PLANNER, SUGGESTER));
        assert!(o.graph().can_route(PLANNER, BROWSER));
        assert!(o.graph().can_route(SUGGESTER, BROWSER));
        assert!(!o.graph().can_route(BROWSER, PLANNER));
        assert!(!o.graph().can_route(SUGGESTER, PLANNER));
    }

    #[tokio::test]
    async fn test_assign_without_plan() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = orchestrator(dir.path(), Arc::new(ScriptedLlmClient::new()));
        o.handle_line("/create agency team 1").await.unwrap();
        let text = o.handle_line("/assign plan team").await.unwrap();
        assert_eq!(text, render_error(&AgentError::NoPlan));
    }

    #[tokio::test]
    async fn test_exit_and_usage() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = orchestrator(dir.path(), Arc::new(ScriptedLlmClient::new()));
        assert!(o.handle_line("exit").await.is_none());
        assert!(o.handle_line("/create agency").await.unwrap().starts_with("usage:"));
    }

    /// 报告固定用量的脚本后端
    struct MeteredLlm(ScriptedLlmClient);

    #[async_trait::async_trait]
    impl LlmClient for MeteredLlm {
        async fn complete(&self, messages: &[Message], model: &str) -> Result<String, crate::llm::LlmError> {
            self.0.complete(messages, model).await
        }

        fn token_usage(&self) -> (u64, u64, u64) {
            (120, 30, 150)
        }
    }

    #[test]
    fn test_token_usage_reads_shared_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.app.output_root = Some(dir.path().to_path_buf());
        let o = Orchestrator::new(
            &cfg,
            Arc::new(MeteredLlm(ScriptedLlmClient::new())),
            Arc::new(StaticSearch::empty()),
            Arc::new(StaticFetch::new()),
        )
        .unwrap();
        assert_eq!(o.token_usage(), (120, 30, 150));
        let scripted = orchestrator(dir.path(), Arc::new(ScriptedLlmClient::new()));
        assert_eq!(scripted.token_usage(), (0, 0, 0));
    }

    #[test]
    fn test_retry_hint_only_for_retryable_errors() {
        let timeout = render_error(&AgentError::ExternalService(crate::core::ServiceError::Timeout {
            service: "search",
            after: Duration::from_secs(5),
        }));
        assert!(timeout.ends_with("try again."));
        assert!(render_error(&AgentError::ToolTimeout("implement_code".into())).ends_with("try again."));
        assert!(!render_error(&AgentError::NoPlan).contains("try again"));
    }

    #[test]
    fn test_render_verification_failure() {
        let text = render_error(&AgentError::VerificationFailed(Rejection {
            task_id: "1".into(),
            file_name: "1.py".into(),
            reason: "missing marker".into(),
        }));
        assert!(text.contains("No files were written"));
    }
}
