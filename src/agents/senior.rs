//! SeniorDeveloper：以工具调用的形式管理开发机构与项目文件
//!
//! 每个工具都是注册表上一次可审计的状态转移；`implement_code` 是唯一会写出生成代码的操作，
//! 收集 + 校验 + 提交作为一个整体，校验不过或提交失败都不会留下部分文件。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agency::{AgencyRegistry, DevelopmentAgency, VerificationPolicy};
use crate::agents::{
    require_non_empty, Agent, AgentRole, Capabilities, CodeGenerator, Developer, DeveloperConfig,
    Envelope, ExternalService, Reply, RouteContext, Verifier, VerifierConfig,
};
use crate::core::{AgentError, Rejection};
use crate::plan::Plan;
use crate::tools::{ImplementReport, SafeFs, ToolCall, ToolExecutor, ToolHandler, ToolOutput};
use crate::web::{SearchOptions, SearchService};

/// 按名称与人数构造开发机构
pub trait AgencyFactory: Send + Sync {
    fn build(&self, name: &str, developers: usize) -> Result<DevelopmentAgency, AgentError>;
}

/// 所有 Developer 共用一个生成器，Verifier 使用给定策略
pub struct StandardAgencyFactory {
    generator: Arc<dyn CodeGenerator>,
    extension: String,
    policy: Arc<dyn VerificationPolicy>,
}

impl StandardAgencyFactory {
    pub fn new(
        generator: Arc<dyn CodeGenerator>,
        extension: impl Into<String>,
        policy: Arc<dyn VerificationPolicy>,
    ) -> Self {
        Self {
            generator,
            extension: extension.into(),
            policy,
        }
    }
}

impl AgencyFactory for StandardAgencyFactory {
    fn build(&self, name: &str, developers: usize) -> Result<DevelopmentAgency, AgentError> {
        let devs = (1..=developers)
            .map(|i| {
                Developer::new(
                    DeveloperConfig::new(format!("{name}-dev-{i}"), self.extension.clone()),
                    self.generator.clone(),
                )
                .map(|d| Arc::new(d) as Arc<dyn Agent>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let verifier = Verifier::new(VerifierConfig::new(format!("{name}-verifier")), self.policy.clone())?;
        DevelopmentAgency::new(name, devs, Arc::new(verifier))
    }
}

#[derive(Debug, Clone)]
pub struct SeniorDeveloperConfig {
    pub name: String,
    /// 文件工具的沙箱根，也是代码提交根
    pub output_root: PathBuf,
    pub search_language: String,
    pub tool_timeout_secs: u64,
    pub agency_timeout_secs: u64,
}

impl SeniorDeveloperConfig {
    pub fn new(name: impl Into<String>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            output_root: output_root.into(),
            search_language: "en".to_string(),
            tool_timeout_secs: 30,
            agency_timeout_secs: 600,
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        require_non_empty("senior.name", &self.name)?;
        if self.output_root.as_os_str().is_empty() {
            return Err(AgentError::Config("senior.output_root must not be empty".to_string()));
        }
        if self.tool_timeout_secs == 0 || self.agency_timeout_secs == 0 {
            return Err(AgentError::Config("tool timeouts must be > 0".to_string()));
        }
        Ok(())
    }
}

/// 工具实现
struct SeniorTools {
    fs: SafeFs,
    registry: Arc<AgencyRegistry>,
    factory: Arc<dyn AgencyFactory>,
    search: Arc<dyn SearchService>,
    search_language: String,
}

impl SeniorTools {
    async fn create_agency(&self, name: &str, developers: usize) -> Result<ToolOutput, AgentError> {
        if developers == 0 {
            return Err(AgentError::Config("an agency needs at least one developer".to_string()));
        }
        if self.registry.contains(name).await {
            return Err(AgentError::AgencyExists(name.to_string()));
        }
        let agency = self.factory.build(name, developers)?;
        self.registry.insert(agency).await?;
        tracing::info!(agency = %name, developers, "agency created");
        Ok(ToolOutput::AgencyCreated {
            name: name.to_string(),
            developers,
        })
    }

    async fn assign_plan(&self, agency: &str, plan: Plan) -> Result<ToolOutput, AgentError> {
        let handle = self.registry.get(agency).await?;
        let mut guard = handle.lock().await;
        let assignments = guard.receive_plan(Arc::new(plan)).await?.to_vec();
        Ok(ToolOutput::PlanAssigned {
            agency: agency.to_string(),
            assignments,
        })
    }

    async fn implement_code(&self, agency: &str) -> Result<ToolOutput, AgentError> {
        let handle = self.registry.get(agency).await?;
        let mut guard = handle.lock().await;
        let submission = guard.collect_code().await?;
        let verification = guard.verify_and_finalize_code(&submission).await?;
        if !verification.accepted {
            let rejection = verification.rejection.unwrap_or_else(|| Rejection {
                task_id: String::new(),
                file_name: String::new(),
                reason: "rejected".to_string(),
            });
            tracing::warn!(agency = %agency, rejection = %rejection, "verification failed, nothing written");
            return Err(AgentError::VerificationFailed(rejection));
        }

        let written = guard.commit(self.fs.root())?;
        Ok(ToolOutput::Implemented(ImplementReport {
            agency: agency.to_string(),
            project_name: submission.project_name,
            written,
            verification,
            unfinished: submission.unfinished,
        }))
    }
}

#[async_trait]
impl ToolHandler for SeniorTools {
    async fn run(&self, call: ToolCall) -> Result<ToolOutput, AgentError> {
        match call {
            ToolCall::CreateAgency { name, developers } => self.create_agency(&name, developers).await,
            ToolCall::AssignPlan { agency, plan } => self.assign_plan(&agency, plan).await,
            ToolCall::ImplementCode { agency } => self.implement_code(&agency).await,
            ToolCall::ListAgencies => Ok(ToolOutput::Agencies(self.registry.summaries().await)),
            ToolCall::DestroyAgency { agency } => {
                self.registry.remove(&agency).await?;
                Ok(ToolOutput::AgencyDestroyed(agency))
            }
            ToolCall::WriteFile { path, content } => {
                self.fs.write_file(&path, &content).map(ToolOutput::FileWritten)
            }
            ToolCall::ReadFile { path } => {
                let content = self.fs.read_file(&path)?;
                Ok(ToolOutput::FileContent {
                    path: self.fs.resolve(&path)?,
                    content,
                })
            }
            ToolCall::EditFile {
                path,
                start_marker,
                end_marker,
                replacement,
            } => {
                let summary = self.fs.edit_between_markers(
                    &path,
                    &start_marker,
                    end_marker.as_deref(),
                    &replacement,
                )?;
                Ok(ToolOutput::FileEdited {
                    path: self.fs.resolve(&path)?,
                    summary,
                })
            }
            ToolCall::InitializeProject { project, dir } => self
                .fs
                .initialize_project(&project, &dir)
                .map(ToolOutput::ProjectInitialized),
            ToolCall::CheckDirectory { dir } => Ok(ToolOutput::Directory {
                path: self.fs.resolve(&dir)?,
                entries: self.fs.check_directory(&dir)?,
            }),
            ToolCall::Search { query } => {
                let options = SearchOptions::with_language(self.search_language.clone());
                let response = self.search.search(&query, &options).await?;
                Ok(ToolOutput::SearchResults(response))
            }
        }
    }
}

pub struct SeniorDeveloper {
    config: SeniorDeveloperConfig,
    executor: ToolExecutor,
    registry: Arc<AgencyRegistry>,
}

impl SeniorDeveloper {
    pub fn new(
        config: SeniorDeveloperConfig,
        registry: Arc<AgencyRegistry>,
        factory: Arc<dyn AgencyFactory>,
        search: Arc<dyn SearchService>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let tools = SeniorTools {
            fs: SafeFs::new(&config.output_root),
            registry: registry.clone(),
            factory,
            search,
            search_language: config.search_language.clone(),
        };
        let executor = ToolExecutor::new(
            Arc::new(tools),
            config.tool_timeout_secs,
            config.agency_timeout_secs,
        );
        Ok(Self {
            config,
            executor,
            registry,
        })
    }

    pub fn registry(&self) -> &Arc<AgencyRegistry> {
        &self.registry
    }

    pub async fn run_tool(&self, call: ToolCall) -> Result<ToolOutput, AgentError> {
        tracing::debug!(agent = %self.config.name, tool = call.name(), "run tool");
        self.executor.execute(call).await
    }

    pub async fn create_agency(&self, name: &str, developers: usize) -> Result<ToolOutput, AgentError> {
        self.run_tool(ToolCall::CreateAgency {
            name: name.to_string(),
            developers,
        })
        .await
    }

    pub async fn assign_plan(&self, agency: &str, plan: Plan) -> Result<ToolOutput, AgentError> {
        self.run_tool(ToolCall::AssignPlan {
            agency: agency.to_string(),
            plan,
        })
        .await
    }

    pub async fn implement_code(&self, agency: &str) -> Result<ToolOutput, AgentError> {
        self.run_tool(ToolCall::ImplementCode {
            agency: agency.to_string(),
        })
        .await
    }
}

#[async_trait]
impl Agent for SeniorDeveloper {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn role(&self) -> AgentRole {
        AgentRole::SeniorDeveloper
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            services: &[ExternalService::Filesystem, ExternalService::Search],
            peers: &[],
            actions: &["tool"],
        }
    }

    async fn handle(&self, envelope: Envelope, _ctx: &RouteContext<'_>) -> Result<Reply, AgentError> {
        match envelope {
            Envelope::Tool(call) => self.run_tool(call).await.map(Reply::Tool),
            other => Err(AgentError::UnsupportedAction {
                agent: self.config.name.clone(),
                action: other.action(),
            }),
        }
    }
}
