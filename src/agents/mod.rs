//! Agent 层：多态角色（Planner / Suggester / Browser / Developer / Verifier / SeniorDeveloper）、
//! 类型化信封与通信图
//!
//! 每个角色在 `capabilities()` 中事先声明它会调用的外部服务、会联系的其它角色以及接受的动作；
//! 通信图据此拒绝未声明的边，测试替身也只需满足这份契约。

pub mod browser;
pub mod developer;
pub mod envelope;
pub mod graph;
pub mod planner;
pub mod senior;
pub mod suggester;
pub mod verifier;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{AgentError, ServiceError};

pub use browser::{Browser, BrowserConfig, Rephrased, NOT_NEEDED_REPLY, NO_INFORMATION_REPLY};
pub use developer::{
    CodeGenerator, Developer, DeveloperConfig, LlmGenerator, TemplateGenerator, WorkResult,
};
pub use envelope::{Envelope, Reply};
pub use graph::{CommunicationGraph, RouteContext};
pub use planner::{Planner, PlannerConfig};
pub use senior::{AgencyFactory, SeniorDeveloper, SeniorDeveloperConfig, StandardAgencyFactory};
pub use suggester::{Suggester, SuggesterConfig};
pub use verifier::{VerificationReport, Verifier, VerifierConfig};

/// 角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Planner,
    Suggester,
    Browser,
    Developer,
    Verifier,
    SeniorDeveloper,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentRole::Planner => "planner",
            AgentRole::Suggester => "suggester",
            AgentRole::Browser => "browser",
            AgentRole::Developer => "developer",
            AgentRole::Verifier => "verifier",
            AgentRole::SeniorDeveloper => "senior_developer",
        };
        f.write_str(s)
    }
}

/// 外部协作服务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalService {
    Completion,
    Search,
    Fetch,
    Filesystem,
}

/// 角色契约：调用哪些外部服务、联系哪些角色、接受哪些动作
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub services: &'static [ExternalService],
    pub peers: &'static [AgentRole],
    pub actions: &'static [&'static str],
}

impl Capabilities {
    pub fn accepts(&self, action: &str) -> bool {
        self.actions.contains(&action)
    }

    pub fn may_contact(&self, role: AgentRole) -> bool {
        self.peers.contains(&role)
    }
}

/// Agent trait：消费一个信封，产出回复；需要联系其它 Agent 时只能经由 `ctx.send`
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn role(&self) -> AgentRole;

    fn capabilities(&self) -> Capabilities;

    async fn handle(&self, envelope: Envelope, ctx: &RouteContext<'_>) -> Result<Reply, AgentError>;
}

/// 非空名称校验（各角色配置构造时使用）
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), AgentError> {
    if value.trim().is_empty() {
        return Err(AgentError::Config(format!("{field} must not be empty")));
    }
    Ok(())
}

/// 外部服务调用统一加超时；超时是普通失败（ServiceError::Timeout）
pub(crate) async fn bounded<T, E, F>(
    service: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AgentError>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(ServiceError::Timeout { service, after }.into()),
    }
}
