//! 信封：Agent 之间传递的封闭动作集合，以及对应的回复

use std::sync::Arc;

use crate::agents::developer::WorkResult;
use crate::agents::verifier::VerificationReport;
use crate::core::AgentError;
use crate::memory::Message;
use crate::plan::{CodeSubmission, Plan, Suggestion, Task};
use crate::tools::{ToolCall, ToolOutput};
use crate::web::{Document, SearchOptions, SearchResponse};

/// 请求
#[derive(Debug, Clone)]
pub enum Envelope {
    /// 用户想法 -> 完整计划（Planner）
    CreatePlan { idea: String },
    /// 评审计划（Suggester）
    ReviewPlan { plan: Plan },
    /// 查询补充资料（Suggester 转发 / Browser 回答）
    GetInfo { query: String },
    GetTechStack { requirements: String },
    GetArchitecture { tech_stack: String },
    /// 完整研究管线（Browser）
    Answer {
        query: String,
        chat_history: Vec<Message>,
    },
    Search {
        query: String,
        options: SearchOptions,
    },
    Fetch { url: String },
    /// 写入 Developer 的任务记忆槽
    AssignTask { task: Task },
    /// 完成记忆槽中的全部任务
    WorkOnAssigned,
    Verify {
        plan: Arc<Plan>,
        submission: CodeSubmission,
    },
    /// SeniorDeveloper 工具调用
    Tool(ToolCall),
}

impl Envelope {
    pub fn action(&self) -> &'static str {
        match self {
            Envelope::CreatePlan { .. } => "create_plan",
            Envelope::ReviewPlan { .. } => "review_plan",
            Envelope::GetInfo { .. } => "get_info",
            Envelope::GetTechStack { .. } => "get_tech_stack",
            Envelope::GetArchitecture { .. } => "get_architecture",
            Envelope::Answer { .. } => "answer",
            Envelope::Search { .. } => "search",
            Envelope::Fetch { .. } => "fetch",
            Envelope::AssignTask { .. } => "assign_task",
            Envelope::WorkOnAssigned => "work_on_assigned",
            Envelope::Verify { .. } => "verify",
            Envelope::Tool(_) => "tool",
        }
    }
}

/// 回复
#[derive(Debug, Clone)]
pub enum Reply {
    Plan(Plan),
    Suggestions(Vec<Suggestion>),
    Text(String),
    Search(SearchResponse),
    Document(Document),
    Ack,
    Work(WorkResult),
    Verification(VerificationReport),
    Tool(ToolOutput),
}

impl Reply {
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Plan(_) => "plan",
            Reply::Suggestions(_) => "suggestions",
            Reply::Text(_) => "text",
            Reply::Search(_) => "search",
            Reply::Document(_) => "document",
            Reply::Ack => "ack",
            Reply::Work(_) => "work",
            Reply::Verification(_) => "verification",
            Reply::Tool(_) => "tool",
        }
    }

    fn unexpected(self, expected: &'static str) -> AgentError {
        AgentError::UnexpectedReply {
            expected,
            got: self.kind(),
        }
    }

    pub fn into_plan(self) -> Result<Plan, AgentError> {
        match self {
            Reply::Plan(p) => Ok(p),
            other => Err(other.unexpected("plan")),
        }
    }

    pub fn into_suggestions(self) -> Result<Vec<Suggestion>, AgentError> {
        match self {
            Reply::Suggestions(s) => Ok(s),
            other => Err(other.unexpected("suggestions")),
        }
    }

    pub fn into_text(self) -> Result<String, AgentError> {
        match self {
            Reply::Text(t) => Ok(t),
            other => Err(other.unexpected("text")),
        }
    }

    pub fn into_search(self) -> Result<SearchResponse, AgentError> {
        match self {
            Reply::Search(s) => Ok(s),
            other => Err(other.unexpected("search")),
        }
    }

    pub fn into_document(self) -> Result<Document, AgentError> {
        match self {
            Reply::Document(d) => Ok(d),
            other => Err(other.unexpected("document")),
        }
    }

    pub fn into_work(self) -> Result<WorkResult, AgentError> {
        match self {
            Reply::Work(w) => Ok(w),
            other => Err(other.unexpected("work")),
        }
    }

    pub fn into_verification(self) -> Result<VerificationReport, AgentError> {
        match self {
            Reply::Verification(v) => Ok(v),
            other => Err(other.unexpected("verification")),
        }
    }

    pub fn into_tool(self) -> Result<ToolOutput, AgentError> {
        match self {
            Reply::Tool(t) => Ok(t),
            other => Err(other.unexpected("tool")),
        }
    }
}
