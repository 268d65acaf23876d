//! SeniorDeveloper 的工具：封闭的 ToolCall 枚举 + 执行器 + 沙箱文件系统
//!
//! 工具集合在编译期固定（穷尽匹配），不再按字符串名查找。

pub mod executor;
pub mod filesystem;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agents::VerificationReport;
use crate::plan::{Plan, Unfinished};
use crate::web::SearchResponse;

pub use executor::{ToolExecutor, ToolHandler};
pub use filesystem::{EditSummary, SafeFs};

/// 工具调用
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    CreateAgency { name: String, developers: usize },
    AssignPlan { agency: String, plan: Plan },
    /// 收集 + 校验 + 提交，全部成功才写盘
    ImplementCode { agency: String },
    ListAgencies,
    DestroyAgency { agency: String },
    WriteFile { path: String, content: String },
    ReadFile { path: String },
    EditFile {
        path: String,
        start_marker: String,
        end_marker: Option<String>,
        replacement: String,
    },
    InitializeProject { project: String, dir: String },
    CheckDirectory { dir: String },
    Search { query: String },
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::CreateAgency { .. } => "create_agency",
            ToolCall::AssignPlan { .. } => "assign_plan",
            ToolCall::ImplementCode { .. } => "implement_code",
            ToolCall::ListAgencies => "list_agencies",
            ToolCall::DestroyAgency { .. } => "destroy_agency",
            ToolCall::WriteFile { .. } => "write_file",
            ToolCall::ReadFile { .. } => "read_file",
            ToolCall::EditFile { .. } => "edit_file",
            ToolCall::InitializeProject { .. } => "initialize_project",
            ToolCall::CheckDirectory { .. } => "check_directory",
            ToolCall::Search { .. } => "search",
        }
    }

    /// 机构类操作会驱动整个开发机构，用长超时
    pub fn is_long_running(&self) -> bool {
        matches!(
            self,
            ToolCall::AssignPlan { .. } | ToolCall::ImplementCode { .. }
        )
    }
}

/// 机构概要（/agencies）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgencySummary {
    pub name: String,
    pub developers: usize,
    pub state: &'static str,
    pub project_name: Option<String>,
}

/// 一次成功 implement_code 的结果
#[derive(Debug, Clone)]
pub struct ImplementReport {
    pub agency: String,
    pub project_name: String,
    pub written: Vec<PathBuf>,
    pub verification: VerificationReport,
    pub unfinished: Vec<Unfinished>,
}

/// 工具输出
#[derive(Debug, Clone)]
pub enum ToolOutput {
    AgencyCreated { name: String, developers: usize },
    /// (developer, task_id) 分配表
    PlanAssigned {
        agency: String,
        assignments: Vec<(String, String)>,
    },
    Implemented(ImplementReport),
    Agencies(Vec<AgencySummary>),
    AgencyDestroyed(String),
    FileWritten(PathBuf),
    FileContent { path: PathBuf, content: String },
    FileEdited { path: PathBuf, summary: EditSummary },
    ProjectInitialized(PathBuf),
    Directory {
        path: PathBuf,
        entries: Option<Vec<String>>,
    },
    SearchResults(SearchResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_tagged_json() {
        let call: ToolCall =
            serde_json::from_str(r#"{"tool": "create_agency", "name": "a", "developers": 2}"#).unwrap();
        assert_eq!(call.name(), "create_agency");
        assert!(!call.is_long_running());
        let json = serde_json::to_value(ToolCall::ImplementCode { agency: "a".into() }).unwrap();
        assert_eq!(json["tool"], "implement_code");
    }
}
