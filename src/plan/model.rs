//! 计划 / 任务 / 代码数据模型
//!
//! Plan 由 Planner 创建，在交给 DevelopmentAgency 之前可被建议修改；交付后以 `Arc<Plan>` 冻结。
//! Plan 的键空间 = `project_name`、`tasks` 以及任意附加键（requirements、tech_stack、architecture…）。

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

/// 计划中的一个工作单元，由 Planner 创建后只读
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// 计划内唯一
    pub task_id: String,
    pub description: String,
    /// 需要实现的函数名（有序）
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        description: impl Into<String>,
        functions: Vec<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            functions,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// 某个 Developer 为某个任务生成的文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFile {
    pub file_name: String,
    pub code: String,
    pub task_id: String,
}

/// 项目计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub project_name: String,
    pub tasks: Vec<Task>,
    /// 附加键（requirements / tech_stack / architecture 等），建议可增删改
    #[serde(flatten, default)]
    pub extras: BTreeMap<String, Value>,
}

pub const KEY_PROJECT_NAME: &str = "project_name";
pub const KEY_TASKS: &str = "tasks";
pub const KEY_REQUIREMENTS: &str = "requirements";
pub const KEY_TECH_STACK: &str = "tech_stack";
pub const KEY_ARCHITECTURE: &str = "architecture";

impl Plan {
    pub fn new(project_name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            project_name: project_name.into(),
            tasks,
            extras: BTreeMap::new(),
        }
    }

    /// 项目名与 task_id 都会成为提交路径的一段：须为单个普通路径段，task_id 还须唯一
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.project_name.trim().is_empty() {
            return Err(AgentError::InvalidPlan("project_name is empty".to_string()));
        }
        if !is_path_segment(&self.project_name) {
            return Err(AgentError::InvalidPlan(format!(
                "project_name '{}' must be a single path segment",
                self.project_name
            )));
        }
        validate_tasks(&self.tasks)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn task_ids(&self) -> HashSet<&str> {
        self.tasks.iter().map(|t| t.task_id.as_str()).collect()
    }

    /// 按键读取（含 project_name / tasks）
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            KEY_PROJECT_NAME => Some(Value::String(self.project_name.clone())),
            KEY_TASKS => serde_json::to_value(&self.tasks).ok(),
            _ => self.extras.get(key).cloned(),
        }
    }

    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extras.insert(key.into(), value);
    }

    /// 附加键的文本形式：字符串原样返回，其它值序列化为 JSON
    pub fn extra_text(&self, key: &str) -> Option<String> {
        self.extras.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// 单个普通路径段：不含分隔符，不是 `.` / `..`，不是绝对路径
pub fn is_path_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(&['/', '\\'][..])
}

pub(crate) fn validate_tasks(tasks: &[Task]) -> Result<(), AgentError> {
    let mut seen = HashSet::new();
    for task in tasks {
        if task.task_id.trim().is_empty() {
            return Err(AgentError::InvalidPlan("task with empty task_id".to_string()));
        }
        if !is_path_segment(&task.task_id) {
            return Err(AgentError::InvalidPlan(format!(
                "task_id '{}' must be a single path segment",
                task.task_id
            )));
        }
        if !seen.insert(task.task_id.as_str()) {
            return Err(AgentError::InvalidPlan(format!(
                "duplicate task_id: {}",
                task.task_id
            )));
        }
    }
    Ok(())
}

/// 未能产出文件的任务及原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unfinished {
    pub task_id: String,
    pub developer: String,
    pub reason: String,
}

/// 一次收集得到的全部文件，只被 Verifier 消费一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSubmission {
    pub id: uuid::Uuid,
    pub project_name: String,
    pub files: Vec<CodeFile>,
    #[serde(default)]
    pub unfinished: Vec<Unfinished>,
}

impl CodeSubmission {
    pub fn new(project_name: impl Into<String>, files: Vec<CodeFile>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            project_name: project_name.into(),
            files,
            unfinished: Vec::new(),
        }
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.task_id.as_str())
    }
}
