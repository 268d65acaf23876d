//! Developer：按记忆槽中的任务生成代码文件
//!
//! 记忆槽只由所属机构写入（AssignTask），Developer 在 WorkOnAssigned 时依次完成队列中的任务。
//! 代码生成经 CodeGenerator 注入：TemplateGenerator 确定性，LlmGenerator 走 completion。
//! 两种生成器产出的文件都以 `# Code for <description>` 开头。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::agents::{
    bounded, require_non_empty, Agent, AgentRole, Capabilities, Envelope, ExternalService, Reply,
    RouteContext,
};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{Message, WorkingMemory};
use crate::plan::{CodeFile, Task, Unfinished};

/// 任务的验收标记行
pub fn marker(task: &Task) -> String {
    format!("# Code for {}", task.description)
}

#[derive(Debug, Clone)]
pub struct DeveloperConfig {
    pub name: String,
    /// 生成文件扩展名（不含点）
    pub extension: String,
}

impl DeveloperConfig {
    pub fn new(name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        require_non_empty("developer.name", &self.name)?;
        require_non_empty("developer.extension", &self.extension)?;
        if self.extension.contains(&['/', '\\', '.'][..]) {
            return Err(AgentError::Config(format!(
                "developer.extension must be a bare extension, got '{}'",
                self.extension
            )));
        }
        Ok(())
    }
}

/// 代码生成：task + 记忆上下文 -> 代码正文
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, task: &Task, context: &str) -> Result<String, AgentError>;
}

/// 确定性模板：标记行 + 每个函数一个桩
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateGenerator;

#[async_trait]
impl CodeGenerator for TemplateGenerator {
    async fn generate(&self, task: &Task, _context: &str) -> Result<String, AgentError> {
        let mut code = marker(task);
        code.push('\n');
        for (key, value) in &task.details {
            code.push_str(&format!("# {key}: {value}\n"));
        }
        for function in &task.functions {
            code.push_str(&format!(
                "\ndef {function}():\n    raise NotImplementedError(\"{function}\")\n"
            ));
        }
        Ok(code)
    }
}

/// completion 生成；输出若有代码块只取代码块，标记行总是补在最前
pub struct LlmGenerator {
    llm: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl LlmGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            llm,
            model: model.into(),
            timeout,
        }
    }
}

fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // 跳过语言标记行
    let body = after.find('\n').map(|i| &after[i + 1..]).unwrap_or(after);
    body.find("```").map(|end| &body[..end]).unwrap_or(body).trim_end()
}

#[async_trait]
impl CodeGenerator for LlmGenerator {
    async fn generate(&self, task: &Task, context: &str) -> Result<String, AgentError> {
        let functions = if task.functions.is_empty() {
            "(none specified)".to_string()
        } else {
            task.functions.join(", ")
        };
        let prompt = format!(
            "{context}Write the code for task {}: {}\nFunctions to implement: {functions}\n\
             Return only the code in a single fenced block.",
            task.task_id, task.description
        );
        let messages = [Message::user(prompt)];
        let output = bounded(
            "completion",
            self.timeout,
            self.llm.complete(&messages, &self.model),
        )
        .await?;
        Ok(format!("{}\n{}\n", marker(task), strip_code_fence(&output)))
    }
}

/// 一次 WorkOnAssigned 的产出
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkResult {
    pub developer: String,
    pub files: Vec<CodeFile>,
    pub failures: Vec<Unfinished>,
}

pub struct Developer {
    config: DeveloperConfig,
    generator: Arc<dyn CodeGenerator>,
    memory: Mutex<WorkingMemory>,
}

impl Developer {
    pub fn new(config: DeveloperConfig, generator: Arc<dyn CodeGenerator>) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self {
            config,
            generator,
            memory: Mutex::new(WorkingMemory::new()),
        })
    }

    pub fn file_name(&self, task: &Task) -> String {
        format!("{}.{}", task.task_id, self.config.extension)
    }

    pub async fn assign_task(&self, task: Task) {
        tracing::debug!(developer = %self.config.name, task_id = %task.task_id, "task assigned");
        self.memory.lock().await.assign(task);
    }

    pub async fn current_task(&self) -> Option<Task> {
        self.memory.lock().await.current_task().cloned()
    }

    pub async fn work_on_task(&self, task: &Task) -> Result<CodeFile, AgentError> {
        let context = self.memory.lock().await.to_prompt_section();
        let code = self.generator.generate(task, &context).await?;
        Ok(CodeFile {
            file_name: self.file_name(task),
            code,
            task_id: task.task_id.clone(),
        })
    }

    /// 依次完成记忆槽里的全部任务；单个任务失败记为 unfinished，其余照常进行
    pub async fn work_on_assigned(&self) -> WorkResult {
        let tasks: Vec<Task> = self.memory.lock().await.assigned().cloned().collect();
        let mut result = WorkResult {
            developer: self.config.name.clone(),
            ..WorkResult::default()
        };
        for task in &tasks {
            match self.work_on_task(task).await {
                Ok(file) => result.files.push(file),
                Err(e) => {
                    tracing::warn!(developer = %self.config.name, task_id = %task.task_id, error = %e, "task unfinished");
                    result.failures.push(Unfinished {
                        task_id: task.task_id.clone(),
                        developer: self.config.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        result
    }
}

#[async_trait]
impl Agent for Developer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn role(&self) -> AgentRole {
        AgentRole::Developer
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            services: &[ExternalService::Completion],
            peers: &[],
            actions: &["assign_task", "work_on_assigned"],
        }
    }

    async fn handle(&self, envelope: Envelope, _ctx: &RouteContext<'_>) -> Result<Reply, AgentError> {
        match envelope {
            Envelope::AssignTask { task } => {
                self.assign_task(task).await;
                Ok(Reply::Ack)
            }
            Envelope::WorkOnAssigned => Ok(Reply::Work(self.work_on_assigned().await)),
            other => Err(AgentError::UnsupportedAction {
                agent: self.config.name.clone(),
                action: other.action(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};

    fn login_task() -> Task {
        Task::new("1", "Build login", vec!["login".into(), "logout".into()])
    }

    fn template_dev() -> Developer {
        Developer::new(DeveloperConfig::new("Dev1", "py"), Arc::new(TemplateGenerator)).unwrap()
    }

    #[tokio::test]
    async fn test_template_is_deterministic() {
        let dev = template_dev();
        let a = dev.work_on_task(&login_task()).await.unwrap();
        let b = dev.work_on_task(&login_task()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.file_name, "1.py");
        assert_eq!(a.task_id, "1");
        assert!(a.code.starts_with("# Code for Build login\n"));
        assert!(a.code.contains("def login():"));
        assert!(a.code.contains("def logout():"));
    }

    #[tokio::test]
    async fn test_idle_developer_produces_nothing() {
        let dev = template_dev();
        assert!(dev.current_task().await.is_none());
        let result = dev.work_on_assigned().await;
        assert!(result.files.is_empty());
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn test_works_through_queue_in_order() {
        let dev = template_dev();
        dev.assign_task(Task::new("1", "a", vec![])).await;
        dev.assign_task(Task::new("3", "c", vec![])).await;
        assert_eq!(dev.current_task().await.unwrap().task_id, "1");
        let result = dev.work_on_assigned().await;
        let ids: Vec<_> = result.files.iter().map(|f| f.task_id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[tokio::test]
    async fn test_llm_generator_prepends_marker_and_records_failures() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_ok("Here:\n```python\ndef login():\n    return True\n```");
        llm.push_err(LlmError::ApiError("quota".into()));
        let generator = LlmGenerator::new(llm.clone(), "m", Duration::from_secs(5));
        let dev = Developer::new(DeveloperConfig::new("Dev1", "py"), Arc::new(generator)).unwrap();
        dev.assign_task(login_task()).await;
        dev.assign_task(Task::new("2", "Build signup", vec![])).await;

        let result = dev.work_on_assigned().await;
        assert_eq!(result.files.len(), 1);
        assert_eq!(
            result.files[0].code,
            "# Code for Build login\ndef login():\n    return True\n"
        );
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].task_id, "2");
        assert!(llm.calls()[0].prompt().contains("## Current Task"));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("plain"), "plain");
        assert_eq!(strip_code_fence("```rust\nfn a() {}\n```"), "fn a() {}");
    }

    #[test]
    fn test_extension_validation() {
        assert!(DeveloperConfig::new("d", ".py").validate().is_err());
        assert!(DeveloperConfig::new("d", "").validate().is_err());
        assert!(DeveloperConfig::new("d", "rs").validate().is_ok());
    }
}
