//! 校验策略：对单个 (task, file) 对做判定
//!
//! 策略必须是纯函数：同样的输入永远得到同样的结论。Verifier 逐对调用，遇到第一条拒绝即停止。

use std::fmt::Debug;
use std::sync::Arc;

use crate::core::AgentError;
use crate::plan::{CodeFile, Task};

pub trait VerificationPolicy: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// 通过返回 Ok，拒绝返回原因
    fn check(&self, task: &Task, file: &CodeFile) -> Result<(), String>;
}

/// 代码须引用任务描述
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptionMarker;

impl VerificationPolicy for DescriptionMarker {
    fn name(&self) -> &str {
        "description"
    }

    fn check(&self, task: &Task, file: &CodeFile) -> Result<(), String> {
        if file.code.contains(&task.description) {
            Ok(())
        } else {
            Err(format!("code does not reference task description '{}'", task.description))
        }
    }
}

/// 任务列出的每个函数都须以 `name(` 形式出现
#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionsDefined;

impl VerificationPolicy for FunctionsDefined {
    fn name(&self) -> &str {
        "functions"
    }

    fn check(&self, task: &Task, file: &CodeFile) -> Result<(), String> {
        match task
            .functions
            .iter()
            .find(|f| !file.code.contains(&format!("{f}(")))
        {
            Some(missing) => Err(format!("function '{missing}' is not defined")),
            None => Ok(()),
        }
    }
}

/// 代码须包含固定文本
#[derive(Debug, Clone)]
pub struct ContainsText {
    pub needle: String,
}

impl ContainsText {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

impl VerificationPolicy for ContainsText {
    fn name(&self) -> &str {
        "contains"
    }

    fn check(&self, _task: &Task, file: &CodeFile) -> Result<(), String> {
        if file.code.contains(&self.needle) {
            Ok(())
        } else {
            Err(format!("code does not contain '{}'", self.needle))
        }
    }
}

/// 依次检查，第一条拒绝即返回
#[derive(Debug, Clone)]
pub struct AllOf(pub Vec<Arc<dyn VerificationPolicy>>);

impl VerificationPolicy for AllOf {
    fn name(&self) -> &str {
        "all_of"
    }

    fn check(&self, task: &Task, file: &CodeFile) -> Result<(), String> {
        self.0.iter().try_for_each(|p| p.check(task, file))
    }
}

/// 配置名 -> 策略：description / strict
pub fn policy_from_name(name: &str) -> Result<Arc<dyn VerificationPolicy>, AgentError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "description" => Ok(Arc::new(DescriptionMarker)),
        "strict" => Ok(Arc::new(AllOf(vec![
            Arc::new(DescriptionMarker),
            Arc::new(FunctionsDefined),
        ]))),
        other => Err(AgentError::Config(format!(
            "unknown verifier policy '{other}' (expected description | strict)"
        ))),
    }
}
