//! Developer 的记忆槽：按分配顺序排队的任务
//!
//! 队首即「当前任务」。只由所属 DevelopmentAgency 写入（单写者），Developer 读取。

use std::collections::VecDeque;

use crate::plan::Task;

#[derive(Clone, Debug, Default)]
pub struct WorkingMemory {
    assigned: VecDeque<Task>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, task: Task) {
        self.assigned.push_back(task);
    }

    /// 当前任务（队首）
    pub fn current_task(&self) -> Option<&Task> {
        self.assigned.front()
    }

    pub fn assigned(&self) -> impl Iterator<Item = &Task> {
        self.assigned.iter()
    }

    /// 构建供 LLM 生成代码时使用的 Prompt 片段
    pub fn to_prompt_section(&self) -> String {
        let mut s = String::new();
        if let Some(task) = self.current_task() {
            s.push_str(&format!("## Current Task\n{}: {}\n\n", task.task_id, task.description));
        }
        if self.assigned.len() > 1 {
            s.push_str("## Queued\n");
            for t in self.assigned.iter().skip(1) {
                s.push_str(&format!("- {}: {}\n", t.task_id, t.description));
            }
            s.push('\n');
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_task_is_front() {
        let mut mem = WorkingMemory::new();
        assert!(mem.current_task().is_none());
        mem.assign(Task::new("1", "first", vec![]));
        mem.assign(Task::new("2", "second", vec![]));
        assert_eq!(mem.current_task().map(|t| t.task_id.as_str()), Some("1"));
        assert!(mem.to_prompt_section().contains("- 2: second"));
    }
}
