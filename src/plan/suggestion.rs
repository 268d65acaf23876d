//! 建议（add / modify / remove）及其在 Plan 键空间上的合入
//!
//! 合入是按键的「最后写入者胜」：同一建议列表合入两次与合入一次结果相同；
//! 任何 add/modify 之后的 remove 一定删除该键。整批合入是原子的，有一条非法则整个 Plan 不变。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::plan::model::{is_path_segment, validate_tasks, Plan, Task, KEY_PROJECT_NAME, KEY_TASKS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Suggestion {
    Add { key: String, value: Value },
    Modify { key: String, value: Value },
    Remove { key: String },
}

impl Suggestion {
    pub fn key(&self) -> &str {
        match self {
            Suggestion::Add { key, .. } | Suggestion::Modify { key, .. } | Suggestion::Remove { key } => key,
        }
    }
}

/// 合入建议，返回新 Plan；输入不变
pub fn incorporate(plan: &Plan, suggestions: &[Suggestion]) -> Result<Plan, AgentError> {
    let mut next = plan.clone();
    for s in suggestions {
        apply_one(&mut next, s)?;
    }
    Ok(next)
}

fn apply_one(plan: &mut Plan, suggestion: &Suggestion) -> Result<(), AgentError> {
    match suggestion {
        Suggestion::Add { key, value } | Suggestion::Modify { key, value } => {
            set_key(plan, key, value)
        }
        Suggestion::Remove { key } => match key.as_str() {
            KEY_PROJECT_NAME | KEY_TASKS => Err(AgentError::InvalidSuggestion(format!(
                "'{key}' cannot be removed"
            ))),
            _ => {
                plan.extras.remove(key);
                Ok(())
            }
        },
    }
}

fn set_key(plan: &mut Plan, key: &str, value: &Value) -> Result<(), AgentError> {
    if key.trim().is_empty() {
        return Err(AgentError::InvalidSuggestion("empty key".to_string()));
    }
    match key {
        KEY_PROJECT_NAME => {
            let name = value
                .as_str()
                .filter(|s| !s.trim().is_empty() && is_path_segment(s))
                .ok_or_else(|| {
                    AgentError::InvalidSuggestion(
                        "project_name must be a non-empty single path segment".to_string(),
                    )
                })?;
            plan.project_name = name.to_string();
        }
        KEY_TASKS => {
            let tasks: Vec<Task> = serde_json::from_value(value.clone()).map_err(|e| {
                AgentError::InvalidSuggestion(format!("tasks must be a task list: {e}"))
            })?;
            validate_tasks(&tasks)
                .map_err(|e| AgentError::InvalidSuggestion(e.to_string()))?;
            plan.tasks = tasks;
        }
        _ => {
            plan.extras.insert(key.to_string(), value.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_plan() -> Plan {
        Plan::new("P", vec![Task::new("1", "Build login", vec!["login".into()])])
    }

    #[test]
    fn test_parse_tagged_suggestions() {
        let parsed: Vec<Suggestion> = serde_json::from_value(json!([
            {"type": "add", "key": "testing", "value": "pytest"},
            {"type": "remove", "key": "legacy"}
        ]))
        .unwrap();
        assert_eq!(parsed[0].key(), "testing");
        assert!(matches!(parsed[1], Suggestion::Remove { .. }));
    }

    #[test]
    fn test_remove_after_add_always_removes() {
        let suggestions = vec![
            Suggestion::Add { key: "db".into(), value: json!("postgres") },
            Suggestion::Modify { key: "db".into(), value: json!("sqlite") },
            Suggestion::Remove { key: "db".into() },
        ];
        let plan = incorporate(&base_plan(), &suggestions).unwrap();
        assert!(plan.get("db").is_none());
    }

    #[test]
    fn test_applying_twice_equals_once() {
        let suggestions = vec![
            Suggestion::Add { key: "db".into(), value: json!("postgres") },
            Suggestion::Remove { key: "cache".into() },
            Suggestion::Modify { key: "project_name".into(), value: json!("Q") },
        ];
        let once = incorporate(&base_plan(), &suggestions).unwrap();
        let twice = incorporate(&once, &suggestions).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.project_name, "Q");
    }

    #[test]
    fn test_project_name_with_separator_rejected() {
        let suggestions = vec![Suggestion::Modify {
            key: "project_name".into(),
            value: json!("Weather/News"),
        }];
        assert!(matches!(
            incorporate(&base_plan(), &suggestions),
            Err(AgentError::InvalidSuggestion(_))
        ));
    }

    #[test]
    fn test_input_plan_untouched_on_error() {
        let plan = base_plan();
        let suggestions = vec![
            Suggestion::Add { key: "db".into(), value: json!("postgres") },
            Suggestion::Remove { key: "tasks".into() },
        ];
        assert!(matches!(
            incorporate(&plan, &suggestions),
            Err(AgentError::InvalidSuggestion(_))
        ));
        assert!(plan.get("db").is_none());
    }

    #[test]
    fn test_modify_tasks_validates_ids() {
        let dup = Suggestion::Modify {
            key: "tasks".into(),
            value: json!([
                {"task_id": "1", "description": "a"},
                {"task_id": "1", "description": "b"}
            ]),
        };
        assert!(incorporate(&base_plan(), &[dup]).is_err());

        let ok = Suggestion::Modify {
            key: "tasks".into(),
            value: json!([{"task_id": "9", "description": "new"}]),
        };
        let plan = incorporate(&base_plan(), &[ok]).unwrap();
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].task_id, "9");
    }
}
