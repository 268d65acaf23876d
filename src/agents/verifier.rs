//! Verifier：按计划逐个校验提交的文件
//!
//! `verify_and_finalize_code(plan, submission)` 是 (plan, submission) 的纯函数：
//! 文件对应的任务不存在，或策略拒绝，都在第一处失败时停止并给出拒绝原因；
//! 文件全部通过后，计划里每个任务还必须有对应文件，否则以第一个缺失的任务拒绝。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agency::VerificationPolicy;
use crate::agents::{require_non_empty, Agent, AgentRole, Capabilities, Envelope, Reply, RouteContext};
use crate::core::{AgentError, Rejection};
use crate::plan::{CodeSubmission, Plan};

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub name: String,
}

impl VerifierConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// 校验结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub accepted: bool,
    /// 已通过的文件数
    pub checked: usize,
    pub rejection: Option<Rejection>,
}

pub struct Verifier {
    config: VerifierConfig,
    policy: Arc<dyn VerificationPolicy>,
}

impl Verifier {
    pub fn new(config: VerifierConfig, policy: Arc<dyn VerificationPolicy>) -> Result<Self, AgentError> {
        require_non_empty("verifier.name", &config.name)?;
        Ok(Self { config, policy })
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn verify_and_finalize_code(&self, plan: &Plan, submission: &CodeSubmission) -> VerificationReport {
        let mut checked = 0;
        for file in &submission.files {
            let verdict = match plan.task(&file.task_id) {
                None => Err(format!("task '{}' is not in the plan", file.task_id)),
                Some(task) => self.policy.check(task, file),
            };
            if let Err(reason) = verdict {
                return VerificationReport {
                    accepted: false,
                    checked,
                    rejection: Some(Rejection {
                        task_id: file.task_id.clone(),
                        file_name: file.file_name.clone(),
                        reason,
                    }),
                };
            }
            checked += 1;
        }

        if let Some(task) = plan
            .tasks
            .iter()
            .find(|t| !submission.files.iter().any(|f| f.task_id == t.task_id))
        {
            let reason = submission
                .unfinished
                .iter()
                .find(|u| u.task_id == task.task_id)
                .map(|u| format!("not generated by {}: {}", u.developer, u.reason))
                .unwrap_or_else(|| "no file submitted".to_string());
            return VerificationReport {
                accepted: false,
                checked,
                rejection: Some(Rejection {
                    task_id: task.task_id.clone(),
                    file_name: "(missing)".to_string(),
                    reason,
                }),
            };
        }
        VerificationReport {
            accepted: true,
            checked,
            rejection: None,
        }
    }
}

#[async_trait]
impl Agent for Verifier {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn role(&self) -> AgentRole {
        AgentRole::Verifier
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            services: &[],
            peers: &[],
            actions: &["verify"],
        }
    }

    async fn handle(&self, envelope: Envelope, _ctx: &RouteContext<'_>) -> Result<Reply, AgentError> {
        match envelope {
            Envelope::Verify { plan, submission } => {
                let report = self.verify_and_finalize_code(&plan, &submission);
                tracing::info!(
                    agent = %self.config.name,
                    policy = %self.policy.name(),
                    accepted = report.accepted,
                    checked = report.checked,
                    "submission verified"
                );
                Ok(Reply::Verification(report))
            }
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
    use crate::agency::{ContainsText, DescriptionMarker};
    use crate::plan::{CodeFile, Task, Unfinished};

    fn plan() -> Plan {
        Plan::new(
            "P",
            vec![
                Task::new("1", "Build login", vec!["login".into()]),
                Task::new("2", "Build signup", vec!["signup".into()]),
            ],
        )
    }

    fn file(task_id: &str, code: &str) -> CodeFile {
        CodeFile {
            file_name: format!("{task_id}.py"),
            code: code.into(),
            task_id: task_id.into(),
        }
    }

    fn verifier() -> Verifier {
        Verifier::new(VerifierConfig::new("Verifier"), Arc::new(DescriptionMarker)).unwrap()
    }

    #[test]
    fn test_accepts_matching_files() {
        let sub = CodeSubmission::new(
            "P",
            vec![file("1", "# Code for Build login"), file("2", "# Code for Build signup")],
        );
        let report = verifier().verify_and_finalize_code(&plan(), &sub);
        assert!(report.accepted);
        assert_eq!(report.checked, 2);
    }

    #[test]
    fn test_rejects_on_first_failure() {
        let sub = CodeSubmission::new(
            "P",
            vec![
                file("1", "# Code for Build login"),
                file("2", "nothing"),
                file("9", "# unknown"),
            ],
        );
        let report = verifier().verify_and_finalize_code(&plan(), &sub);
        assert!(!report.accepted);
        assert_eq!(report.checked, 1);
        assert_eq!(report.rejection.unwrap().task_id, "2");
    }

    #[test]
    fn test_missing_task_fails_closed() {
        let sub = CodeSubmission::new("P", vec![file("9", "# Code for Build login")]);
        let report = verifier().verify_and_finalize_code(&plan(), &sub);
        assert!(!report.accepted);
        assert!(report.rejection.unwrap().reason.contains("not in the plan"));
    }

    #[test]
    fn test_every_plan_task_needs_a_file() {
        let empty = CodeSubmission::new("P", vec![]);
        let report = verifier().verify_and_finalize_code(&plan(), &empty);
        assert!(!report.accepted);
        let rejection = report.rejection.unwrap();
        assert_eq!(rejection.task_id, "1");
        assert_eq!(rejection.reason, "no file submitted");

        let mut partial = CodeSubmission::new("P", vec![file("1", "# Code for Build login")]);
        partial.unfinished.push(Unfinished {
            task_id: "2".into(),
            developer: "dev-1".into(),
            reason: "completion timed out".into(),
        });
        let report = verifier().verify_and_finalize_code(&plan(), &partial);
        assert!(!report.accepted);
        assert_eq!(report.checked, 1);
        let rejection = report.rejection.unwrap();
        assert_eq!(rejection.task_id, "2");
        assert!(rejection.reason.contains("completion timed out"));
    }

    #[test]
    fn test_deterministic() {
        let v = Verifier::new(VerifierConfig::new("V"), Arc::new(ContainsText::new("QA"))).unwrap();
        let sub = CodeSubmission::new("P", vec![file("1", "# Code for Build login")]);
        let a = v.verify_and_finalize_code(&plan(), &sub);
        let b = v.verify_and_finalize_code(&plan(), &sub);
        assert_eq!(a, b);
        assert!(!a.accepted);
    }
}
