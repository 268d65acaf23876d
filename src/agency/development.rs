//! 开发机构：持有冻结的计划、一组 Developer 与一个 Verifier
//!
//! 状态机：Created → PlanAssigned → CodeCollected → Verified | Rejected，Verified → Committed | CommitFailed
//! - receive_plan 只在 Created 合法，按轮询把任务写入 Developer 的记忆槽
//! - collect_code 在 PlanAssigned（或 Rejected / CommitFailed 后重新收集）合法，空闲的 Developer 跳过
//! - verify_and_finalize_code 只在 CodeCollected 合法，且只接受本次收集出的那份提交
//! - commit 只在 Verified 合法，把通过校验的提交落盘
//!
//! 任何非法调用返回 InvalidState，机构状态不变。机构是自己内部图的所有者，通过 `deliver` 驱动成员。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agency::commit::commit_files;
use crate::agents::{Agent, AgentRole, CommunicationGraph, Envelope, VerificationReport};
use crate::core::AgentError;
use crate::plan::{CodeSubmission, Plan};
use crate::tools::AgencySummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgencyState {
    Created,
    PlanAssigned,
    CodeCollected,
    Verified,
    Rejected,
    /// 已校验的提交已写入磁盘
    Committed,
    /// 写盘失败并已回滚，可重新收集
    CommitFailed,
}

impl AgencyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgencyState::Created => "Created",
            AgencyState::PlanAssigned => "PlanAssigned",
            AgencyState::CodeCollected => "CodeCollected",
            AgencyState::Verified => "Verified",
            AgencyState::Rejected => "Rejected",
            AgencyState::Committed => "Committed",
            AgencyState::CommitFailed => "CommitFailed",
        }
    }
}

impl std::fmt::Display for AgencyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct DevelopmentAgency {
    name: String,
    graph: CommunicationGraph,
    developers: Vec<String>,
    verifier: String,
    state: AgencyState,
    plan: Option<Arc<Plan>>,
    /// (developer, task_id)，按分配顺序
    assignments: Vec<(String, String)>,
    submission: Option<CodeSubmission>,
    report: Option<VerificationReport>,
}

impl std::fmt::Debug for DevelopmentAgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevelopmentAgency")
            .field("name", &self.name)
            .field("developers", &self.developers)
            .field("verifier", &self.verifier)
            .field("state", &self.state)
            .finish()
    }
}

impl DevelopmentAgency {
    pub fn new(
        name: impl Into<String>,
        developers: Vec<Arc<dyn Agent>>,
        verifier: Arc<dyn Agent>,
    ) -> Result<Self, AgentError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AgentError::Config("agency name must not be empty".to_string()));
        }
        if developers.is_empty() {
            return Err(AgentError::Config(format!("agency {name} needs at least one developer")));
        }
        if let Some(bad) = developers.iter().find(|d| d.role() != AgentRole::Developer) {
            return Err(AgentError::Config(format!("{} is not a developer", bad.name())));
        }
        if verifier.role() != AgentRole::Verifier {
            return Err(AgentError::Config(format!("{} is not a verifier", verifier.name())));
        }

        let mut graph = CommunicationGraph::new();
        let developer_names = developers.iter().map(|d| d.name().to_string()).collect();
        let verifier_name = verifier.name().to_string();
        for d in developers {
            graph.add_agent(d)?;
        }
        graph.add_agent(verifier)?;

        Ok(Self {
            name,
            graph,
            developers: developer_names,
            verifier: verifier_name,
            state: AgencyState::Created,
            plan: None,
            assignments: Vec::new(),
            submission: None,
            report: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AgencyState {
        self.state
    }

    pub fn plan(&self) -> Option<&Arc<Plan>> {
        self.plan.as_ref()
    }

    pub fn developer_names(&self) -> &[String] {
        &self.developers
    }

    pub fn assignments(&self) -> &[(String, String)] {
        &self.assignments
    }

    pub fn submission(&self) -> Option<&CodeSubmission> {
        self.submission.as_ref()
    }

    pub fn last_report(&self) -> Option<&VerificationReport> {
        self.report.as_ref()
    }

    pub fn summary(&self) -> AgencySummary {
        AgencySummary {
            name: self.name.clone(),
            developers: self.developers.len(),
            state: self.state.as_str(),
            project_name: self.plan.as_ref().map(|p| p.project_name.clone()),
        }
    }

    fn invalid(&self, operation: &'static str) -> AgentError {
        AgentError::InvalidState {
            agency: self.name.clone(),
            state: self.state.as_str(),
            operation,
        }
    }

    /// 接收计划并轮询分配任务；同一机构只能接收一次
    pub async fn receive_plan(&mut self, plan: Arc<Plan>) -> Result<&[(String, String)], AgentError> {
        if self.state != AgencyState::Created {
            return Err(self.invalid("receive_plan"));
        }
        plan.validate()?;

        let assignments: Vec<(String, String)> = plan
            .tasks
            .iter()
            .zip(self.developers.iter().cycle())
            .map(|(task, dev)| (dev.clone(), task.task_id.clone()))
            .collect();
        for (task, (dev, _)) in plan.tasks.iter().zip(&assignments) {
            self.graph
                .deliver(dev, Envelope::AssignTask { task: task.clone() })
                .await?;
        }

        tracing::info!(
            agency = %self.name,
            project = %plan.project_name,
            tasks = plan.tasks.len(),
            developers = self.developers.len(),
            "plan assigned"
        );
        self.assignments = assignments;
        self.plan = Some(plan);
        self.state = AgencyState::PlanAssigned;
        Ok(&self.assignments)
    }

    /// 让每个有任务的 Developer 完成工作，汇成一份提交
    pub async fn collect_code(&mut self) -> Result<CodeSubmission, AgentError> {
        if !matches!(
            self.state,
            AgencyState::PlanAssigned | AgencyState::Rejected | AgencyState::CommitFailed
        ) {
            return Err(self.invalid("collect_code"));
        }
        let plan = self.plan.clone().ok_or_else(|| self.invalid("collect_code"))?;

        let mut busy: Vec<&String> = Vec::new();
        for (dev, _) in &self.assignments {
            if !busy.contains(&dev) {
                busy.push(dev);
            }
        }

        let mut submission = CodeSubmission::new(plan.project_name.clone(), Vec::new());
        for dev in busy {
            let work = self
                .graph
                .deliver(dev, Envelope::WorkOnAssigned)
                .await?
                .into_work()?;
            submission.files.extend(work.files);
            submission.unfinished.extend(work.failures);
        }

        tracing::info!(
            agency = %self.name,
            files = submission.files.len(),
            unfinished = submission.unfinished.len(),
            "code collected"
        );
        self.submission = Some(submission.clone());
        self.report = None;
        self.state = AgencyState::CodeCollected;
        Ok(submission)
    }

    /// 交给 Verifier；通过 -> Verified，否则 -> Rejected（须重新 collect_code）
    pub async fn verify_and_finalize_code(
        &mut self,
        submission: &CodeSubmission,
    ) -> Result<VerificationReport, AgentError> {
        if self.state != AgencyState::CodeCollected {
            return Err(self.invalid("verify_and_finalize_code"));
        }
        let current = self.submission.as_ref().map(|s| s.id);
        if current != Some(submission.id) {
            return Err(AgentError::InvalidState {
                agency: self.name.clone(),
                state: self.state.as_str(),
                operation: "verify_and_finalize_code (stale submission)",
            });
        }
        let plan = self.plan.clone().ok_or_else(|| self.invalid("verify_and_finalize_code"))?;

        let report = self
            .graph
            .deliver(
                &self.verifier,
                Envelope::Verify {
                    plan,
                    submission: submission.clone(),
                },
            )
            .await?
            .into_verification()?;

        self.state = if report.accepted {
            AgencyState::Verified
        } else {
            AgencyState::Rejected
        };
        tracing::info!(agency = %self.name, state = %self.state, checked = report.checked, "verification finished");
        self.report = Some(report.clone());
        Ok(report)
    }

    /// 把已校验的提交写到 `<root>/<project>/`；失败时回滚并进入 CommitFailed
    pub fn commit(&mut self, root: &Path) -> Result<Vec<PathBuf>, AgentError> {
        if self.state != AgencyState::Verified {
            return Err(self.invalid("commit"));
        }
        let submission = self.submission.as_ref().ok_or_else(|| self.invalid("commit"))?;
        match commit_files(root, &submission.project_name, &submission.files) {
            Ok(written) => {
                self.state = AgencyState::Committed;
                tracing::info!(agency = %self.name, files = written.len(), "code committed");
                Ok(written)
            }
            Err(e) => {
                self.state = AgencyState::CommitFailed;
                tracing::warn!(agency = %self.name, error = %e, "commit failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agency::{ContainsText, DescriptionMarker, VerificationPolicy};
    use crate::agents::{CodeGenerator, Developer, DeveloperConfig, TemplateGenerator, Verifier, VerifierConfig};
    use crate::plan::Task;

    fn agency(developers: usize, policy: Arc<dyn VerificationPolicy>) -> DevelopmentAgency {
        let devs: Vec<Arc<dyn Agent>> = (0..developers)
            .map(|i| {
                Arc::new(
                    Developer::new(
                        DeveloperConfig::new(format!("dev-{i}"), "py"),
                        Arc::new(TemplateGenerator),
                    )
                    .unwrap(),
                ) as Arc<dyn Agent>
            })
            .collect();
        let verifier = Arc::new(Verifier::new(VerifierConfig::new("verifier"), policy).unwrap());
        DevelopmentAgency::new("team", devs, verifier).unwrap()
    }

    fn login_plan() -> Arc<Plan> {
        Arc::new(Plan::new(
            "P",
            vec![Task::new("1", "Build login", vec!["login".into()])],
        ))
    }

    fn three_task_plan() -> Arc<Plan> {
        Arc::new(Plan::new(
            "P",
            vec![
                Task::new("a", "first", vec![]),
                Task::new("b", "second", vec![]),
                Task::new("c", "third", vec![]),
            ],
        ))
    }

    #[tokio::test]
    async fn test_login_scenario_verifies() {
        let mut a = agency(1, Arc::new(DescriptionMarker));
        a.receive_plan(login_plan()).await.unwrap();
        let sub = a.collect_code().await.unwrap();
        assert_eq!(sub.files.len(), 1);
        assert_eq!(sub.files[0].task_id, "1");
        let report = a.verify_and_finalize_code(&sub).await.unwrap();
        assert!(report.accepted);
        assert_eq!(a.state(), AgencyState::Verified);
    }

    #[tokio::test]
    async fn test_tightened_policy_rejects() {
        let mut a = agency(1, Arc::new(ContainsText::new("# reviewed")));
        a.receive_plan(login_plan()).await.unwrap();
        let sub = a.collect_code().await.unwrap();
        let report = a.verify_and_finalize_code(&sub).await.unwrap();
        assert!(!report.accepted);
        assert_eq!(a.state(), AgencyState::Rejected);

        // 同一份提交不能再校验；重新收集后可以
        let err = a.verify_and_finalize_code(&sub).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidState { state: "Rejected", .. }));
        let again = a.collect_code().await.unwrap();
        assert_ne!(again.id, sub.id);
        assert_eq!(a.state(), AgencyState::CodeCollected);
    }

    #[tokio::test]
    async fn test_round_robin_and_idle_developers() {
        let mut a = agency(2, Arc::new(DescriptionMarker));
        let assigned = a.receive_plan(three_task_plan()).await.unwrap().to_vec();
        assert_eq!(
            assigned,
            vec![
                ("dev-0".to_string(), "a".to_string()),
                ("dev-1".to_string(), "b".to_string()),
                ("dev-0".to_string(), "c".to_string()),
            ]
        );

        let mut idle = agency(5, Arc::new(DescriptionMarker));
        idle.receive_plan(login_plan()).await.unwrap();
        let sub = idle.collect_code().await.unwrap();
        assert_eq!(sub.files.len(), 1);
    }

    #[tokio::test]
    async fn test_submission_task_ids_subset_of_plan() {
        for devs in 1..4 {
            let mut a = agency(devs, Arc::new(DescriptionMarker));
            let plan = three_task_plan();
            a.receive_plan(plan.clone()).await.unwrap();
            let sub = a.collect_code().await.unwrap();
            let ids = plan.task_ids();
            assert!(sub.task_ids().all(|id| ids.contains(id)));
            assert_eq!(sub.files.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_state_machine_misuse() {
        let mut a = agency(1, Arc::new(DescriptionMarker));
        assert!(matches!(
            a.collect_code().await,
            Err(AgentError::InvalidState { operation: "collect_code", .. })
        ));
        a.receive_plan(login_plan()).await.unwrap();
        let err = a.receive_plan(login_plan()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidState { state: "PlanAssigned", .. }));
        assert_eq!(a.state(), AgencyState::PlanAssigned);

        let stale = CodeSubmission::new("P", vec![]);
        a.collect_code().await.unwrap();
        assert!(matches!(
            a.verify_and_finalize_code(&stale).await,
            Err(AgentError::InvalidState { .. })
        ));
        assert_eq!(a.state(), AgencyState::CodeCollected);
    }

    /// 第一次生成失败，之后照模板生成
    struct FailsOnce(std::sync::atomic::AtomicBool);

    #[async_trait::async_trait]
    impl CodeGenerator for FailsOnce {
        async fn generate(&self, task: &Task, context: &str) -> Result<String, AgentError> {
            if !self.0.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(AgentError::Config("generator offline".into()));
            }
            TemplateGenerator.generate(task, context).await
        }
    }

    #[tokio::test]
    async fn test_unfinished_task_rejects_then_recollects() {
        let dev = Developer::new(
            DeveloperConfig::new("dev-0", "py"),
            Arc::new(FailsOnce(std::sync::atomic::AtomicBool::new(false))),
        )
        .unwrap();
        let verifier = Verifier::new(VerifierConfig::new("verifier"), Arc::new(DescriptionMarker)).unwrap();
        let mut a = DevelopmentAgency::new("team", vec![Arc::new(dev)], Arc::new(verifier)).unwrap();
        a.receive_plan(login_plan()).await.unwrap();

        let sub = a.collect_code().await.unwrap();
        assert!(sub.files.is_empty());
        assert_eq!(sub.unfinished.len(), 1);
        let report = a.verify_and_finalize_code(&sub).await.unwrap();
        assert!(!report.accepted);
        assert!(report.rejection.unwrap().reason.contains("generator offline"));
        assert_eq!(a.state(), AgencyState::Rejected);

        let again = a.collect_code().await.unwrap();
        assert!(a.verify_and_finalize_code(&again).await.unwrap().accepted);
        assert_eq!(a.state(), AgencyState::Verified);
    }

    #[tokio::test]
    async fn test_commit_only_after_verification() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = agency(1, Arc::new(DescriptionMarker));
        a.receive_plan(login_plan()).await.unwrap();
        assert!(matches!(a.commit(dir.path()), Err(AgentError::InvalidState { operation: "commit", .. })));
        let sub = a.collect_code().await.unwrap();
        a.verify_and_finalize_code(&sub).await.unwrap();
        let written = a.commit(dir.path()).unwrap();
        assert_eq!(written, vec![dir.path().join("P/1.py")]);
        assert_eq!(a.state(), AgencyState::Committed);
        assert!(a.commit(dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_failed_commit_allows_recollect() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("P"), "occupied").unwrap();
        let mut a = agency(1, Arc::new(DescriptionMarker));
        a.receive_plan(login_plan()).await.unwrap();
        let sub = a.collect_code().await.unwrap();
        assert!(a.verify_and_finalize_code(&sub).await.unwrap().accepted);
        assert!(matches!(a.commit(dir.path()), Err(AgentError::Io(_))));
        assert_eq!(a.state(), AgencyState::CommitFailed);

        std::fs::remove_file(dir.path().join("P")).unwrap();
        let again = a.collect_code().await.unwrap();
        assert!(a.verify_and_finalize_code(&again).await.unwrap().accepted);
        a.commit(dir.path()).unwrap();
        assert!(dir.path().join("P/1.py").is_file());
    }

    #[tokio::test]
    async fn test_plan_with_path_in_name_rejected() {
        let mut a = agency(1, Arc::new(DescriptionMarker));
        let bad = Arc::new(Plan::new("Weather/News App", vec![Task::new("1", "x", vec![])]));
        assert!(matches!(a.receive_plan(bad).await, Err(AgentError::InvalidPlan(_))));
        assert_eq!(a.state(), AgencyState::Created);
    }

    #[tokio::test]
    async fn test_invalid_plan_leaves_agency_created() {
        let mut a = agency(1, Arc::new(DescriptionMarker));
        let bad = Arc::new(Plan::new(
            "P",
            vec![Task::new("1", "x", vec![]), Task::new("1", "y", vec![])],
        ));
        assert!(matches!(a.receive_plan(bad).await, Err(AgentError::InvalidPlan(_))));
        assert_eq!(a.state(), AgencyState::Created);
    }

    #[test]
    fn test_requires_developers() {
        let verifier = Arc::new(
            Verifier::new(VerifierConfig::new("v"), Arc::new(DescriptionMarker)).unwrap(),
        );
        assert!(matches!(
            DevelopmentAgency::new("x", Vec::new(), verifier),
            Err(AgentError::Config(_))
        ));
    }
}
