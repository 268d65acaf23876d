//! 命名开发机构的注册表
//!
//! 由 Orchestrator 创建并交给 SeniorDeveloper 持有，显式的 create / get / destroy 生命周期。
//! 每个机构各自一把锁：对一个机构的长操作不会挡住对其它机构的查询。

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::agency::DevelopmentAgency;
use crate::core::AgentError;
use crate::tools::AgencySummary;

pub type AgencyHandle = Arc<Mutex<DevelopmentAgency>>;

#[derive(Default)]
pub struct AgencyRegistry {
    agencies: Mutex<BTreeMap<String, AgencyHandle>>,
}

impl AgencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, agency: DevelopmentAgency) -> Result<AgencyHandle, AgentError> {
        let mut agencies = self.agencies.lock().await;
        let name = agency.name().to_string();
        if agencies.contains_key(&name) {
            return Err(AgentError::AgencyExists(name));
        }
        let handle = Arc::new(Mutex::new(agency));
        agencies.insert(name, handle.clone());
        Ok(handle)
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.agencies.lock().await.contains_key(name)
    }

    pub async fn get(&self, name: &str) -> Result<AgencyHandle, AgentError> {
        self.agencies
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::AgencyNotFound(name.to_string()))
    }

    pub async fn remove(&self, name: &str) -> Result<(), AgentError> {
        self.agencies
            .lock()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AgentError::AgencyNotFound(name.to_string()))
    }

    /// 按名称排序的概要
    pub async fn summaries(&self) -> Vec<AgencySummary> {
        let handles: Vec<AgencyHandle> = self.agencies.lock().await.values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for h in handles {
            out.push(h.lock().await.summary());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agency::DescriptionMarker;
    use crate::agents::{Agent, Developer, DeveloperConfig, TemplateGenerator, Verifier, VerifierConfig};

    fn agency(name: &str) -> DevelopmentAgency {
        let dev: Arc<dyn Agent> = Arc::new(
            Developer::new(DeveloperConfig::new(format!("{name}-dev"), "py"), Arc::new(TemplateGenerator))
                .unwrap(),
        );
        let verifier = Arc::new(
            Verifier::new(VerifierConfig::new(format!("{name}-verifier")), Arc::new(DescriptionMarker))
                .unwrap(),
        );
        DevelopmentAgency::new(name, vec![dev], verifier).unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let reg = AgencyRegistry::new();
        reg.insert(agency("b")).await.unwrap();
        reg.insert(agency("a")).await.unwrap();
        assert!(matches!(reg.insert(agency("a")).await, Err(AgentError::AgencyExists(_))));

        let names: Vec<_> = reg.summaries().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["a", "b"]);

        reg.remove("a").await.unwrap();
        assert!(!reg.contains("a").await);
        assert!(matches!(reg.get("a").await, Err(AgentError::AgencyNotFound(_))));
        assert!(matches!(reg.remove("a").await, Err(AgentError::AgencyNotFound(_))));
    }
}
