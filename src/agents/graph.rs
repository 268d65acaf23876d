//! 通信图：Agent 注册表 + 有向边
//!
//! `route(sender, recipient, envelope)` 是 Agent 之间唯一的调用路径：
//! 任一端点未注册返回 UnknownAgent，不存在 sender -> recipient 的边返回 UnauthorizedRoute，
//! 接收方不接受该动作返回 UnsupportedAction。`deliver` 是图的所有者（Orchestrator / DevelopmentAgency）
//! 把外部请求投递给某个 Agent 的入口，不属于 Agent 之间的调用。
//! 每次投递输出一条结构化审计日志（JSON）。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use crate::agents::{Agent, Envelope, Reply};
use crate::core::AgentError;

/// 所有者入口在审计日志中的发送方名
pub const OWNER: &str = "@owner";

#[derive(Default)]
pub struct CommunicationGraph {
    agents: HashMap<String, Arc<dyn Agent>>,
    /// 有向边 (from, to)
    edges: BTreeSet<(String, String)>,
}

/// handle 期间传给 Agent 的上下文：只能以自己的名义经由图发送
pub struct RouteContext<'a> {
    graph: &'a CommunicationGraph,
    me: &'a str,
}

impl<'a> RouteContext<'a> {
    pub fn me(&self) -> &str {
        self.me
    }

    pub async fn send(&self, recipient: &str, envelope: Envelope) -> Result<Reply, AgentError> {
        self.graph.route(self.me, recipient, envelope).await
    }
}

impl CommunicationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 Agent；重名视为配置错误
    pub fn add_agent(&mut self, agent: Arc<dyn Agent>) -> Result<(), AgentError> {
        let name = agent.name().to_string();
        if self.agents.contains_key(&name) {
            return Err(AgentError::Config(format!("duplicate agent name: {name}")));
        }
        self.agents.insert(name, agent);
        Ok(())
    }

    /// 声明 from -> to 的单向能力；两端都须已注册，且 from 的契约里声明了 to 的角色
    pub fn add_channel(&mut self, from: &str, to: &str) -> Result<(), AgentError> {
        let sender = self.lookup(from)?;
        let recipient = self.lookup(to)?;
        if !sender.capabilities().may_contact(recipient.role()) {
            return Err(AgentError::UnauthorizedRoute {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.edges.insert((from.to_string(), to.to_string()));
        Ok(())
    }

    pub fn can_route(&self, from: &str, to: &str) -> bool {
        self.edges.contains(&(from.to_string(), to.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn agent(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn Agent>, AgentError> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownAgent(name.to_string()))
    }

    /// Agent 之间的调用
    pub async fn route(
        &self,
        sender: &str,
        recipient: &str,
        envelope: Envelope,
    ) -> Result<Reply, AgentError> {
        self.lookup(sender)?;
        let target = self.lookup(recipient)?;
        if !self.can_route(sender, recipient) {
            return Err(AgentError::UnauthorizedRoute {
                from: sender.to_string(),
                to: recipient.to_string(),
            });
        }
        self.dispatch(sender, target, envelope).await
    }

    /// 所有者投递
    pub async fn deliver(&self, recipient: &str, envelope: Envelope) -> Result<Reply, AgentError> {
        let target = self.lookup(recipient)?;
        self.dispatch(OWNER, target, envelope).await
    }

    async fn dispatch(
        &self,
        sender: &str,
        target: Arc<dyn Agent>,
        envelope: Envelope,
    ) -> Result<Reply, AgentError> {
        let action = envelope.action();
        let start = Instant::now();
        let result = if target.capabilities().accepts(action) {
            let ctx = RouteContext {
                graph: self,
                me: target.name(),
            };
            target.handle(envelope, &ctx).await
        } else {
            Err(AgentError::UnsupportedAction {
                agent: target.name().to_string(),
                action,
            })
        };

        let (ok, outcome) = match &result {
            Ok(reply) => (true, reply.kind()),
            Err(AgentError::UnsupportedAction { .. }) => (false, "unsupported_action"),
            Err(_) => (false, "error"),
        };
        let audit = serde_json::json!({
            "event": "route_audit",
            "sender": sender,
            "recipient": target.name(),
            "action": action,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "route");
        if let Err(e) = &result {
            tracing::debug!(recipient = %target.name(), action, error = %e, "route failed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentRole, Capabilities};
    use async_trait::async_trait;

    /// 测试用：Planner 角色，可联系 Suggester；收到 GetInfo 时转发给 `forward_to`
    struct Relay {
        name: String,
        role: AgentRole,
        forward_to: Option<String>,
    }

    #[async_trait]
    impl Agent for Relay {
        fn name(&self) -> &str {
            &self.name
        }

        fn role(&self) -> AgentRole {
            self.role
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                services: &[],
                peers: &[AgentRole::Suggester],
                actions: &["get_info"],
            }
        }

        async fn handle(&self, envelope: Envelope, ctx: &RouteContext<'_>) -> Result<Reply, AgentError> {
            match (&self.forward_to, envelope) {
                (Some(to), env) => ctx.send(to, env).await,
                (None, Envelope::GetInfo { query }) => Ok(Reply::Text(format!("{}:{}", self.name, query))),
                (None, _) => Ok(Reply::Ack),
            }
        }
    }

    fn relay(name: &str, role: AgentRole, forward_to: Option<&str>) -> Arc<dyn Agent> {
        Arc::new(Relay {
            name: name.to_string(),
            role,
            forward_to: forward_to.map(String::from),
        })
    }

    fn graph() -> CommunicationGraph {
        let mut g = CommunicationGraph::new();
        g.add_agent(relay("a", AgentRole::Planner, Some("b"))).unwrap();
        g.add_agent(relay("b", AgentRole::Suggester, None)).unwrap();
        g.add_agent(relay("c", AgentRole::Suggester, None)).unwrap();
        g.add_channel("a", "b").unwrap();
        g
    }

    fn info() -> Envelope {
        Envelope::GetInfo { query: "q".into() }
    }

    #[tokio::test]
    async fn test_route_along_edge() {
        let g = graph();
        let reply = g.route("a", "b", info()).await.unwrap();
        assert_eq!(reply.into_text().unwrap(), "b:q");
    }

    #[tokio::test]
    async fn test_every_pair_without_edge_is_unauthorized() {
        let g = graph();
        let names = ["a", "b", "c"];
        for from in names {
            for to in names {
                if from == "a" && to == "b" {
                    continue;
                }
                let err = g.route(from, to, info()).await.unwrap_err();
                assert!(
                    matches!(err, AgentError::UnauthorizedRoute { .. }),
                    "{from} -> {to}: {err:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_direction_matters() {
        let g = graph();
        assert!(g.can_route("a", "b"));
        assert!(!g.can_route("b", "a"));
    }

    #[tokio::test]
    async fn test_unknown_endpoints() {
        let g = graph();
        assert!(matches!(g.route("x", "b", info()).await, Err(AgentError::UnknownAgent(n)) if n == "x"));
        assert!(matches!(g.route("a", "y", info()).await, Err(AgentError::UnknownAgent(n)) if n == "y"));
        assert!(matches!(g.deliver("y", info()).await, Err(AgentError::UnknownAgent(_))));
    }

    #[tokio::test]
    async fn test_unsupported_action() {
        let g = graph();
        let err = g.route("a", "b", Envelope::WorkOnAssigned).await.unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedAction { action: "work_on_assigned", .. }));
    }

    /// 收集日志输出
    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unsupported_action_is_audited() {
        use tracing_subscriber::prelude::*;

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(move || writer.clone()),
        );
        let _guard = tracing::subscriber::set_default(subscriber);

        let g = graph();
        assert!(g.deliver("b", Envelope::WorkOnAssigned).await.is_err());

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = logs
            .lines()
            .find(|l| l.contains("route_audit"))
            .expect("audit line");
        assert!(line.contains(r#""sender":"@owner""#), "{line}");
        assert!(line.contains(r#""recipient":"b""#), "{line}");
        assert!(line.contains(r#""action":"work_on_assigned""#), "{line}");
        assert!(line.contains(r#""ok":false"#), "{line}");
        assert!(line.contains(r#""outcome":"unsupported_action""#), "{line}");
    }

    #[tokio::test]
    async fn test_deliver_then_nested_route() {
        let g = graph();
        let reply = g.deliver("a", info()).await.unwrap();
        assert_eq!(reply.into_text().unwrap(), "b:q");
    }

    #[tokio::test]
    async fn test_nested_route_without_edge_fails() {
        let mut g = CommunicationGraph::new();
        g.add_agent(relay("a", AgentRole::Planner, Some("b"))).unwrap();
        g.add_agent(relay("b", AgentRole::Suggester, None)).unwrap();
        let err = g.deliver("a", info()).await.unwrap_err();
        assert!(matches!(err, AgentError::UnauthorizedRoute { .. }));
    }

    #[test]
    fn test_channel_requires_registered_and_declared_peer() {
        let mut g = graph();
        assert!(matches!(g.add_channel("a", "zz"), Err(AgentError::UnknownAgent(_))));
        // b 的契约没有声明 Planner 角色
        g.add_agent(relay("p2", AgentRole::Planner, None)).unwrap();
        assert!(matches!(
            g.add_channel("b", "p2"),
            Err(AgentError::UnauthorizedRoute { .. })
        ));
        assert!(g.add_agent(relay("a", AgentRole::Planner, None)).is_err());
    }
}
