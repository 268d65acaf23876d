//! 核心编排层：错误分类、会话监管、主控编排器

pub mod error;
pub mod orchestrator;
pub mod session_supervisor;

pub use error::{AgentError, Rejection, ServiceError};
pub use orchestrator::{render_error, Orchestrator, Outcome};
pub use session_supervisor::SessionSupervisor;
