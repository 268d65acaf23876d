//! 记忆层：对话历史（Browser / Orchestrator）与 Developer 的任务记忆槽

pub mod conversation;
pub mod working;

pub use conversation::{format_chat_history, ConversationMemory, Message, Role};
pub use working::WorkingMemory;
