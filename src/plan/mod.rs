//! 计划层：数据模型、建议合入、completion 输出解析

pub mod model;
pub mod parse;
pub mod suggestion;

pub use model::{
    CodeFile, CodeSubmission, Plan, Task, Unfinished, KEY_ARCHITECTURE, KEY_PROJECT_NAME,
    KEY_REQUIREMENTS, KEY_TASKS, KEY_TECH_STACK,
};
pub use parse::{extract_json, parse_completion, schema_json};
pub use suggestion::{incorporate, Suggestion};
