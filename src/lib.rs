//! DevAgency - 多智能体开发机构
//!
//! 模块划分：
//! - **agency**: 开发机构状态机、机构注册表、校验策略、全有或全无提交
//! - **agents**: Planner / Suggester / Browser / Developer / Verifier / SeniorDeveloper 与通信图
//! - **cli**: 行式命令解析
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、会话监管、编排器
//! - **llm**: completion 客户端抽象与实现（OpenAI 兼容 / Groq / Mock / Scripted）
//! - **memory**: 对话历史与 Developer 任务记忆槽
//! - **plan**: 计划数据模型、建议合入、completion 输出解析
//! - **tools**: SeniorDeveloper 的封闭工具集、执行器与沙箱文件系统
//! - **web**: 搜索（SearxNG）与抓取服务

pub mod agency;
pub mod agents;
pub mod cli;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod plan;
pub mod tools;
pub mod web;
