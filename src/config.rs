//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DEVAGENCY__*` 覆盖（双下划线表示嵌套，如 `DEVAGENCY__LLM__PROVIDER=mock`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agents: AgentsSection,
    pub search: SearchSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、输出根目录、对话轮数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 生成代码的提交根目录，未设置时用 ./workspace
    pub output_root: Option<PathBuf>,
    /// /ask 对话历史保留轮数
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            output_root: None,
            max_context_turns: 20,
        }
    }
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：groq / openai / mock；无 API Key 时回落到 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: crate::llm::GROQ_DEFAULT_MODEL.to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次 completion 超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl LlmSection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            attempt_timeout: Duration::from_secs(self.timeouts.request),
        }
    }
}

/// [agents] 段：每个角色一个显式配置结构，模型名为空时使用 [llm].model
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AgentsSection {
    pub planner: PlannerSection,
    pub suggester: SuggesterSection,
    pub browser: BrowserSection,
    pub developer: DeveloperSection,
    pub verifier: VerifierSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    pub model: Option<String>,
    /// 是否向 Browser 调研技术栈与架构
    pub research_stack: bool,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            model: None,
            research_stack: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SuggesterSection {
    pub model: Option<String>,
    /// 评审前先向 Browser 查询一次资料
    pub consult_browser: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BrowserSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeveloperSection {
    /// 生成方式：template（确定性模板）/ llm
    pub generator: String,
    pub model: Option<String>,
    /// 生成文件扩展名
    pub extension: String,
}

impl Default for DeveloperSection {
    fn default() -> Self {
        Self {
            generator: "template".to_string(),
            model: None,
            extension: "py".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierSection {
    /// description（代码须引用任务描述）/ strict（另须定义全部函数）
    pub policy: String,
}

impl Default for VerifierSection {
    fn default() -> Self {
        Self {
            policy: "description".to_string(),
        }
    }
}

/// [search] 段：SearxNG 实例、语言、抓取超时、最大字符数、抓取域名白名单（空 = 不限制）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub searxng_instance: String,
    pub language: String,
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub allowed_domains: Vec<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            searxng_instance: "https://searx.be".to_string(),
            language: "en".to_string(),
            timeout_secs: 15,
            max_result_chars: 8000,
            allowed_domains: Vec::new(),
        }
    }
}

/// [tools] 段：SeniorDeveloper 工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 文件类工具单次超时（秒）
    pub tool_timeout_secs: u64,
    /// 机构类工具（收集 + 校验 + 提交）单次超时（秒）
    pub agency_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            agency_timeout_secs: 600,
        }
    }
}

impl AppConfig {
    /// 角色模型名：未单独配置时使用 [llm].model
    pub fn model_for(&self, role_model: &Option<String>) -> String {
        role_model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.llm.model.clone())
    }

    pub fn output_root(&self) -> PathBuf {
        self.app
            .output_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }
}

/// 从 config 目录加载配置，环境变量 DEVAGENCY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DEVAGENCY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DEVAGENCY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
