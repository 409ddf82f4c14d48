//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__AGENT__MAX_ITERATIONS=10`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSettings,
    pub llm: LlmSection,
}

/// [agent] 段：迭代上限、日志级别、工具超时、规划间隔、额外允许导入的模块
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// 多步 Agent 的最大迭代次数
    pub max_iterations: usize,
    /// 0 = warn，1 = info，2 = debug
    pub verbose: u8,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 每隔 n 轮插入一次规划步；None 表示不规划
    pub planning_interval: Option<usize>,
    pub additional_authorized_imports: Vec<String>,
    /// 每步记录保存当时使用的上下文
    pub memory_verbose: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            verbose: 0,
            tool_timeout_secs: 30,
            planning_interval: None,
            additional_authorized_imports: Vec::new(),
            memory_verbose: false,
        }
    }
}

/// [llm] 段：OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取环境变量 OPENAI_API_KEY
    pub api_key: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 BEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEE__*（双下划线表示嵌套键，额外导入模块用逗号分隔）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("agent.additional_authorized_imports")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
