//! Agent 错误类型
//!
//! AgentError 的 Display 就是携带的消息本身：解析/执行错误会原样写回 step log，
//! 作为下一轮的纠错上下文喂给模型。ToolboxError 属于编程/配置错误，立即抛给调用方。

use serde::Serialize;
use thiserror::Error;

/// 运行期错误分类（解析 / 执行 / 步数耗尽 / 生成 / 配置）
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AgentError {
    /// 模型输出格式不合法（JSON、Action 文本、代码块）
    #[error("{0}")]
    Parsing(String),

    /// 未知工具、参数错误或工具内部失败（已包装）
    #[error("{0}")]
    Execution(String),

    /// 达到最大迭代次数仍无最终答案
    #[error("{0}")]
    MaxIterations(String),

    /// 模型引擎调用失败或返回不可用结果
    #[error("{0}")]
    Generation(String),

    /// 缺少模板标签、工具箱冲突等启动期错误
    #[error("{0}")]
    Config(String),
}

impl AgentError {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Parsing(_) => "parsing",
            AgentError::Execution(_) => "execution",
            AgentError::MaxIterations(_) => "max_iterations",
            AgentError::Generation(_) => "generation",
            AgentError::Config(_) => "config",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AgentError::Parsing(m)
            | AgentError::Execution(m)
            | AgentError::MaxIterations(m)
            | AgentError::Generation(m)
            | AgentError::Config(m) => m,
        }
    }
}

/// 工具箱变更与延迟工具解析的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolboxError {
    #[error("Error: tool '{0}' already exists in the toolbox.")]
    Duplicate(String),

    #[error("Error: tool {name} not found in toolbox for {op}, should be instead one of {known:?}.")]
    NotFound {
        name: String,
        op: &'static str,
        known: Vec<String>,
    },

    #[error("Error: could not load a tool for '{0}': no loader is registered for this task or repository.")]
    Unresolvable(String),

    #[error("Error: cannot update tool '{expected}' with a tool named '{found}'.")]
    NameMismatch { expected: String, found: String },
}

impl From<ToolboxError> for AgentError {
    fn from(e: ToolboxError) -> Self {
        AgentError::Config(e.to_string())
    }
}
