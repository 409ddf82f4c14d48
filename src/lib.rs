//! bee-core：LLM Agent 编排核心
//!
//! 模块划分：
//! - **agent**: AgentCore 运行骨架、单次 CodeAgent、多步 ReactJsonAgent / ReactCodeAgent
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、运行阶段状态机、共享状态
//! - **llm**: 模型引擎抽象与实现（OpenAI 兼容 / Scripted Mock）
//! - **memory**: 消息、step log、对话重建
//! - **observability**: tracing 初始化
//! - **react**: 动作解析（JSON / 文本 / 代码块）与 Prompt 模板
//! - **tools**: 工具箱、基础工具集、延迟工具加载、执行器、代码执行边界

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{AgentCore, CodeAgent, ReactCodeAgent, ReactJsonAgent, RunOutput};
pub use config::{load_config, AgentSettings, AppConfig};
pub use core::{AgentError, AgentState, RunPhase, ToolboxError};
pub use llm::{LlmEngine, OpenAiEngine, ScriptedLlm};
pub use memory::{Message, Role, StepLog};
pub use tools::{BaseToolset, CodeEvaluator, Tool, ToolArgs, Toolbox};
