//! 模型引擎层：抽象与实现（OpenAI 兼容 / Scripted Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{RecordedCall, ScriptedLlm};
pub use openai::{OpenAiEngine, TokenUsage};
pub use traits::{truncate_at_stop, LlmEngine, LlmError};
