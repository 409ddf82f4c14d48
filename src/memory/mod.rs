//! 记忆层：消息、step log、对话重建

pub mod conversation;
pub mod step_log;
pub mod transcript;

pub use conversation::{to_text, Message, Role};
pub use step_log::{
    ActionStep, InitializationStep, StepLog, StepOutcome, StepRecord, ToolCall,
    CODE_INTERPRETER_CALL,
};
pub use transcript::{write_inner_memory, TranscriptMode};
