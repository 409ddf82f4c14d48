//! Agent 层：共享运行骨架、单次代码 Agent、多步 ReAct Agent

pub mod code;
pub mod core;
pub mod react;

pub use self::code::{CodeAgent, RunOutput};
pub use self::core::{AgentCore, END_ACTION, END_PLAN};
pub use self::react::{drive, ReactCodeAgent, ReactJsonAgent, ReactStep};
