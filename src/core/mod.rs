//! 核心层：错误分类与运行状态

pub mod error;
pub mod state;

pub use error::{AgentError, ToolboxError};
pub use state::{AgentState, RunPhase, RunTracker, PRINT_OUTPUTS_KEY};
