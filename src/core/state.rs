//! 单次任务运行的状态：阶段状态机与共享变量表
//!
//! 阶段表示「当前正在进行的环节」：Idle → Initialized → Prompted → Parsed → Executed → Done，
//! 解析或执行失败进入 Failed。多步 Agent 每轮迭代从 Parsed/Executed 回到 Prompted。

use std::collections::HashMap;

use serde::Serialize;

use crate::core::AgentError;

/// 共享状态：变量名 -> 任意值，随每次 run 重建
pub type AgentState = HashMap<String, serde_json::Value>;

/// 代码执行时打印输出写入 state 的保留键
pub const PRINT_OUTPUTS_KEY: &str = "print_outputs";

/// 运行阶段
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    #[default]
    Idle,
    Initialized,
    Prompted,
    Parsed,
    Executed,
    Done,
    Failed,
}

impl RunPhase {
    /// 是否允许从 self 迁移到 next
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            // 新的 run 可以从任何阶段开始
            (_, Initialized) => true,
            (Initialized, Prompted) => true,
            (Prompted, Parsed) | (Prompted, Done) => true,
            (Parsed, Executed) | (Parsed, Failed) => true,
            (Executed, Done) | (Executed, Failed) => true,
            // 多步循环：下一轮迭代重新 Prompt；生成失败或步数耗尽时直接失败
            (Prompted | Parsed | Executed, Prompted) => true,
            (Initialized | Prompted, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }
}

/// 阶段跟踪器：非法迁移属于编程错误，返回 Config 错误
#[derive(Clone, Debug, Default)]
pub struct RunTracker {
    phase: RunPhase,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn advance(&mut self, next: RunPhase) -> Result<(), AgentError> {
        if !self.phase.can_advance_to(next) {
            return Err(AgentError::Config(format!(
                "Illegal run phase transition: {:?} -> {:?}",
                self.phase, next
            )));
        }
        tracing::trace!(from = ?self.phase, to = ?next, "run phase");
        self.phase = next;
        Ok(())
    }
}
