//! Scripted LLM 引擎（用于测试，无需 API）
//!
//! 按顺序回放预设输出，并记录每次调用收到的消息与停止标记；输出按停止标记截断，行为与真实后端一致。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::traits::truncate_at_stop;
use crate::llm::{LlmEngine, LlmError};
use crate::memory::Message;

/// 一次被记录的调用
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub stop_sequences: Vec<String>,
}

/// 回放预设输出的引擎
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    outputs: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outputs: Mutex::new(outputs.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.outputs.lock().map(|o| o.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmEngine for ScriptedLlm {
    async fn complete(&self, messages: &[Message], stop_sequences: &[String]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                stop_sequences: stop_sequences.to_vec(),
            });
        }
        let next = self
            .outputs
            .lock()
            .map_err(|e| LlmError::Request(e.to_string()))?
            .pop_front()
            .ok_or_else(|| LlmError::Request("scripted outputs exhausted".to_string()))?;
        Ok(truncate_at_stop(&next, stop_sequences))
    }
}
