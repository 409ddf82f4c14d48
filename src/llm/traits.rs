//! 模型引擎抽象
//!
//! 所有后端（OpenAI 兼容 / Scripted Mock）实现 LlmEngine：按角色消息序列 + 停止标记，同步返回生成文本。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 引擎调用失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// 模型引擎 trait
#[async_trait]
pub trait LlmEngine: Send + Sync {
    async fn complete(&self, messages: &[Message], stop_sequences: &[String]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 在第一个出现的停止标记处截断（不支持服务端 stop 的后端用）
pub fn truncate_at_stop(text: &str, stop_sequences: &[String]) -> String {
    let cut = stop_sequences
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
        .unwrap_or(text.len());
    text[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_at_earliest_stop() {
        let stops = vec!["<end_action>".to_string(), "Observation:".to_string()];
        assert_eq!(
            truncate_at_stop("Action: x\nObservation: y<end_action>", &stops),
            "Action: x\n"
        );
        assert_eq!(truncate_at_stop("plain", &stops), "plain");
    }
}
