//! 动作 JSON Schema 生成（schemars 自动生成）
//!
//! 用于将「合法 action blob」的 JSON 结构注入 system prompt，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};

/// JSON 动作格式：与 parse_json_tool_call 解析的 `{"action": "...", "action_input": ...}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionBlob {
    /// 工具名，必须是可用工具之一，完成任务时为 final_answer
    pub action: String,
    /// 工具参数：按工具输入命名的对象，或单个字符串
    pub action_input: Option<serde_json::Value>,
}

/// 返回动作 blob 的 JSON Schema 字符串，可拼入 system prompt
pub fn action_schema_json() -> String {
    let schema = schema_for!(ActionBlob);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_requires_action() {
        let schema: serde_json::Value = serde_json::from_str(&action_schema_json()).unwrap();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "action"));
        assert!(schema["properties"].get("action_input").is_some());
    }
}
