//! 动作解析：把模型输出解析为工具调用或代码
//!
//! 三种互相独立的策略：JSON action blob、`Action:` / `Action input:` 文本、围栏代码块。
//! 输入尽量宽容，失败时报错具体且可操作：错误文本会作为下一轮的观察喂回模型。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::memory::ToolCall;
use crate::tools::ToolArgs;

/// 代码块正则（不含 (?s) 标志）；错误信息里原样回显
pub const CODE_BLOCK_PATTERN: &str = r"```(?:py|python)?\n(.*?)\n```";

static CODE_BLOCK_RE: OnceLock<Regex> = OnceLock::new();

const MULTIPLE_TOOL_CALLS: &str =
    "JSON is invalid: you probably tried to provide multiple tool calls in one action. PROVIDE ONLY ONE TOOL CALL.";

/// 工具调用解析策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToolParser {
    /// `{"action": ..., "action_input": ...}`
    #[default]
    Json,
    /// `Action: name` / `Action input: ...`
    Text,
}

impl ToolParser {
    pub fn parse(self, text: &str) -> Result<ToolCall, AgentError> {
        match self {
            ToolParser::Json => parse_json_tool_call(text),
            ToolParser::Text => parse_text_tool_call(text),
        }
    }
}

/// 按分隔标记切分模型输出，取最后两段作为 (rationale, action)
pub fn extract_action(llm_output: &str, split_token: &str) -> Result<(String, String), AgentError> {
    let parts: Vec<&str> = llm_output.split(split_token).collect();
    if parts.len() < 2 {
        return Err(AgentError::Parsing(format!(
            "Error: No '{split_token}' token provided in your output.\nYour output:\n{llm_output}\n. \
             Be sure to include an action, prefaced with '{split_token}'!"
        )));
    }
    let n = parts.len();
    Ok((parts[n - 2].to_string(), parts[n - 1].to_string()))
}

/// 截取第一个 `{` 到最后一个 `}` 之间的内容，解码其中第一个 JSON 对象
pub fn parse_json_blob(json_blob: &str) -> Result<Map<String, Value>, AgentError> {
    let span = match (json_blob.find('{'), json_blob.rfind('}')) {
        (Some(first), Some(last)) if first < last => &json_blob[first..=last],
        _ => {
            return Err(AgentError::Parsing(format!(
                "Error in parsing the JSON blob: no JSON object found in: {json_blob}"
            )))
        }
    };
    let blob = escape_control_characters(&span.replace("\\\"", "'"));

    let mut stream = serde_json::Deserializer::from_str(&blob).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => {
            // 第一个对象之后的内容忽略，紧跟逗号说明模型一次给了多个调用
            let end = stream.byte_offset();
            if blob[end..].trim_start().starts_with(',') {
                return Err(AgentError::Parsing(MULTIPLE_TOOL_CALLS.to_string()));
            }
            match value {
                Value::Object(map) => Ok(map),
                other => Err(AgentError::Parsing(format!(
                    "Error in parsing the JSON blob: expected a JSON object, got {other}"
                ))),
            }
        }
        Some(Err(e)) => Err(decode_failure(&blob, error_offset(&blob, &e), &e.to_string())),
        None => Err(AgentError::Parsing(format!(
            "Error in parsing the JSON blob: empty blob {blob}"
        ))),
    }
}

fn decode_failure(blob: &str, pos: usize, reason: &str) -> AgentError {
    if blob
        .get(pos.saturating_sub(1)..)
        .is_some_and(|rest| rest.starts_with("},"))
    {
        return AgentError::Parsing(MULTIPLE_TOOL_CALLS.to_string());
    }
    AgentError::Parsing(format!(
        "The JSON blob you used is invalid due to the following error: {reason}.\n\
         JSON blob was: {blob}, decoding failed on that specific part of the blob:\n'{}'.",
        context_window(blob, pos)
    ))
}

/// serde_json 报告 1 起的行列号，换算成字节偏移
fn error_offset(blob: &str, e: &serde_json::Error) -> usize {
    let line_start: usize = blob
        .split('\n')
        .take(e.line().saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    (line_start + e.column().saturating_sub(1)).min(blob.len())
}

fn context_window(s: &str, pos: usize) -> &str {
    let mut start = pos.saturating_sub(4).min(s.len());
    let mut end = (pos + 5).min(s.len());
    while !s.is_char_boundary(start) {
        start -= 1;
    }
    while !s.is_char_boundary(end) {
        end += 1;
    }
    &s[start..end]
}

/// 字符串字面量内的原始控制字符转义（宽松解码）
fn escape_control_characters(blob: &str) -> String {
    let mut out = String::with_capacity(blob.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in blob.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// 解析 JSON action blob（允许 ```json 围栏）
pub fn parse_json_tool_call(json_blob: &str) -> Result<ToolCall, AgentError> {
    let cleaned = json_blob.replace("```json", "").replace("```", "");
    let mut tool_call = parse_json_blob(&cleaned)?;
    let Some(action) = tool_call.remove("action") else {
        let missing: Vec<&str> = ["action", "action_input"]
            .into_iter()
            .filter(|k| !tool_call.contains_key(*k))
            .collect();
        return Err(AgentError::Parsing(format!(
            "Missing keys: {missing:?} in blob {}",
            Value::Object(tool_call)
        )));
    };
    let tool_name = match action {
        Value::String(s) => s,
        other => other.to_string(),
    };
    let arguments = tool_call
        .remove("action_input")
        .map(ToolArgs::from)
        .unwrap_or_else(ToolArgs::empty);
    Ok(ToolCall::new(tool_name, arguments))
}

/// 解析 `Action:` / `Action input:` 文本；在第一个 `Observation:` 处截断
pub fn parse_text_tool_call(text: &str) -> Result<ToolCall, AgentError> {
    split_text_tool_call(text).map_err(|e| {
        AgentError::Parsing(format!(
            "Error in parsing the text tool call: {e}. Be sure to provide the correct format. \
             DO NOT repeat your previous incorrect tool call."
        ))
    })
}

fn split_text_tool_call(text: &str) -> Result<ToolCall, String> {
    let mut text = text;
    if let Some(idx) = text.find("Observation:") {
        text = &text[..idx];
    }
    if let Some(idx) = text.rfind("Action:") {
        text = &text[idx + "Action:".len()..];
    }
    let parts: Vec<&str> = text.split("Action input:").collect();
    let [tool_name, tool_input] = parts.as_slice() else {
        return Err(format!(
            "expected exactly one 'Action input:' marker, found {}",
            parts.len() - 1
        ));
    };
    let arguments = if tool_input.contains('{') {
        ToolArgs::Named(parse_json_blob(tool_input).map_err(|e| e.to_string())?)
    } else {
        ToolArgs::Raw(tool_input.trim().replace('"', ""))
    };
    let tool_name = tool_name.trim().replace(['"', '\\'], "");
    if tool_name.is_empty() {
        return Err("no tool name found before 'Action input:'".to_string());
    }
    Ok(ToolCall::new(tool_name, arguments))
}

/// 提取 py / python（或无标记）围栏代码块的内容
pub fn parse_code_blob(code_blob: &str) -> Result<String, AgentError> {
    let re = CODE_BLOCK_RE
        .get_or_init(|| Regex::new(&format!("(?s){CODE_BLOCK_PATTERN}")).unwrap());
    re.captures(code_blob)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| {
            AgentError::Parsing(format!(
                "\nThe code blob you used is invalid: no fenced code block was found.\n\
                 This means that the regex pattern {CODE_BLOCK_PATTERN} was not respected: \
                 make sure to include code with the correct pattern, for instance:\n\
                 Thoughts: Your thoughts\nCode:\n```py\n# Your python code here\n```<end_action>"
            ))
        })
}
