//! 工具执行器
//!
//! execute(toolbox, tool_name, args, state)：查找工具 → 用共享状态解引用参数 → 按输入 schema 校验 →
//! 在超时内调用。任何失败都包装成 AgentError::Execution，并附上工具描述，便于模型下一轮自我纠正。
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::{AgentError, AgentState};
use crate::tools::description::describe_tool;
use crate::tools::{Tool, ToolArgs, Toolbox};

/// 工具执行器：对每次调用施加超时，并将失败映射为 AgentError::Execution
#[derive(Clone, Debug)]
pub struct ToolExecutor {
    timeout: Duration,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new(30)
    }
}

impl ToolExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 执行指定工具；参数中的字符串若是 state 的键，则替换为对应的值
    pub async fn execute(
        &self,
        toolbox: &Toolbox,
        tool_name: &str,
        arguments: ToolArgs,
        state: &AgentState,
    ) -> Result<Value, AgentError> {
        let Some(tool) = toolbox.get(tool_name) else {
            let msg = format!(
                "Error: unknown tool {tool_name}, should be instead one of {:?}.",
                toolbox.tool_names()
            );
            tracing::error!(tool = %tool_name, "{msg}");
            return Err(AgentError::Execution(msg));
        };

        let start = Instant::now();
        let args_preview = args_preview(&arguments);
        let result = self.invoke(tool.as_ref(), arguments, state).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(InvokeError::Timeout) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        result.map_err(|e| {
            AgentError::Execution(format!(
                "Error in tool call execution: {}\nYou should only use this tool with a correct input.\n\
                 As a reminder, this tool's description is the following:\n{}",
                e.describe(self.timeout),
                describe_tool(tool.as_ref(), None)
            ))
        })
    }

    async fn invoke(
        &self,
        tool: &dyn Tool,
        arguments: ToolArgs,
        state: &AgentState,
    ) -> Result<Value, InvokeError> {
        let resolved = match arguments {
            ToolArgs::Raw(s) => ToolArgs::Raw(s),
            ToolArgs::Named(map) => {
                let map = resolve_state_variables(map, state);
                check_arguments(tool, &map).map_err(InvokeError::Arguments)?;
                ToolArgs::Named(map)
            }
        };
        timeout(self.timeout, tool.execute(resolved))
            .await
            .map_err(|_| InvokeError::Timeout)?
            .map_err(InvokeError::Tool)
    }
}

enum InvokeError {
    Arguments(String),
    Tool(String),
    Timeout,
}

impl InvokeError {
    fn describe(&self, limit: Duration) -> String {
        match self {
            InvokeError::Arguments(m) | InvokeError::Tool(m) => m.clone(),
            InvokeError::Timeout => format!("tool call timed out after {}s", limit.as_secs()),
        }
    }
}

/// 字符串参数若恰好是 state 中的变量名，替换为变量值
pub fn resolve_state_variables(args: Map<String, Value>, state: &AgentState) -> Map<String, Value> {
    args.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(name) => match state.get(&name) {
                    Some(stored) => stored.clone(),
                    None => Value::String(name),
                },
                other => other,
            };
            (key, value)
        })
        .collect()
}

/// 按声明的输入 schema 校验具名参数；schema 为空时不校验
fn check_arguments(tool: &dyn Tool, args: &Map<String, Value>) -> Result<(), String> {
    let inputs = tool.inputs();
    if inputs.is_empty() {
        return Ok(());
    }
    if let Some(unknown) = args.keys().find(|k| !inputs.contains_key(*k)) {
        return Err(format!(
            "unexpected argument '{unknown}', expected arguments are {:?}",
            inputs.keys().collect::<Vec<_>>()
        ));
    }
    if let Some((missing, _)) = inputs
        .iter()
        .find(|(name, spec)| !spec.optional && !args.contains_key(*name))
    {
        return Err(format!("missing required argument '{missing}'"));
    }
    Ok(())
}

fn args_preview(args: &ToolArgs) -> String {
    let s = serde_json::to_string(args).unwrap_or_default();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
