//! final_answer 工具：调用即表示任务完成，输出即输入

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{InputSpec, Tool, ToolArgs, ToolInputs};

pub const FINAL_ANSWER: &str = "final_answer";

/// 最终答案工具（每个 Agent 构造时自动加入工具箱）
#[derive(Debug, Default)]
pub struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        FINAL_ANSWER
    }

    fn description(&self) -> &str {
        "Provides a final answer to the given problem."
    }

    fn inputs(&self) -> ToolInputs {
        ToolInputs::from([(
            "answer".to_string(),
            InputSpec::new("any", "The final answer to the problem"),
        )])
    }

    fn output_type(&self) -> &str {
        "any"
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value, String> {
        match args {
            ToolArgs::Raw(s) => Ok(Value::String(s)),
            ToolArgs::Named(mut map) => map
                .remove("answer")
                .ok_or_else(|| "missing argument 'answer'".to_string()),
        }
    }
}
