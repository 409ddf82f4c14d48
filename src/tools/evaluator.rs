//! 代码执行边界
//!
//! 沙箱本身在本 crate 之外；CodeEvaluator 约定：接收代码、静态可用工具、动态可用工具、
//! 可变共享状态与允许导入的模块名，返回最后一个表达式的值，并把打印输出写入 state 的 print_outputs。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentState;
use crate::tools::Tool;

/// 名称 -> 可调用工具
pub type ToolMap = HashMap<String, Arc<dyn Tool>>;

/// 受限代码执行环境
#[async_trait]
pub trait CodeEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        code: &str,
        static_tools: &ToolMap,
        custom_tools: &mut ToolMap,
        state: &mut AgentState,
        authorized_imports: &[String],
    ) -> Result<Value, String>;
}
