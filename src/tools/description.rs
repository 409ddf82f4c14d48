//! 工具描述渲染
//!
//! 模板中的 {{name}} / {{description}} / {{inputs}} / {{output_type}} 按工具替换。

use crate::tools::{Tool, ToolEntry, ToolInputs};

pub const DEFAULT_TOOL_DESCRIPTION_TEMPLATE: &str = "- {{name}}: {{description}}\n    Takes inputs: {{inputs}}\n    Returns an output of type: {{output_type}}\n";

fn render(name: &str, description: &str, inputs: &ToolInputs, output_type: &str, template: &str) -> String {
    let inputs = serde_json::to_string(inputs).unwrap_or_else(|_| "{}".to_string());
    template
        .replace("{{name}}", name)
        .replace("{{description}}", description)
        .replace("{{inputs}}", &inputs)
        .replace("{{output_type}}", output_type)
}

/// 渲染单个工具；template 为 None 时用默认模板
pub fn describe_tool(tool: &dyn Tool, template: Option<&str>) -> String {
    render(
        tool.name(),
        tool.description(),
        &tool.inputs(),
        tool.output_type(),
        template.unwrap_or(DEFAULT_TOOL_DESCRIPTION_TEMPLATE),
    )
}

pub(crate) fn describe_entry(entry: &ToolEntry, template: &str) -> String {
    render(
        entry.name(),
        entry.description(),
        &entry.inputs(),
        entry.output_type(),
        template,
    )
}
