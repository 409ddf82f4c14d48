//! 认知层：动作解析与 Prompt 模板

pub mod parser;
pub mod prompts;

pub use parser::{
    extract_action, parse_code_blob, parse_json_blob, parse_json_tool_call, parse_text_tool_call,
    ToolParser,
};
pub use prompts::{
    authorized_imports, format_prompt_with_imports, format_prompt_with_tools, LIST_SAFE_MODULES,
};
