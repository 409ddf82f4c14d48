pub mod base;
pub mod description;
pub mod evaluator;
pub mod executor;
pub mod final_answer;
pub mod loader;
pub mod registry;
pub mod schema;

pub use base::{BaseToolset, PYTHON_INTERPRETER};
pub use description::{describe_tool, DEFAULT_TOOL_DESCRIPTION_TEMPLATE};
pub use evaluator::{CodeEvaluator, ToolMap};
pub use executor::{resolve_state_variables, ToolExecutor};
pub use final_answer::{FinalAnswerTool, FINAL_ANSWER};
pub use loader::{TaskToolLoader, ToolFactory, ToolLoader};
pub use registry::{
    value_to_text, InputSpec, Tool, ToolArgs, ToolEntry, ToolInputs, ToolReference, Toolbox,
};
pub use schema::action_schema_json;
