//! Step log：一次 run 的逐步记录
//!
//! 第 0 条固定为初始化记录（system prompt + task），之后每轮迭代追加一条 ActionStep。
//! 只追加、只向前扫描；是重建对话上下文的唯一依据。

use serde::Serialize;

use crate::core::AgentError;
use crate::memory::Message;
use crate::tools::ToolArgs;

/// 代码类 Agent 记录 tool_call 时使用的工具名
pub const CODE_INTERPRETER_CALL: &str = "code interpreter";

/// 一次工具调用（或代码执行）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub tool_arguments: ToolArgs,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, tool_arguments: ToolArgs) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_arguments,
        }
    }

    pub fn code(code: impl Into<String>) -> Self {
        Self::new(CODE_INTERPRETER_CALL, ToolArgs::Raw(code.into()))
    }
}

impl std::fmt::Display for ToolCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered = serde_json::to_string(self).unwrap_or_else(|_| self.tool_name.clone());
        f.write_str(&rendered)
    }
}

/// 一步的执行结果：成功得到观察，或失败得到错误，二者互斥
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Observation(String),
    Error(AgentError),
}

/// 第 0 条记录
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InitializationStep {
    pub system_prompt: String,
    pub task: String,
}

/// 迭代记录：各字段均可缺省
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ActionStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// 运行中途追加的新任务
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
    /// memory_verbose 时保存本步使用的上下文
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_memory: Option<Vec<Message>>,
}

impl ActionStep {
    pub fn new(iteration: usize) -> Self {
        Self {
            iteration: Some(iteration),
            ..Self::default()
        }
    }

    pub fn observation(&self) -> Option<&str> {
        match &self.outcome {
            Some(StepOutcome::Observation(o)) => Some(o),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AgentError> {
        match &self.outcome {
            Some(StepOutcome::Error(e)) => Some(e),
            _ => None,
        }
    }

    pub fn set_observation(&mut self, observation: impl Into<String>) {
        self.outcome = Some(StepOutcome::Observation(observation.into()));
    }

    pub fn set_error(&mut self, error: AgentError) {
        self.outcome = Some(StepOutcome::Error(error));
    }
}

/// 对外展示用的记录视图
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepRecord {
    Initialization(InitializationStep),
    Action(ActionStep),
}

/// 逐步记录
#[derive(Clone, Debug, PartialEq)]
pub struct StepLog {
    initialization: InitializationStep,
    steps: Vec<ActionStep>,
}

impl StepLog {
    pub fn new(system_prompt: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            initialization: InitializationStep {
                system_prompt: system_prompt.into(),
                task: task.into(),
            },
            steps: Vec::new(),
        }
    }

    pub fn initialization(&self) -> &InitializationStep {
        &self.initialization
    }

    /// 初始化记录之后的所有步
    pub fn steps(&self) -> &[ActionStep] {
        &self.steps
    }

    pub fn push(&mut self, step: ActionStep) {
        self.steps.push(step);
    }

    pub fn last_step(&self) -> Option<&ActionStep> {
        self.steps.last()
    }

    /// 记录总数（含初始化记录）
    pub fn len(&self) -> usize {
        self.steps.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn records(&self) -> Vec<StepRecord> {
        std::iter::once(StepRecord::Initialization(self.initialization.clone()))
            .chain(self.steps.iter().cloned().map(StepRecord::Action))
            .collect()
    }

    /// 去掉每步的 agent_memory 快照
    pub fn succinct(&self) -> Vec<StepRecord> {
        self.records()
            .into_iter()
            .map(|r| match r {
                StepRecord::Action(mut step) => {
                    step.agent_memory = None;
                    StepRecord::Action(step)
                }
                init => init,
            })
            .collect()
    }
}

impl Default for StepLog {
    fn default() -> Self {
        Self::new(String::new(), String::new())
    }
}
