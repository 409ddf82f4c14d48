//! CodeAgent：单次生成、单次执行
//!
//! 一次 run：初始化 → 以 (system, task) 两条消息调用模型（停止于 `<end_action>`）→
//! 按 `Code:` 切分（缺失时把整段输出当作代码）→ 提取围栏代码块 → 交给 CodeEvaluator 执行。
//! 生成、解析、执行失败都作为 RunOutput::Failed 返回，只有配置错误才返回 Err。

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::agent::core::{AgentCore, END_ACTION};
use crate::config::AgentSettings;
use crate::core::{AgentError, AgentState, RunPhase, PRINT_OUTPUTS_KEY};
use crate::llm::LlmEngine;
use crate::memory::{ActionStep, Message, ToolCall};
use crate::react::prompts::DEFAULT_CODE_SYSTEM_PROMPT;
use crate::react::{extract_action, parse_code_blob};
use crate::tools::{value_to_text, BaseToolset, CodeEvaluator, ToolMap, Toolbox};

/// 单次 run 的结果
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutput {
    /// 只生成不执行时的原始模型输出
    GeneratedCode(String),
    /// 代码最后一个表达式的值
    Value(Value),
    /// 可读的失败说明（生成、解析或执行）
    Failed(String),
}

impl RunOutput {
    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutput::Failed(_))
    }
}

impl fmt::Display for RunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutput::GeneratedCode(s) | RunOutput::Failed(s) => f.write_str(s),
            RunOutput::Value(v) => f.write_str(&value_to_text(v)),
        }
    }
}

pub struct CodeAgent {
    core: AgentCore,
    evaluator: Arc<dyn CodeEvaluator>,
    /// 始终可用的执行原语（与工具箱合并后作为静态工具）
    primitives: ToolMap,
}

impl CodeAgent {
    pub fn new(
        llm: Arc<dyn LlmEngine>,
        toolbox: Toolbox,
        evaluator: Arc<dyn CodeEvaluator>,
    ) -> Result<Self, AgentError> {
        let core = AgentCore::new(llm, toolbox, DEFAULT_CODE_SYSTEM_PROMPT)?.with_authorized_imports(&[]);
        core.render_system_prompt()?;
        Ok(Self {
            core,
            evaluator,
            primitives: ToolMap::new(),
        })
    }

    pub fn with_settings(mut self, settings: &AgentSettings) -> Self {
        self.core = self.core.with_settings(settings);
        self
    }

    pub fn with_additional_authorized_imports(mut self, additional: &[String]) -> Self {
        self.core = self.core.with_authorized_imports(additional);
        self
    }

    /// 替换 system prompt 模板；模板必须含 `<<authorized_imports>>`
    pub fn with_system_prompt(mut self, template: impl Into<String>) -> Result<Self, AgentError> {
        self.core.set_system_prompt_template(template)?;
        Ok(self)
    }

    pub fn with_primitives(mut self, primitives: ToolMap) -> Self {
        self.primitives = primitives;
        self
    }

    /// 加入基础工具集（不含代码解释器）
    pub fn with_base_tools(mut self, base: &BaseToolset) -> Result<Self, AgentError> {
        self.core.add_base_tools(base, false)?;
        Ok(self)
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    /// 生成并执行代码
    pub async fn run(&mut self, task: &str, kwargs: AgentState) -> Result<RunOutput, AgentError> {
        self.run_inner(task, kwargs, false).await
    }

    /// 只生成，返回原始模型输出
    pub async fn generate_code(&mut self, task: &str, kwargs: AgentState) -> Result<RunOutput, AgentError> {
        self.run_inner(task, kwargs, true).await
    }

    async fn run_inner(
        &mut self,
        task: &str,
        kwargs: AgentState,
        return_generated_code: bool,
    ) -> Result<RunOutput, AgentError> {
        self.core.initialize_for_run(task, kwargs)?;

        let prompt = vec![
            Message::system(self.core.system_prompt()),
            Message::user(format!("Task: {}", self.core.task())),
        ];
        tracing::info!(messages = prompt.len(), "executing with prompt");
        self.core.advance(RunPhase::Prompted)?;

        let mut step = ActionStep::new(0);
        let llm_output = match self.core.generate(&prompt, &[END_ACTION]).await {
            Ok(output) => output,
            Err(e) => return self.fail(step, e),
        };
        step.llm_output = Some(llm_output.clone());

        if return_generated_code {
            self.core.advance(RunPhase::Done)?;
            self.core.push_step(step);
            return Ok(RunOutput::GeneratedCode(llm_output));
        }

        let code_action = match extract_action(&llm_output, "Code:") {
            Ok((_, action)) => action,
            Err(e) => {
                tracing::debug!(error = %e, "no 'Code:' marker, parsing the whole output as code");
                llm_output.clone()
            }
        };

        let code = match parse_code_blob(&code_action) {
            Ok(code) => code,
            Err(e) => {
                let msg = format!("Error in code parsing: {e}. Be sure to provide correct code");
                return self.fail(step, AgentError::Parsing(msg));
            }
        };
        step.tool_call = Some(ToolCall::code(code.clone()));
        self.core.advance(RunPhase::Parsed)?;

        tracing::info!(code = %code, "executing code");
        let static_tools = self.core.callable_tools(&self.primitives);
        let imports = self.core.authorized_imports().to_vec();
        let mut custom_tools = ToolMap::new();
        let state = self.core.state_mut();
        state.insert(PRINT_OUTPUTS_KEY.to_string(), Value::String(String::new()));

        match self
            .evaluator
            .evaluate(&code, &static_tools, &mut custom_tools, state, &imports)
            .await
        {
            Ok(output) => {
                self.core.advance(RunPhase::Executed)?;
                if let Some(prints) = self.core.state().get(PRINT_OUTPUTS_KEY) {
                    tracing::info!(print_outputs = %value_to_text(prints), "print outputs");
                }
                step.set_observation(value_to_text(&output));
                self.core.advance(RunPhase::Done)?;
                self.core.push_step(step);
                Ok(RunOutput::Value(output))
            }
            Err(e) => {
                let msg = format!("Error in execution: {e}. Be sure to provide correct code.");
                self.fail(step, AgentError::Execution(msg))
            }
        }
    }

    fn fail(&mut self, mut step: ActionStep, error: AgentError) -> Result<RunOutput, AgentError> {
        tracing::error!(kind = error.kind(), error = %error, "run failed");
        let msg = error.message().to_string();
        step.set_error(error);
        self.core.advance(RunPhase::Failed)?;
        self.core.push_step(step);
        Ok(RunOutput::Failed(msg))
    }
}
