//! 多步 ReAct Agent：ReactJsonAgent（JSON / 文本工具调用）与 ReactCodeAgent（代码动作）
//!
//! 每轮：（按间隔插入规划步）→ 由 step log 重建对话 → 调用模型 → 解析动作 → 执行 → 记录。
//! 单步中的解析 / 执行 / 生成错误写入该步的 error，循环继续；得到最终答案即结束；
//! 步数耗尽时追加一条 MaxIterations 记录并返回 Err。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::core::{AgentCore, END_ACTION};
use crate::config::AgentSettings;
use crate::core::{AgentError, AgentState, RunPhase, PRINT_OUTPUTS_KEY};
use crate::llm::LlmEngine;
use crate::memory::{ActionStep, ToolCall, TranscriptMode};
use crate::react::prompts::{DEFAULT_REACT_CODE_SYSTEM_PROMPT, DEFAULT_REACT_JSON_SYSTEM_PROMPT};
use crate::react::{extract_action, parse_code_blob, ToolParser};
use crate::tools::{value_to_text, BaseToolset, CodeEvaluator, ToolArgs, ToolMap, Toolbox, FINAL_ANSWER};

const OBSERVATION_MARKER: &str = "Observation:";

/// 单步执行接口；循环本身由 drive 统一驱动
#[async_trait]
pub trait ReactStep: Send {
    fn core(&self) -> &AgentCore;

    fn core_mut(&mut self) -> &mut AgentCore;

    /// 执行一步并填充 step；返回 Some 表示得到最终答案
    async fn step(&mut self, step: &mut ActionStep) -> Result<Option<Value>, AgentError>;
}

/// 驱动多步循环；reset 为 false 时在已有历史上追加新任务继续
pub async fn drive<A: ReactStep + ?Sized>(
    agent: &mut A,
    task: &str,
    kwargs: AgentState,
    reset: bool,
) -> Result<Value, AgentError> {
    if reset {
        agent.core_mut().initialize_for_run(task, kwargs)?;
    } else {
        agent.core_mut().state_mut().extend(kwargs);
        agent.core_mut().continue_run(task)?;
    }

    let max_iterations = agent.core().max_iterations();
    let mut iteration = 0;
    let mut final_answer = None;

    while final_answer.is_none() && iteration < max_iterations {
        if let Some(interval) = agent.core().planning_interval() {
            if iteration % interval == 0 {
                if let Err(e) = agent.core_mut().planning_step(iteration == 0, iteration).await {
                    tracing::error!(error = %e, "planning step failed");
                    agent.core_mut().advance(RunPhase::Failed)?;
                    return Err(e);
                }
            }
        }

        agent.core_mut().advance(RunPhase::Prompted)?;
        let mut step = ActionStep::new(iteration);
        match agent.step(&mut step).await {
            Ok(answer) => final_answer = answer,
            Err(e) => {
                tracing::error!(iteration, kind = e.kind(), error = %e, "step failed");
                step.set_error(e);
            }
        }
        agent.core_mut().push_step(step);
        iteration += 1;
    }

    match final_answer {
        Some(answer) => {
            agent.core_mut().advance(RunPhase::Done)?;
            tracing::info!(answer = %value_to_text(&answer), "final answer");
            Ok(answer)
        }
        None => {
            let error = AgentError::MaxIterations("Reached max iterations.".to_string());
            tracing::error!(max_iterations, "{error}");
            let mut record = ActionStep::default();
            record.set_error(error.clone());
            let core = agent.core_mut();
            core.push_step(record);
            core.advance(RunPhase::Failed)?;
            Err(error)
        }
    }
}

/// 重建对话（memory_verbose 时保存快照）并调用模型
async fn prompt_model(core: &AgentCore, step: &mut ActionStep) -> Result<String, AgentError> {
    let memory = core.write_inner_memory_from_logs(TranscriptMode::Full);
    if core.memory_verbose() {
        step.agent_memory = Some(memory.clone());
    }
    let output = core.generate(&memory, &[END_ACTION, OBSERVATION_MARKER]).await?;
    tracing::debug!(llm_output = %output, "llm output");
    step.llm_output = Some(output.clone());
    Ok(output)
}

/// 以 JSON（或文本）工具调用行动的多步 Agent
pub struct ReactJsonAgent {
    core: AgentCore,
    tool_parser: ToolParser,
}

impl ReactJsonAgent {
    pub fn new(llm: Arc<dyn LlmEngine>, toolbox: Toolbox) -> Result<Self, AgentError> {
        Ok(Self {
            core: AgentCore::new(llm, toolbox, DEFAULT_REACT_JSON_SYSTEM_PROMPT)?,
            tool_parser: ToolParser::Json,
        })
    }

    pub fn with_settings(mut self, settings: &AgentSettings) -> Self {
        self.core = self.core.with_settings(settings);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.core = self.core.with_max_iterations(max_iterations);
        self
    }

    pub fn with_planning_interval(mut self, interval: Option<usize>) -> Self {
        self.core = self.core.with_planning_interval(interval);
        self
    }

    pub fn with_memory_verbose(mut self, memory_verbose: bool) -> Self {
        self.core = self.core.with_memory_verbose(memory_verbose);
        self
    }

    pub fn with_tool_parser(mut self, parser: ToolParser) -> Self {
        self.tool_parser = parser;
        self
    }

    pub fn with_system_prompt(mut self, template: impl Into<String>) -> Result<Self, AgentError> {
        self.core.set_system_prompt_template(template)?;
        Ok(self)
    }

    /// 加入基础工具集（含代码解释器）
    pub fn with_base_tools(mut self, base: &BaseToolset) -> Result<Self, AgentError> {
        self.core.add_base_tools(base, true)?;
        Ok(self)
    }

    pub async fn run(&mut self, task: &str, kwargs: AgentState) -> Result<Value, AgentError> {
        drive(self, task, kwargs, true).await
    }

    /// 保留历史与 state，追加新任务继续
    pub async fn continue_with(&mut self, task: &str, kwargs: AgentState) -> Result<Value, AgentError> {
        drive(self, task, kwargs, false).await
    }

    /// final_answer 的 answer 若是 state 中的变量名，取变量值
    fn resolve_final_answer(&self, arguments: &ToolArgs) -> Value {
        match arguments {
            ToolArgs::Named(map) => match map.get("answer") {
                Some(Value::String(name)) => self
                    .core
                    .state()
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| Value::String(name.clone())),
                Some(answer) => answer.clone(),
                None => Value::Object(map.clone()),
            },
            ToolArgs::Raw(s) => Value::String(s.clone()),
        }
    }
}

#[async_trait]
impl ReactStep for ReactJsonAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn step(&mut self, step: &mut ActionStep) -> Result<Option<Value>, AgentError> {
        let output = prompt_model(&self.core, step).await?;

        let (rationale, action) = extract_action(&output, "Action:")?;
        let ToolCall {
            tool_name,
            tool_arguments,
        } = self.tool_parser.parse(&action)?;
        step.tool_call = Some(ToolCall::new(tool_name.clone(), tool_arguments.clone()));
        self.core.advance(RunPhase::Parsed)?;
        tracing::info!(rationale = %rationale.trim(), tool = %tool_name, "calling tool");

        if tool_name == FINAL_ANSWER {
            let answer = self.resolve_final_answer(&tool_arguments);
            self.core.advance(RunPhase::Executed)?;
            return Ok(Some(answer));
        }

        let output_type = self
            .core
            .toolbox()
            .entry(&tool_name)
            .map(|e| e.output_type().to_string());
        let observation = self.core.execute_tool_call(&tool_name, tool_arguments).await?;
        self.core.advance(RunPhase::Executed)?;

        let text = match output_type.as_deref() {
            Some(kind @ ("image" | "audio")) => {
                let key = if kind == "image" { "image.png" } else { "audio.mp3" };
                self.core.state_mut().insert(key.to_string(), observation);
                format!("Stored '{key}' in memory.")
            }
            _ => value_to_text(&observation).trim().to_string(),
        };
        tracing::info!(observation = %text, "observation");
        step.set_observation(text);
        Ok(None)
    }
}

/// 以代码块行动的多步 Agent；state 与自定义函数跨步保留
pub struct ReactCodeAgent {
    core: AgentCore,
    evaluator: Arc<dyn CodeEvaluator>,
    primitives: ToolMap,
    custom_tools: ToolMap,
}

impl ReactCodeAgent {
    pub fn new(
        llm: Arc<dyn LlmEngine>,
        toolbox: Toolbox,
        evaluator: Arc<dyn CodeEvaluator>,
    ) -> Result<Self, AgentError> {
        let core = AgentCore::new(llm, toolbox, DEFAULT_REACT_CODE_SYSTEM_PROMPT)?.with_authorized_imports(&[]);
        core.render_system_prompt()?;
        Ok(Self {
            core,
            evaluator,
            primitives: ToolMap::new(),
            custom_tools: ToolMap::new(),
        })
    }

    pub fn with_settings(mut self, settings: &AgentSettings) -> Self {
        self.core = self.core.with_settings(settings);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.core = self.core.with_max_iterations(max_iterations);
        self
    }

    pub fn with_planning_interval(mut self, interval: Option<usize>) -> Self {
        self.core = self.core.with_planning_interval(interval);
        self
    }

    pub fn with_additional_authorized_imports(mut self, additional: &[String]) -> Self {
        self.core = self.core.with_authorized_imports(additional);
        self
    }

    pub fn with_primitives(mut self, primitives: ToolMap) -> Self {
        self.primitives = primitives;
        self
    }

    pub fn with_system_prompt(mut self, template: impl Into<String>) -> Result<Self, AgentError> {
        self.core.set_system_prompt_template(template)?;
        Ok(self)
    }

    pub fn with_base_tools(mut self, base: &BaseToolset) -> Result<Self, AgentError> {
        self.core.add_base_tools(base, false)?;
        Ok(self)
    }

    pub async fn run(&mut self, task: &str, kwargs: AgentState) -> Result<Value, AgentError> {
        self.custom_tools.clear();
        drive(self, task, kwargs, true).await
    }

    pub async fn continue_with(&mut self, task: &str, kwargs: AgentState) -> Result<Value, AgentError> {
        drive(self, task, kwargs, false).await
    }
}

#[async_trait]
impl ReactStep for ReactCodeAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn step(&mut self, step: &mut ActionStep) -> Result<Option<Value>, AgentError> {
        let output = prompt_model(&self.core, step).await?;

        let (rationale, raw_code) = extract_action(&output, "Code:")?;
        let code = parse_code_blob(&raw_code).map_err(|e| {
            AgentError::Parsing(format!("Error in code parsing: {e}. Make sure to provide correct code"))
        })?;
        step.tool_call = Some(ToolCall::code(code.clone()));
        self.core.advance(RunPhase::Parsed)?;
        tracing::info!(rationale = %rationale.trim(), code = %code, "executing code");

        let static_tools = self.core.callable_tools(&self.primitives);
        let imports = self.core.authorized_imports().to_vec();
        let state = self.core.state_mut();
        state.insert(PRINT_OUTPUTS_KEY.to_string(), Value::String(String::new()));
        let result = self
            .evaluator
            .evaluate(&code, &static_tools, &mut self.custom_tools, state, &imports)
            .await
            .map_err(|e| {
                AgentError::Execution(format!("Code execution failed due to the following error:\n{e}"))
            })?;
        self.core.advance(RunPhase::Executed)?;

        let prints = self
            .core
            .state()
            .get(PRINT_OUTPUTS_KEY)
            .map(value_to_text)
            .unwrap_or_default();
        let mut observation = format!("Print outputs:\n{prints}");
        if !result.is_null() {
            if !observation.ends_with('\n') {
                observation.push('\n');
            }
            observation.push_str(&format!("Last output from code snippet:\n{}", value_to_text(&result)));
        }
        tracing::info!(observation = %observation, "observation");
        step.set_observation(observation);

        if code.lines().any(|line| line.starts_with(FINAL_ANSWER)) {
            return Ok(Some(result));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::tools::{InputSpec, Tool, ToolInputs};
    use serde_json::json;

    struct Adder;

    #[async_trait]
    impl Tool for Adder {
        fn name(&self) -> &str {
            "adder"
        }

        fn description(&self) -> &str {
            "Adds two integers."
        }

        fn inputs(&self) -> ToolInputs {
            ToolInputs::from([
                ("a".to_string(), InputSpec::new("integer", "first")),
                ("b".to_string(), InputSpec::new("integer", "second")),
            ])
        }

        fn output_type(&self) -> &str {
            "integer"
        }

        async fn execute(&self, args: ToolArgs) -> Result<Value, String> {
            let a = args.get("a").and_then(Value::as_i64).ok_or("a must be an integer")?;
            let b = args.get("b").and_then(Value::as_i64).ok_or("b must be an integer")?;
            Ok(json!(a + b))
        }
    }

    struct Painter;

    #[async_trait]
    impl Tool for Painter {
        fn name(&self) -> &str {
            "painter"
        }

        fn description(&self) -> &str {
            "Paints a picture."
        }

        fn output_type(&self) -> &str {
            "image"
        }

        async fn execute(&self, _args: ToolArgs) -> Result<Value, String> {
            Ok(json!({"pixels": [1, 2, 3]}))
        }
    }

    fn json_agent(outputs: Vec<&str>) -> (Arc<ScriptedLlm>, ReactJsonAgent) {
        let llm = Arc::new(ScriptedLlm::new(outputs));
        let toolbox = Toolbox::with_tools([Adder]).unwrap();
        let agent = ReactJsonAgent::new(llm.clone(), toolbox).unwrap();
        (llm, agent)
    }

    #[tokio::test]
    async fn test_tool_then_final_answer() {
        let (llm, mut agent) = json_agent(vec![
            "Thought: add\nAction:\n{\"action\": \"adder\", \"action_input\": {\"a\": 1, \"b\": 2}}<end_action>",
            "Thought: done\nAction:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": \"three\"}}",
        ]);
        let answer = agent.run("add 1 and 2", AgentState::new()).await.unwrap();
        assert_eq!(answer, json!("three"));
        assert_eq!(agent.core().phase(), RunPhase::Done);

        let steps = agent.core().logs().steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].observation(), Some("3"));

        let calls = llm.calls();
        assert_eq!(
            calls[0].stop_sequences,
            vec![END_ACTION.to_string(), OBSERVATION_MARKER.to_string()]
        );
        let last = calls[1].messages.last().unwrap();
        assert_eq!(last.content, "[OUTPUT OF STEP 0] Observation:\n3");
    }

    #[tokio::test]
    async fn test_errors_are_logged_and_loop_continues() {
        let (llm, mut agent) = json_agent(vec![
            "I forgot the marker",
            "Action:\n{\"action\": \"nope\", \"action_input\": {}}",
            "Action:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": 5}}",
        ]);
        let answer = agent.run("t", AgentState::new()).await.unwrap();
        assert_eq!(answer, json!(5));

        let steps = agent.core().logs().steps();
        assert_eq!(steps[0].error().map(AgentError::kind), Some("parsing"));
        assert_eq!(steps[1].error().map(AgentError::kind), Some("execution"));
        assert!(steps[1].error().unwrap().message().contains("unknown tool nope"));

        let retry = llm.calls()[1].messages.last().unwrap().content.clone();
        assert!(retry.starts_with("[OUTPUT OF STEP 0] Error: Error: No 'Action:' token provided"));
        assert!(retry.contains("Now let's retry"));
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let (_, agent) = json_agent(vec!["nothing", "still nothing"]);
        let mut agent = agent.with_max_iterations(2);
        let err = agent.run("t", AgentState::new()).await.unwrap_err();
        assert_eq!(err, AgentError::MaxIterations("Reached max iterations.".into()));
        assert_eq!(agent.core().phase(), RunPhase::Failed);
        let last = agent.core().logs().last_step().unwrap();
        assert_eq!(last.error(), Some(&err));
        assert_eq!(agent.core().logs().steps().len(), 3);
    }

    #[tokio::test]
    async fn test_final_answer_dereferences_state() {
        let (_, mut agent) = json_agent(vec![
            "Action:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": \"result\"}}",
        ]);
        let kwargs = AgentState::from([("result".to_string(), json!([1, 2]))]);
        let answer = agent.run("t", kwargs).await.unwrap();
        assert_eq!(answer, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_image_output_stored_in_state() {
        let llm = Arc::new(ScriptedLlm::new([
            "Action:\n{\"action\": \"painter\", \"action_input\": {}}",
            "Action:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": \"image.png\"}}",
        ]));
        let toolbox = Toolbox::with_tools([Painter]).unwrap();
        let mut agent = ReactJsonAgent::new(llm, toolbox).unwrap();
        let answer = agent.run("paint", AgentState::new()).await.unwrap();
        assert_eq!(answer, json!({"pixels": [1, 2, 3]}));
        assert_eq!(
            agent.core().logs().steps()[0].observation(),
            Some("Stored 'image.png' in memory.")
        );
    }

    #[tokio::test]
    async fn test_text_parser_and_memory_verbose() {
        let (_, agent) = json_agent(vec!["Thought: x\nAction: final_answer\nAction input: done"]);
        let mut agent = agent.with_tool_parser(ToolParser::Text).with_memory_verbose(true);
        let answer = agent.run("t", AgentState::new()).await.unwrap();
        assert_eq!(answer, json!("done"));
        let step = &agent.core().logs().steps()[0];
        assert!(step.agent_memory.is_some());
        assert!(agent.core().logs().succinct().len() == 2);
    }

    #[tokio::test]
    async fn test_planning_interval_inserts_plan_records() {
        let (llm, agent) = json_agent(vec![
            "facts",
            "1. add\n2. answer",
            "Action:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": 1}}",
        ]);
        let mut agent = agent.with_planning_interval(Some(3));
        agent.run("t", AgentState::new()).await.unwrap();
        let steps = agent.core().logs().steps();
        assert_eq!(steps.len(), 2);
        assert!(steps[0].plan.is_some());
        assert!(steps[0].iteration.is_none());
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_zero_planning_interval_from_settings_runs_without_planning() {
        let (llm, agent) = json_agent(vec![
            "Action:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": 1}}",
        ]);
        let settings = AgentSettings {
            planning_interval: Some(0),
            ..AgentSettings::default()
        };
        let mut agent = agent.with_settings(&settings);
        let answer = agent.run("t", AgentState::new()).await.unwrap();
        assert_eq!(answer, json!(1));
        assert!(agent.core().logs().steps().iter().all(|s| s.plan.is_none()));
        assert_eq!(llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_continue_keeps_history() {
        let (_, mut agent) = json_agent(vec![
            "Action:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": 1}}",
            "Action:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": 2}}",
        ]);
        agent.run("first", AgentState::new()).await.unwrap();
        let answer = agent.continue_with("second", AgentState::new()).await.unwrap();
        assert_eq!(answer, json!(2));
        let steps = agent.core().logs().steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].task.as_deref(), Some("second"));
    }

    /// 把代码里的整数字面量当作结果，并回显代码作为打印输出
    struct EchoEvaluator;

    #[async_trait]
    impl CodeEvaluator for EchoEvaluator {
        async fn evaluate(
            &self,
            code: &str,
            _static_tools: &ToolMap,
            custom_tools: &mut ToolMap,
            state: &mut AgentState,
            _authorized_imports: &[String],
        ) -> Result<Value, String> {
            if code.contains("raise") {
                return Err("boom".to_string());
            }
            custom_tools.insert("adder".to_string(), Arc::new(Adder));
            state.insert(PRINT_OUTPUTS_KEY.to_string(), json!(format!("{code}\n")));
            Ok(code
                .lines()
                .last()
                .and_then(|l| l.trim_start_matches("final_answer(").trim_end_matches(')').parse::<i64>().ok())
                .map(Value::from)
                .unwrap_or(Value::Null))
        }
    }

    #[tokio::test]
    async fn test_code_agent_loop() {
        let llm = Arc::new(ScriptedLlm::new([
            "Thought: try\nCode:\n```py\nraise\n```<end_action>",
            "Thought: look\nCode:\n```py\nprint(1)\n```<end_action>",
            "Thought: done\nCode:\n```py\nfinal_answer(7)\n```<end_action>",
        ]));
        let mut agent = ReactCodeAgent::new(llm, Toolbox::new(), Arc::new(EchoEvaluator)).unwrap();
        let answer = agent.run("t", AgentState::new()).await.unwrap();
        assert_eq!(answer, json!(7));

        let steps = agent.core().logs().steps();
        assert!(steps[0]
            .error()
            .unwrap()
            .message()
            .starts_with("Code execution failed due to the following error:\nboom"));
        assert_eq!(steps[1].observation(), Some("Print outputs:\nprint(1)\n"));
        assert_eq!(
            steps[2].observation(),
            Some("Print outputs:\nfinal_answer(7)\nLast output from code snippet:\n7")
        );
        assert!(agent.custom_tools.contains_key("adder"));
    }
}
