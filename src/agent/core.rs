//! AgentCore：各类 Agent 共享的运行骨架
//!
//! 持有模型引擎、工具箱、prompt 模板、共享状态与 step log。负责一次 run 的初始化
//! （任务文本、state、system prompt 渲染、step log 重置）、对话重建、工具调用与规划步。
//! 配置错误（缺模板标签、工具箱冲突）在任何阶段迁移之前直接返回。

use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::AgentSettings;
use crate::core::{AgentError, AgentState, RunPhase, RunTracker};
use crate::llm::LlmEngine;
use crate::memory::{write_inner_memory, ActionStep, Message, StepLog, TranscriptMode};
use crate::react::prompts::{
    render_tags, PLAN_UPDATE_FINAL_PLAN_REDACTION, SYSTEM_PROMPT_FACTS, SYSTEM_PROMPT_FACTS_UPDATE,
    SYSTEM_PROMPT_PLAN, SYSTEM_PROMPT_PLAN_UPDATE, USER_PROMPT_FACTS_UPDATE, USER_PROMPT_PLAN,
    USER_PROMPT_PLAN_UPDATE,
};
use crate::react::{authorized_imports, format_prompt_with_imports, format_prompt_with_tools};
use crate::tools::{BaseToolset, FinalAnswerTool, ToolArgs, ToolExecutor, ToolMap, Toolbox};

/// 动作结束标记（停止序列）
pub const END_ACTION: &str = "<end_action>";
/// 规划结束标记
pub const END_PLAN: &str = "<end_plan>";

pub struct AgentCore {
    llm: Arc<dyn LlmEngine>,
    toolbox: Toolbox,
    system_prompt_template: String,
    tool_description_template: Option<String>,
    system_prompt: String,
    task: String,
    state: AgentState,
    logs: StepLog,
    executor: ToolExecutor,
    max_iterations: usize,
    planning_interval: Option<usize>,
    /// 代码类 Agent 才有；渲染进 `<<authorized_imports>>`
    authorized_imports: Option<Vec<String>>,
    memory_verbose: bool,
    tracker: RunTracker,
    run_id: Uuid,
}

impl AgentCore {
    /// 创建并把 final_answer 加入工具箱；工具箱里已有同名工具时报 Config 错误
    pub fn new(
        llm: Arc<dyn LlmEngine>,
        mut toolbox: Toolbox,
        system_prompt_template: impl Into<String>,
    ) -> Result<Self, AgentError> {
        toolbox.add(FinalAnswerTool)?;
        let system_prompt_template = system_prompt_template.into();
        let system_prompt = format_prompt_with_tools(&toolbox, &system_prompt_template, None);
        let settings = AgentSettings::default();
        Ok(Self {
            llm,
            toolbox,
            system_prompt_template,
            tool_description_template: None,
            system_prompt,
            task: String::new(),
            state: AgentState::new(),
            logs: StepLog::default(),
            executor: ToolExecutor::new(settings.tool_timeout_secs),
            max_iterations: settings.max_iterations,
            planning_interval: settings.planning_interval.filter(|n| *n > 0),
            authorized_imports: None,
            memory_verbose: settings.memory_verbose,
            tracker: RunTracker::new(),
            run_id: Uuid::new_v4(),
        })
    }

    /// 按 [agent] 配置段设置迭代上限、工具超时、规划间隔、记忆快照与额外导入
    pub fn with_settings(mut self, settings: &AgentSettings) -> Self {
        self.max_iterations = settings.max_iterations;
        self.executor = ToolExecutor::new(settings.tool_timeout_secs);
        // 间隔为 0 视为不规划
        self.planning_interval = settings.planning_interval.filter(|n| *n > 0);
        self.memory_verbose = settings.memory_verbose;
        if self.authorized_imports.is_some() {
            self.authorized_imports = Some(authorized_imports(&settings.additional_authorized_imports));
        }
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_planning_interval(mut self, interval: Option<usize>) -> Self {
        self.planning_interval = interval.filter(|n| *n > 0);
        self
    }

    pub fn with_memory_verbose(mut self, memory_verbose: bool) -> Self {
        self.memory_verbose = memory_verbose;
        self
    }

    pub fn with_tool_timeout(mut self, timeout_secs: u64) -> Self {
        self.executor = ToolExecutor::new(timeout_secs);
        self
    }

    pub fn with_tool_description_template(mut self, template: impl Into<String>) -> Self {
        self.tool_description_template = Some(template.into());
        self.system_prompt = self.render_tools_only();
        self
    }

    /// 启用导入白名单：安全模块 ∪ additional
    pub fn with_authorized_imports(mut self, additional: &[String]) -> Self {
        self.authorized_imports = Some(authorized_imports(additional));
        self
    }

    /// 替换 system prompt 模板并立即校验
    pub fn set_system_prompt_template(&mut self, template: impl Into<String>) -> Result<(), AgentError> {
        let previous = std::mem::replace(&mut self.system_prompt_template, template.into());
        match self.render_system_prompt() {
            Ok(prompt) => {
                self.system_prompt = prompt;
                Ok(())
            }
            Err(e) => {
                self.system_prompt_template = previous;
                Err(e)
            }
        }
    }

    /// 加入进程级基础工具集
    pub fn add_base_tools(&mut self, base: &BaseToolset, include_code_executor: bool) -> Result<(), AgentError> {
        self.toolbox.add_base_tools(base, include_code_executor)?;
        self.system_prompt = self.render_tools_only();
        Ok(())
    }

    fn render_tools_only(&self) -> String {
        format_prompt_with_tools(
            &self.toolbox,
            &self.system_prompt_template,
            self.tool_description_template.as_deref(),
        )
    }

    /// 渲染完整 system prompt（工具描述、工具名、导入白名单）
    pub fn render_system_prompt(&self) -> Result<String, AgentError> {
        let prompt = self.render_tools_only();
        match &self.authorized_imports {
            Some(imports) => format_prompt_with_imports(&prompt, imports),
            None => Ok(prompt),
        }
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    pub fn toolbox_mut(&mut self) -> &mut Toolbox {
        &mut self.toolbox
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AgentState {
        &mut self.state
    }

    pub fn logs(&self) -> &StepLog {
        &self.logs
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn planning_interval(&self) -> Option<usize> {
        self.planning_interval
    }

    pub fn memory_verbose(&self) -> bool {
        self.memory_verbose
    }

    pub fn authorized_imports(&self) -> &[String] {
        self.authorized_imports.as_deref().unwrap_or_default()
    }

    pub fn phase(&self) -> RunPhase {
        self.tracker.phase()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub(crate) fn advance(&mut self, next: RunPhase) -> Result<(), AgentError> {
        self.tracker.advance(next)
    }

    pub(crate) fn push_step(&mut self, step: ActionStep) {
        self.logs.push(step);
    }

    /// 开始新的 run：任务文本附上初始参数说明，state 取初始参数，step log 只剩初始化记录
    pub fn initialize_for_run(&mut self, task: &str, kwargs: AgentState) -> Result<(), AgentError> {
        let system_prompt = self.render_system_prompt()?;

        let mut task = task.to_string();
        if !kwargs.is_empty() {
            let rendered: Map<String, Value> =
                kwargs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            task.push_str(&format!(
                "\nYou have been provided with these initial arguments: {}.",
                Value::Object(rendered)
            ));
        }

        self.system_prompt = system_prompt;
        self.task = task;
        self.state = kwargs;
        self.logs = StepLog::new(self.system_prompt.clone(), self.task.clone());
        self.run_id = Uuid::new_v4();
        self.tracker.advance(RunPhase::Initialized)?;

        tracing::warn!("======== New task ========");
        tracing::info!(run_id = %self.run_id, task = %self.task, "task");
        tracing::debug!(system_prompt = %self.system_prompt, "system prompt");
        Ok(())
    }

    /// 在现有 step log 上追加新任务继续运行（state 与历史保留）
    pub fn continue_run(&mut self, task: &str) -> Result<(), AgentError> {
        self.tracker.advance(RunPhase::Initialized)?;
        self.logs.push(ActionStep {
            task: Some(task.to_string()),
            ..ActionStep::default()
        });
        tracing::info!(run_id = %self.run_id, task = %task, "continuing with new task");
        Ok(())
    }

    pub fn write_inner_memory_from_logs(&self, mode: TranscriptMode) -> Vec<Message> {
        write_inner_memory(&self.logs, mode)
    }

    /// 调用模型；引擎失败映射为 Generation 错误
    pub async fn generate(&self, messages: &[Message], stop_sequences: &[&str]) -> Result<String, AgentError> {
        let stops: Vec<String> = stop_sequences.iter().map(|s| s.to_string()).collect();
        self.llm
            .complete(messages, &stops)
            .await
            .map_err(|e| AgentError::Generation(format!("Error in generating llm output: {e}.")))
    }

    /// 通过执行器调用工具（参数按 state 解引用）
    pub async fn execute_tool_call(&self, tool_name: &str, arguments: ToolArgs) -> Result<Value, AgentError> {
        self.executor
            .execute(&self.toolbox, tool_name, arguments, &self.state)
            .await
    }

    /// 代码执行可见的全部工具：基础原语 + 工具箱（同名时工具箱优先）
    pub fn callable_tools(&self, primitives: &ToolMap) -> ToolMap {
        let mut tools = primitives.clone();
        for (name, tool) in self.toolbox.tools() {
            tools.insert(name.to_string(), tool.clone());
        }
        tools
    }

    /// 规划步：首次做事实调研与初始计划，之后基于摘要对话更新事实与计划
    pub async fn planning_step(&mut self, is_first_step: bool, iteration: usize) -> Result<(), AgentError> {
        let tool_descriptions = self
            .toolbox
            .describe(self.tool_description_template.as_deref());

        let step = if is_first_step {
            let task_message = Message::user(format!("Here is the task:\n```\n{}\n```\nNow begin!", self.task));
            let answer_facts = self
                .generate(&[Message::system(SYSTEM_PROMPT_FACTS), task_message], &[])
                .await?;

            let user_plan = render_tags(
                USER_PROMPT_PLAN,
                &[
                    ("task", self.task.as_str()),
                    ("tool_descriptions", tool_descriptions.as_str()),
                    ("answer_facts", answer_facts.as_str()),
                ],
            );
            let answer_plan = self
                .generate(
                    &[Message::system(SYSTEM_PROMPT_PLAN), Message::user(user_plan)],
                    &[END_PLAN],
                )
                .await?;

            ActionStep {
                plan: Some(format!(
                    "Here is the plan of action that I will follow to solve the task:\n```\n{answer_plan}\n```"
                )),
                facts: Some(format!(
                    "Here are the facts that I know so far:\n```\n{answer_facts}\n```"
                )),
                ..ActionStep::default()
            }
        } else {
            let agent_memory = self.write_inner_memory_from_logs(TranscriptMode::Summary);

            let mut facts_prompt = vec![Message::system(SYSTEM_PROMPT_FACTS_UPDATE)];
            facts_prompt.extend(agent_memory.iter().cloned());
            facts_prompt.push(Message::user(USER_PROMPT_FACTS_UPDATE));
            let facts_update = self.generate(&facts_prompt, &[]).await?;

            let remaining_steps = self.max_iterations.saturating_sub(iteration).to_string();
            let mut plan_prompt = vec![Message::system(render_tags(
                SYSTEM_PROMPT_PLAN_UPDATE,
                &[("task", self.task.as_str())],
            ))];
            plan_prompt.extend(agent_memory);
            plan_prompt.push(Message::user(render_tags(
                USER_PROMPT_PLAN_UPDATE,
                &[
                    ("task", self.task.as_str()),
                    ("tool_descriptions", tool_descriptions.as_str()),
                    ("facts_update", facts_update.as_str()),
                    ("remaining_steps", remaining_steps.as_str()),
                ],
            )));
            let plan_update = self.generate(&plan_prompt, &[END_PLAN]).await?;

            ActionStep {
                plan: Some(render_tags(
                    PLAN_UPDATE_FINAL_PLAN_REDACTION,
                    &[("task", self.task.as_str()), ("plan_update", plan_update.as_str())],
                )),
                facts: Some(format!(
                    "Here is the updated list of the facts that I know:\n```\n{facts_update}\n```"
                )),
                ..ActionStep::default()
            }
        };

        tracing::info!(
            iteration,
            plan = step.plan.as_deref().unwrap_or_default(),
            "planning step"
        );
        self.logs.push(step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::react::prompts::DEFAULT_REACT_JSON_SYSTEM_PROMPT;
    use serde_json::json;

    fn core_with(outputs: Vec<&str>) -> (Arc<ScriptedLlm>, AgentCore) {
        let llm = Arc::new(ScriptedLlm::new(outputs));
        let core = AgentCore::new(llm.clone(), Toolbox::new(), DEFAULT_REACT_JSON_SYSTEM_PROMPT).unwrap();
        (llm, core)
    }

    #[test]
    fn test_final_answer_added_and_rendered() {
        let (_, core) = core_with(vec![]);
        assert!(core.toolbox().contains("final_answer"));
        assert!(core.system_prompt().contains("- final_answer:"));
        assert!(core.system_prompt().contains("'final_answer'"));
    }

    #[test]
    fn test_duplicate_final_answer_is_config_error() {
        let llm = Arc::new(ScriptedLlm::default());
        let toolbox = Toolbox::with_tools([FinalAnswerTool]).unwrap();
        let err = AgentCore::new(llm, toolbox, "x").err().unwrap();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_initialize_appends_kwargs_and_resets() {
        let (_, mut core) = core_with(vec![]);
        let kwargs = AgentState::from([("x".to_string(), json!(3))]);
        core.initialize_for_run("add", kwargs).unwrap();
        assert_eq!(
            core.task(),
            "add\nYou have been provided with these initial arguments: {\"x\":3}."
        );
        assert_eq!(core.state()["x"], json!(3));
        assert_eq!(core.logs().len(), 1);
        assert_eq!(core.logs().initialization().task, core.task());
        assert_eq!(core.phase(), RunPhase::Initialized);
    }

    #[test]
    fn test_missing_imports_tag_fails_before_transition() {
        let (_, core) = core_with(vec![]);
        let mut core = core.with_authorized_imports(&[]);
        assert_eq!(core.phase(), RunPhase::Idle);
        let err = core.initialize_for_run("task", AgentState::new()).unwrap_err();
        assert_eq!(err.kind(), "config");
        assert_eq!(core.phase(), RunPhase::Idle);
    }

    #[test]
    fn test_rejected_template_is_not_kept() {
        let (_, core) = core_with(vec![]);
        let mut core = core.with_authorized_imports(&[]);
        assert!(core.set_system_prompt_template("no imports tag").is_err());
        core.set_system_prompt_template("imports: <<authorized_imports>>").unwrap();
        assert!(core.system_prompt().starts_with("imports: ['collections'"));
    }

    #[test]
    fn test_zero_planning_interval_from_settings_disables_planning() {
        let (_, core) = core_with(vec![]);
        let settings = AgentSettings {
            planning_interval: Some(0),
            ..AgentSettings::default()
        };
        let core = core.with_settings(&settings);
        assert_eq!(core.planning_interval(), None);

        let settings = AgentSettings {
            planning_interval: Some(3),
            ..AgentSettings::default()
        };
        assert_eq!(core.with_settings(&settings).planning_interval(), Some(3));
    }

    #[tokio::test]
    async fn test_generation_error_mapped() {
        let (_, core) = core_with(vec![]);
        let err = core.generate(&[], &[]).await.unwrap_err();
        assert_eq!(err.kind(), "generation");
        assert!(err.message().contains("scripted outputs exhausted"));
    }

    #[tokio::test]
    async fn test_planning_steps_record_facts_and_plan() {
        let (llm, mut core) = core_with(vec!["facts A", "1. do it\n<end_plan>", "facts B", "2. redo"]);
        core.initialize_for_run("solve", AgentState::new()).unwrap();

        core.planning_step(true, 0).await.unwrap();
        let first = core.logs().last_step().unwrap().clone();
        assert!(first.facts.unwrap().contains("facts A"));
        let plan = first.plan.unwrap();
        assert!(plan.contains("1. do it"));
        assert!(!plan.contains("<end_plan>"));

        core.planning_step(false, 2).await.unwrap();
        let second = core.logs().last_step().unwrap().clone();
        assert!(second.facts.unwrap().contains("facts B"));
        assert!(second.plan.unwrap().starts_with("I still need to solve the task I was given:\n```\nsolve\n```"));

        let calls = llm.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1].stop_sequences, vec![END_PLAN.to_string()]);
        assert!(calls[3].messages.last().unwrap().content.contains("you have 4 steps remaining"));
    }
}
