//! 对话重建：把 step log 转成下一次模型调用的消息序列
//!
//! Full 模式带 system prompt、原始 llm_output 与 plan；Summary 模式省略它们但保留 tool_call。
//! 顺序严格按 step log，不去重不重排。

use crate::memory::{Message, StepLog, StepOutcome};

/// 重建精度
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscriptMode {
    Full,
    Summary,
}

const RETRY_ADMONITION: &str = "Now let's retry: take care not to repeat previous errors! If you have retried several times, try a completely different approach.\n";

/// 按 step log 构建消息序列；标签中的步号为初始化记录之后的 0 起下标
pub fn write_inner_memory(log: &StepLog, mode: TranscriptMode) -> Vec<Message> {
    let summary = mode == TranscriptMode::Summary;
    let init = log.initialization();

    let mut memory = Vec::with_capacity(log.len() * 2);
    if !summary {
        memory.push(Message::system(init.system_prompt.clone()));
    }
    memory.push(Message::user(format!("Task: {}", init.task)));

    for (i, step) in log.steps().iter().enumerate() {
        if let (Some(output), false) = (&step.llm_output, summary) {
            memory.push(Message::assistant(output.trim()));
        }
        if let Some(facts) = &step.facts {
            memory.push(Message::assistant(format!("[FACTS LIST]:\n{}", facts.trim())));
        }
        if let (Some(plan), false) = (&step.plan, summary) {
            memory.push(Message::assistant(format!("[PLAN]:\n{}", plan.trim())));
        }
        if let (Some(call), true) = (&step.tool_call, summary) {
            memory.push(Message::assistant(format!(
                "[STEP {i} TOOL CALL]: {}",
                call.to_string().trim()
            )));
        }
        if let Some(task) = &step.task {
            memory.push(Message::user(format!("New task:\n{task}")));
        }
        match &step.outcome {
            Some(StepOutcome::Error(e)) => memory.push(Message::tool_response(format!(
                "[OUTPUT OF STEP {i}] Error: {e}\n{RETRY_ADMONITION}"
            ))),
            Some(StepOutcome::Observation(o)) => memory.push(Message::tool_response(format!(
                "[OUTPUT OF STEP {i}] Observation:\n{o}"
            ))),
            None => {}
        }
    }
    memory
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentError;
    use crate::memory::{ActionStep, Role, ToolCall};
    use crate::tools::ToolArgs;

    fn sample_log() -> StepLog {
        let mut log = StepLog::new("SYSTEM", "add numbers");

        let mut planning = ActionStep::default();
        planning.facts = Some("  nothing known  ".into());
        planning.plan = Some("1. add".into());
        log.push(planning);

        let mut step = ActionStep::new(0);
        step.llm_output = Some("Thought: call adder\n".into());
        step.tool_call = Some(ToolCall::new("adder", ToolArgs::Raw("1 2".into())));
        step.set_observation("3");
        log.push(step);

        let mut failed = ActionStep::new(1);
        failed.llm_output = Some("garbage".into());
        failed.set_error(AgentError::Parsing("no action".into()));
        log.push(failed);
        log
    }

    #[test]
    fn test_full_mode_keeps_outputs_and_plan_but_not_tool_calls() {
        let memory = write_inner_memory(&sample_log(), TranscriptMode::Full);
        assert_eq!(memory[0].role, Role::System);
        assert_eq!(memory[0].content, "SYSTEM");
        assert_eq!(memory[1].content, "Task: add numbers");
        assert_eq!(memory[2].content, "[FACTS LIST]:\nnothing known");
        assert_eq!(memory[3].content, "[PLAN]:\n1. add");
        assert_eq!(memory[4].content, "Thought: call adder");
        assert_eq!(memory[5].role, Role::ToolResponse);
        assert_eq!(memory[5].content, "[OUTPUT OF STEP 1] Observation:\n3");
        assert_eq!(memory[6].content, "garbage");
        assert!(memory[7].content.starts_with("[OUTPUT OF STEP 2] Error: no action\nNow let's retry"));
        assert_eq!(memory.len(), 8);
        assert!(!memory.iter().any(|m| m.content.contains("TOOL CALL")));
    }

    #[test]
    fn test_summary_mode_keeps_tool_calls_only() {
        let memory = write_inner_memory(&sample_log(), TranscriptMode::Summary);
        assert_eq!(memory[0].role, Role::User);
        assert_eq!(memory[0].content, "Task: add numbers");
        assert_eq!(memory[1].content, "[FACTS LIST]:\nnothing known");
        assert!(memory[2].content.starts_with("[STEP 1 TOOL CALL]: {"));
        assert!(memory[2].content.contains("adder"));
        assert!(!memory.iter().any(|m| m.content.contains("[PLAN]")));
        assert!(!memory.iter().any(|m| m.content == "garbage"));
        assert_eq!(memory.iter().filter(|m| m.role == Role::ToolResponse).count(), 2);
    }

    #[test]
    fn test_sub_task_rendered_as_user_message() {
        let mut log = StepLog::new("s", "first");
        let mut step = ActionStep::default();
        step.task = Some("second".into());
        log.push(step);
        let memory = write_inner_memory(&log, TranscriptMode::Summary);
        assert_eq!(memory.last().unwrap(), &Message::user("New task:\nsecond"));
    }
}
