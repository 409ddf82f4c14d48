//! 端到端：Scripted 模型 + 简易算术执行器驱动各类 Agent

use std::sync::Arc;

use async_trait::async_trait;
use bee_core::agent::{CodeAgent, ReactCodeAgent, ReactJsonAgent, ReactStep, RunOutput};
use bee_core::core::{AgentState, RunPhase, PRINT_OUTPUTS_KEY};
use bee_core::llm::ScriptedLlm;
use bee_core::tools::{
    BaseToolset, CodeEvaluator, TaskToolLoader, Tool, ToolArgs, ToolMap, ToolReference, Toolbox,
    PYTHON_INTERPRETER,
};
use serde_json::{json, Value};

/// 支持整数加法、变量赋值、print 与 final_answer 的极简执行器
struct ArithmeticEvaluator;

fn eval_expr(expr: &str, state: &AgentState) -> Result<Value, String> {
    let mut total = 0i64;
    for term in expr.split('+') {
        let term = term.trim();
        let value = match term.parse::<i64>() {
            Ok(n) => n,
            Err(_) => state
                .get(term)
                .and_then(Value::as_i64)
                .ok_or_else(|| format!("name '{term}' is not defined"))?,
        };
        total += value;
    }
    Ok(json!(total))
}

#[async_trait]
impl CodeEvaluator for ArithmeticEvaluator {
    async fn evaluate(
        &self,
        code: &str,
        static_tools: &ToolMap,
        _custom_tools: &mut ToolMap,
        state: &mut AgentState,
        _authorized_imports: &[String],
    ) -> Result<Value, String> {
        let mut last = Value::Null;
        for line in code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(inner) = line.strip_prefix("print(").and_then(|r| r.strip_suffix(')')) {
                let value = eval_expr(inner, state)?;
                let mut prints = state
                    .get(PRINT_OUTPUTS_KEY)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                prints.push_str(&format!("{value}\n"));
                state.insert(PRINT_OUTPUTS_KEY.to_string(), json!(prints));
                last = Value::Null;
            } else if let Some(inner) = line.strip_prefix("final_answer(").and_then(|r| r.strip_suffix(')')) {
                let value = eval_expr(inner, state)?;
                let tool = static_tools.get("final_answer").ok_or("final_answer is not available")?;
                last = tool.execute(ToolArgs::from(json!({ "answer": value }))).await?;
            } else if let Some((name, expr)) = line.split_once('=') {
                let value = eval_expr(expr, state)?;
                state.insert(name.trim().to_string(), value);
                last = Value::Null;
            } else {
                last = eval_expr(line, state)?;
            }
        }
        Ok(last)
    }
}

struct Stub(String);

#[async_trait]
impl Tool for Stub {
    fn name(&self) -> &str {
        &self.0
    }

    fn description(&self) -> &str {
        "stub"
    }

    async fn execute(&self, _args: ToolArgs) -> Result<Value, String> {
        Ok(json!(format!("{} ran", self.0)))
    }
}

fn stub_loader(base: &BaseToolset) -> Arc<TaskToolLoader> {
    let loader = base
        .references()
        .iter()
        .fold(TaskToolLoader::new(), |loader, reference| {
            loader.with_factory(reference.task.clone(), |r: &ToolReference| {
                Arc::new(Stub(r.name.clone())) as Arc<dyn Tool>
            })
        });
    Arc::new(loader)
}

#[tokio::test]
async fn test_single_shot_evaluates_expression() {
    let llm = Arc::new(ScriptedLlm::new(["Code:\n```py\n1+1\n```"]));
    let mut agent = CodeAgent::new(llm, Toolbox::new(), Arc::new(ArithmeticEvaluator)).unwrap();
    let out = agent.run("What is 1+1?", AgentState::new()).await.unwrap();
    assert_eq!(out, RunOutput::Value(json!(2)));
    assert_eq!(out.to_string(), "2");
    assert_eq!(agent.core().phase(), RunPhase::Done);
}

#[tokio::test]
async fn test_single_shot_without_fence_returns_error_text() {
    let llm = Arc::new(ScriptedLlm::new(["The answer is obviously 2."]));
    let mut agent = CodeAgent::new(llm, Toolbox::new(), Arc::new(ArithmeticEvaluator)).unwrap();
    let out = agent.run("What is 1+1?", AgentState::new()).await.unwrap();
    match out {
        RunOutput::Failed(msg) => {
            assert!(msg.starts_with("Error in code parsing:"));
            assert!(msg.contains("Be sure to provide correct code"));
        }
        other => panic!("expected failure text, got {other:?}"),
    }
}

#[tokio::test]
async fn test_single_shot_uses_initial_arguments() {
    let llm = Arc::new(ScriptedLlm::new(["Thought: add\nCode:\n```python\ny = x + 2\nprint(y)\ny\n```"]));
    let mut agent = CodeAgent::new(llm.clone(), Toolbox::new(), Arc::new(ArithmeticEvaluator)).unwrap();
    let kwargs = AgentState::from([("x".to_string(), json!(40))]);
    let out = agent.run("Add two to x.", kwargs).await.unwrap();
    assert_eq!(out, RunOutput::Value(json!(42)));
    assert_eq!(agent.core().state()[PRINT_OUTPUTS_KEY], json!("42\n"));
    assert!(llm.calls()[0].messages[1]
        .content
        .ends_with("You have been provided with these initial arguments: {\"x\":40}."));
}

#[tokio::test]
async fn test_single_shot_undefined_name_is_execution_failure() {
    let llm = Arc::new(ScriptedLlm::new(["Code:\n```py\nz + 1\n```"]));
    let mut agent = CodeAgent::new(llm, Toolbox::new(), Arc::new(ArithmeticEvaluator)).unwrap();
    let out = agent.run("t", AgentState::new()).await.unwrap();
    assert_eq!(
        out,
        RunOutput::Failed("Error in execution: name 'z' is not defined. Be sure to provide correct code.".into())
    );
    assert_eq!(agent.core().phase(), RunPhase::Failed);
}

#[test]
fn test_base_toolset_built_once_across_toolboxes() {
    let base = BaseToolset::new();
    let loader = stub_loader(&base);
    assert_eq!(base.build_count(), 1);

    let mut first = Toolbox::new().with_loader(loader.clone());
    first.add_base_tools(&base, false).unwrap();
    let mut second = Toolbox::new().with_loader(loader);
    second.add_base_tools(&base, true).unwrap();

    assert_eq!(base.build_count(), 1);
    assert!(first.get("translator").is_some());
    assert!(!first.contains(PYTHON_INTERPRETER));
    assert!(second.get(PYTHON_INTERPRETER).is_some());
    assert!(first.tools().count() == first.len());
}

#[tokio::test]
async fn test_json_agent_with_base_tools() {
    let base = BaseToolset::new();
    let toolbox = Toolbox::new().with_loader(stub_loader(&base));
    let llm = Arc::new(ScriptedLlm::new([
        "Thought: translate\nAction:\n{\"action\": \"translator\", \"action_input\": {\"text\": \"bonjour\", \"src_lang\": \"French\", \"tgt_lang\": \"English\"}}<end_action>",
        "Action:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": \"hello\"}}",
    ]));
    let mut agent = ReactJsonAgent::new(llm, toolbox)
        .unwrap()
        .with_base_tools(&base)
        .unwrap();
    assert!(agent.core().toolbox().contains(PYTHON_INTERPRETER));
    assert!(agent.core().system_prompt().contains("- translator:"));

    let answer = agent.run("Translate bonjour", AgentState::new()).await.unwrap();
    assert_eq!(answer, json!("hello"));
    assert_eq!(
        agent.core().logs().steps()[0].observation(),
        Some("translator ran")
    );
}

#[tokio::test]
async fn test_code_agent_keeps_state_between_steps() {
    let llm = Arc::new(ScriptedLlm::new([
        "Thought: compute\nCode:\n```py\nx = 2 + 3\nprint(x)\n```<end_action>",
        "Thought: answer\nCode:\n```py\nfinal_answer(x + 1)\n```<end_action>",
    ]));
    let mut agent = ReactCodeAgent::new(llm.clone(), Toolbox::new(), Arc::new(ArithmeticEvaluator)).unwrap();
    let answer = agent.run("Add things", AgentState::new()).await.unwrap();
    assert_eq!(answer, json!(6));

    let steps = agent.core().logs().steps();
    assert_eq!(steps[0].observation(), Some("Print outputs:\n5\n"));
    let second_prompt = &llm.calls()[1].messages;
    assert_eq!(
        second_prompt.last().unwrap().content,
        "[OUTPUT OF STEP 0] Observation:\nPrint outputs:\n5\n"
    );
}
