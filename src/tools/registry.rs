//! 工具注册表（Toolbox）
//!
//! 所有工具实现 Tool trait（name / description / inputs / output_type / execute），
//! 由 Toolbox 按名登记。条目可以是已实例化的工具，也可以是延迟引用（task 或 repo id）。
//! 每次变更先在暂存表上进行并经 ToolLoader 物化，全部成功才生效。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ToolboxError;
use crate::tools::base::{BaseToolset, PYTHON_INTERPRETER};
use crate::tools::final_answer::{FinalAnswerTool, FINAL_ANSWER};
use crate::tools::description::{describe_entry, DEFAULT_TOOL_DESCRIPTION_TEMPLATE};
use crate::tools::loader::{TaskToolLoader, ToolLoader};

/// 单个参数的语义类型描述
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl InputSpec {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// 参数名 -> 类型描述
pub type ToolInputs = BTreeMap<String, InputSpec>;

/// 工具参数：单个原始字符串，或具名参数表
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolArgs {
    Raw(String),
    Named(Map<String, Value>),
}

impl ToolArgs {
    pub fn empty() -> Self {
        ToolArgs::Named(Map::new())
    }

    /// 取具名参数（Raw 时返回 None）
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            ToolArgs::Named(map) => map.get(key),
            ToolArgs::Raw(_) => None,
        }
    }

    /// 取字符串参数；Raw 形式视为唯一的位置参数
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        match self {
            ToolArgs::Named(map) => map.get(key).and_then(|v| v.as_str()),
            ToolArgs::Raw(s) => Some(s.as_str()),
        }
    }
}

impl From<Value> for ToolArgs {
    /// action_input 的各种形态：对象为具名参数，字符串为原始参数，null 为空参数表
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => ToolArgs::Named(map),
            Value::String(s) => ToolArgs::Raw(s),
            Value::Null => ToolArgs::empty(),
            other => ToolArgs::Raw(other.to_string()),
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、输入 schema、输出类型、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（注册表中的唯一键）
    fn name(&self) -> &str;

    /// 工具描述（渲染进 system prompt）
    fn description(&self) -> &str;

    /// 输入 schema；为空表示不校验具名参数
    fn inputs(&self) -> ToolInputs {
        ToolInputs::new()
    }

    fn output_type(&self) -> &str {
        "any"
    }

    /// 执行工具
    async fn execute(&self, args: ToolArgs) -> Result<Value, String>;
}

/// 值转文本（字符串不带引号）
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 延迟工具引用：物化前只有元数据
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReference {
    pub name: String,
    pub description: String,
    pub inputs: ToolInputs,
    pub output_type: String,
    pub task: String,
    pub repo_id: Option<String>,
}

impl ToolReference {
    /// 解析键：repo_id 优先，否则 task
    pub fn resolution_key(&self) -> &str {
        self.repo_id.as_deref().unwrap_or(&self.task)
    }
}

/// 注册表条目
#[derive(Clone)]
pub enum ToolEntry {
    Concrete(Arc<dyn Tool>),
    Deferred(ToolReference),
}

impl ToolEntry {
    pub fn name(&self) -> &str {
        match self {
            ToolEntry::Concrete(t) => t.name(),
            ToolEntry::Deferred(r) => &r.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ToolEntry::Concrete(t) => t.description(),
            ToolEntry::Deferred(r) => &r.description,
        }
    }

    pub fn inputs(&self) -> ToolInputs {
        match self {
            ToolEntry::Concrete(t) => t.inputs(),
            ToolEntry::Deferred(r) => r.inputs.clone(),
        }
    }

    pub fn output_type(&self) -> &str {
        match self {
            ToolEntry::Concrete(t) => t.output_type(),
            ToolEntry::Deferred(r) => &r.output_type,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, ToolEntry::Deferred(_))
    }
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolEntry::Concrete(t) => f.debug_tuple("Concrete").field(&t.name()).finish(),
            ToolEntry::Deferred(r) => f.debug_tuple("Deferred").field(r).finish(),
        }
    }
}

impl<T: Tool + 'static> From<T> for ToolEntry {
    fn from(tool: T) -> Self {
        ToolEntry::Concrete(Arc::new(tool))
    }
}

impl From<Arc<dyn Tool>> for ToolEntry {
    fn from(tool: Arc<dyn Tool>) -> Self {
        ToolEntry::Concrete(tool)
    }
}

impl From<ToolReference> for ToolEntry {
    fn from(reference: ToolReference) -> Self {
        ToolEntry::Deferred(reference)
    }
}

/// 工具箱：名称唯一；只通过显式 add / remove / update / clear 变更
#[derive(Clone)]
pub struct Toolbox {
    entries: BTreeMap<String, ToolEntry>,
    loader: Arc<dyn ToolLoader>,
}

impl Default for Toolbox {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            loader: Arc::new(TaskToolLoader::default()),
        }
    }
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用一组工具创建；重名时后者报错
    pub fn with_tools<I, E>(tools: I) -> Result<Self, ToolboxError>
    where
        I: IntoIterator<Item = E>,
        E: Into<ToolEntry>,
    {
        let mut toolbox = Self::new();
        for tool in tools {
            toolbox.add(tool)?;
        }
        Ok(toolbox)
    }

    /// 替换延迟引用的解析器
    pub fn with_loader(mut self, loader: Arc<dyn ToolLoader>) -> Self {
        self.loader = loader;
        self
    }

    fn not_found(&self, name: &str, op: &'static str) -> ToolboxError {
        ToolboxError::NotFound {
            name: name.to_string(),
            op,
            known: self.tool_names(),
        }
    }

    /// 把暂存表中的延迟引用逐个物化
    fn materialize_into(&self, staged: &mut BTreeMap<String, ToolEntry>) -> Result<(), ToolboxError> {
        for entry in staged.values_mut() {
            if let ToolEntry::Deferred(reference) = entry {
                tracing::debug!(
                    tool = %reference.name,
                    key = %reference.resolution_key(),
                    "materializing deferred tool"
                );
                let tool = self.loader.load(reference)?;
                *entry = ToolEntry::Concrete(tool);
            }
        }
        Ok(())
    }

    /// 物化暂存表后整体替换；任一引用无法解析时工具箱保持原样
    fn commit(&mut self, mut staged: BTreeMap<String, ToolEntry>) -> Result<(), ToolboxError> {
        self.materialize_into(&mut staged)?;
        self.entries = staged;
        Ok(())
    }

    /// 把仍为延迟引用的条目物化为具体工具
    pub fn materialize_pending(&mut self) -> Result<(), ToolboxError> {
        let staged = self.entries.clone();
        self.commit(staged)
    }

    /// 添加工具；已存在同名工具时报 Duplicate
    pub fn add(&mut self, tool: impl Into<ToolEntry>) -> Result<(), ToolboxError> {
        let entry = tool.into();
        let name = entry.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(ToolboxError::Duplicate(name));
        }
        let mut staged = self.entries.clone();
        staged.insert(name, entry);
        self.commit(staged)
    }

    /// 按名移除；不存在时报 NotFound（附当前全部名称）
    pub fn remove(&mut self, name: &str) -> Result<(), ToolboxError> {
        if self.entries.remove(name).is_none() {
            return Err(self.not_found(name, "removal"));
        }
        Ok(())
    }

    /// 按名原地替换；新工具必须同名，失败时保留原工具
    pub fn update(&mut self, name: &str, tool: impl Into<ToolEntry>) -> Result<(), ToolboxError> {
        if !self.entries.contains_key(name) {
            return Err(self.not_found(name, "update"));
        }
        let entry = tool.into();
        if entry.name() != name {
            return Err(ToolboxError::NameMismatch {
                expected: name.to_string(),
                found: entry.name().to_string(),
            });
        }
        let mut staged = self.entries.clone();
        staged.insert(name.to_string(), entry);
        self.commit(staged)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 添加进程级共享的基础工具集；默认不含代码解释器
    ///
    /// final_answer 已存在时跳过，其余重名报 Duplicate。任一步失败则工具箱保持原样。
    pub fn add_base_tools(
        &mut self,
        base: &BaseToolset,
        include_code_executor: bool,
    ) -> Result<(), ToolboxError> {
        let mut staged = self.entries.clone();
        for reference in base.references() {
            let name = reference.name.as_str();
            if name == PYTHON_INTERPRETER && !include_code_executor {
                continue;
            }
            if name == FINAL_ANSWER {
                if !staged.contains_key(name) {
                    staged.insert(name.to_string(), ToolEntry::from(FinalAnswerTool));
                }
                continue;
            }
            if staged.contains_key(name) {
                return Err(ToolboxError::Duplicate(name.to_string()));
            }
            staged.insert(name.to_string(), ToolEntry::Deferred(reference.clone()));
        }
        self.commit(staged)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        match self.entries.get(name) {
            Some(ToolEntry::Concrete(t)) => Some(t.clone()),
            _ => None,
        }
    }

    pub fn entry(&self, name: &str) -> Option<&ToolEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 全部已物化的工具
    pub fn tools(&self) -> impl Iterator<Item = (&str, &Arc<dyn Tool>)> {
        self.entries.iter().filter_map(|(name, entry)| match entry {
            ToolEntry::Concrete(t) => Some((name.as_str(), t)),
            ToolEntry::Deferred(_) => None,
        })
    }

    /// 按模板渲染全部工具描述（按名称顺序拼接）
    pub fn describe(&self, template: Option<&str>) -> String {
        let template = template.unwrap_or(DEFAULT_TOOL_DESCRIPTION_TEMPLATE);
        self.entries
            .values()
            .map(|entry| describe_entry(entry, template))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Display for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Toolbox contents:")?;
        for entry in self.entries.values() {
            writeln!(f, "\t{}: {}", entry.name(), entry.description())?;
        }
        Ok(())
    }
}
