//! 延迟工具解析
//!
//! ToolLoader 是「task id / repo id -> 具体工具」的边界；TaskToolLoader 按解析键查工厂函数。

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::ToolboxError;
use crate::tools::{Tool, ToolReference};

/// 把延迟引用解析成具体工具
pub trait ToolLoader: Send + Sync {
    fn load(&self, reference: &ToolReference) -> Result<Arc<dyn Tool>, ToolboxError>;
}

/// 由引用元数据构造工具的工厂
pub type ToolFactory = Arc<dyn Fn(&ToolReference) -> Arc<dyn Tool> + Send + Sync>;

/// 按解析键（repo_id 优先，否则 task）查找工厂
#[derive(Clone, Default)]
pub struct TaskToolLoader {
    factories: HashMap<String, ToolFactory>,
}

impl TaskToolLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory<F>(mut self, key: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ToolReference) -> Arc<dyn Tool> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
        self
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.factories.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ToolLoader for TaskToolLoader {
    fn load(&self, reference: &ToolReference) -> Result<Arc<dyn Tool>, ToolboxError> {
        let key = reference.resolution_key();
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| ToolboxError::Unresolvable(key.to_string()))?;
        Ok(factory(reference))
    }
}
