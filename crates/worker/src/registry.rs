use std::collections::HashMap;
use std::sync::Arc;

use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::ActionHandler;

/// 按 `action` 名称查找外部操作实现，在启动时构建
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> SchedulerResult<()> {
        let action = handler.action().to_string();
        if action.trim().is_empty() {
            return Err(SchedulerError::config_error("action 名称不能为空"));
        }
        if self.handlers.contains_key(&action) {
            return Err(SchedulerError::config_error(format!(
                "action '{action}' 重复注册"
            )));
        }
        self.handlers.insert(action, handler);
        Ok(())
    }

    pub fn get(&self, action: &str) -> SchedulerResult<Arc<dyn ActionHandler>> {
        self.handlers
            .get(action)
            .cloned()
            .ok_or_else(|| SchedulerError::ActionNotRegistered(action.to_string()))
    }

    pub fn actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self.handlers.keys().cloned().collect();
        actions.sort();
        actions
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn ActionHandler>> {
        self.handlers.values()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}
