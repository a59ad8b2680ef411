//! 计划构建器
//!
//! 提供流畅的API来构建计划；build 时完成依赖校验

use serde_json::Value;

use crate::ids;
use crate::workflow::graph::validate_tasks;
use crate::workflow::types::*;

/// 计划构建器
pub struct PlanBuilder {
    run_id: RunId,
    tasks: Vec<Task>,
    metadata: Vec<(String, Value)>,
}

impl PlanBuilder {
    /// 为新 run 创建构建器
    pub fn new() -> Self {
        Self::for_run(ids::new_run_id())
    }

    pub fn for_run(run_id: impl Into<RunId>) -> Self {
        Self {
            run_id: run_id.into(),
            tasks: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// 添加任务
    pub fn task(mut self, id: impl Into<TaskId>, designated_agent: impl Into<String>, title: impl Into<String>) -> Self {
        let mut task = Task::new(id, designated_agent);
        task.title = title.into();
        self.tasks.push(task);
        self
    }

    fn with_task(mut self, id: &str, f: impl FnOnce(&mut Task)) -> Self {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            f(task);
        }
        self
    }

    /// 设置交给 Agent 的指令
    pub fn instructions(self, id: &str, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with_task(id, |t| t.instructions = text)
    }

    /// 设置依赖（全部完成后才可执行）
    pub fn depends_on(self, id: &str, deps: &[&str]) -> Self {
        self.with_task(id, |t| t.dependencies = deps.iter().map(|d| d.to_string()).collect())
    }

    /// 预计修改的文件
    pub fn modifies(self, id: &str, files: &[&str]) -> Self {
        self.with_task(id, |t| t.files_to_modify = files.iter().map(|f| f.to_string()).collect())
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// 构建计划
    pub fn build(self) -> Result<Plan, TrackerError> {
        if !ids::is_valid_id(&self.run_id) {
            return Err(TrackerError::InvalidId(self.run_id));
        }
        validate_tasks(&self.tasks)?;

        let mut plan = Plan::new(self.run_id, self.tasks);
        plan.metadata.extend(self.metadata);
        Ok(plan)
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}
