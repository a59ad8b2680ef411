//! 任务计划类型定义
//!
//! Plan：只写一次的计划文档（任务、依赖、元数据）。
//! Progress：可变投影，带单调递增的 revision，是调度的唯一事实来源。

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type RunId = String;
pub type TaskId = String;

/// 任务状态：pending -> in_progress -> completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// 等待执行
    #[default]
    Pending,
    /// 已被某个 Agent 领取
    InProgress,
    /// 已完成
    Completed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

/// 计划中的任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub title: String,
    pub designated_agent: String,
    /// 交给 Agent 的指令
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub files_to_modify: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, designated_agent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            designated_agent: designated_agent.into(),
            instructions: String::new(),
            state: TaskState::Pending,
            dependencies: Vec::new(),
            files_to_modify: Vec::new(),
            started_at: None,
            completed_at: None,
            agent_session_id: None,
            files_modified: Vec::new(),
            summary: None,
        }
    }

    /// 计划中的原始形态（清除运行期字段）
    fn planned(mut self) -> Self {
        self.state = TaskState::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.agent_session_id = None;
        self.files_modified.clear();
        self.summary = None;
        self
    }
}

/// plan.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Plan {
    pub fn new(run_id: impl Into<RunId>, tasks: Vec<Task>) -> Self {
        Self {
            run_id: run_id.into(),
            created_at: Utc::now(),
            tasks: tasks.into_iter().map(Task::planned).collect(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// progress.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub run_id: RunId,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl Progress {
    /// 计划对应的初始进度（revision 0）
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            run_id: plan.run_id.clone(),
            revision: 0,
            updated_at: Utc::now(),
            tasks: plan.tasks.iter().cloned().map(Task::planned).collect(),
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// 依赖全部完成的 pending 任务（计划顺序）
    pub fn ready_tasks(&self) -> Vec<&Task> {
        let completed: HashSet<&str> = self
            .tasks
            .iter()
            .filter(|t| t.state == TaskState::Completed)
            .map(|t| t.id.as_str())
            .collect();
        self.tasks
            .iter()
            .filter(|t| t.state == TaskState::Pending)
            .filter(|t| t.dependencies.iter().all(|d| completed.contains(d.as_str())))
            .collect()
    }

    pub fn in_progress(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.state == TaskState::InProgress)
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.tasks.iter().filter(|t| t.state == state).count()
    }

    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.state == TaskState::Completed)
    }
}

/// 任务追踪错误
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<TaskId>),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("duplicate task id {0}")]
    DuplicateTask(TaskId),

    #[error("invalid id {0:?}")]
    InvalidId(String),

    #[error("run {0} not found")]
    RunNotFound(RunId),

    #[error("run {0} already has a plan")]
    PlanExists(RunId),

    #[error("plan in run {run_id} belongs to run {found}")]
    RunMismatch { run_id: RunId, found: RunId },

    #[error("run {run_id}: task {task_id} still contended after {attempts} attempts")]
    Contention {
        run_id: RunId,
        task_id: TaskId,
        attempts: usize,
    },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt document at {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
