//! Hive 控制面
//!
//! 供监督进程调用的门面：按名称调用 Agent、列出 Agent、创建计划、任务状态迁移与查询，
//! 以及按依赖顺序逐个执行就绪任务的 drive_run（同一 run 内一次只跑一个 Worker）。
//! 「下一步派给谁」这类判断属于外部监督者，drive_run 只实现确定性的就绪任务循环。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::agents::{AgentCatalog, ArtifactRequirement, RoleClass};
use crate::config::AppConfig;
use crate::core::artifact;
use crate::core::{AgentError, ArtifactStatus, InvocationOrchestrator, InvocationRequest, InvocationResult};
use crate::permissions::{PermissionCache, PermissionEngine};
use crate::session::SessionStore;
use crate::tools::ToolRegistry;
use crate::worker::Worker;
use crate::workflow::{Progress, RunId, Task, TaskId, TaskState, TaskTracker};

/// listAgents 的条目
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub name: String,
    pub description: String,
    pub role: RoleClass,
    pub artifact: ArtifactRequirement,
    pub allowed_tools: Vec<String>,
    /// 目录中不认识的工具（照样请求，不会被丢弃）
    pub unknown_tools: Vec<String>,
}

/// drive_run 中失败的任务（保持 in_progress，交由监督者处理）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTask {
    pub task_id: TaskId,
    pub session_id: String,
    pub error: String,
}

/// drive_run 的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: RunId,
    pub completed: Vec<TaskId>,
    pub failed: Option<FailedTask>,
    /// 未完成的任务数
    pub remaining: usize,
    pub cancelled: bool,
}

/// 控制面
pub struct Hive {
    catalog: AgentCatalog,
    orchestrator: InvocationOrchestrator,
    tracker: TaskTracker,
}

impl Hive {
    pub fn new(cfg: &AppConfig, catalog: AgentCatalog, worker: Arc<dyn Worker>) -> Self {
        let cache = PermissionCache::with_system_clock(Duration::from_secs(cfg.permissions.cache_ttl_secs));
        let permissions = PermissionEngine::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(cache),
            cfg.permissions.baseline_deny.iter().cloned(),
        );
        let tracker = TaskTracker::new(&cfg.storage.runs_dir);
        let orchestrator = InvocationOrchestrator::new(
            worker,
            Arc::new(permissions),
            SessionStore::new(&cfg.storage.sessions_dir),
            tracker.clone(),
            cfg.timeouts.clone(),
        );
        Self {
            catalog,
            orchestrator,
            tracker,
        }
    }

    /// 内置 Agent + [agents].definitions_dir 中的定义
    pub fn from_config(cfg: &AppConfig, worker: Arc<dyn Worker>) -> anyhow::Result<Self> {
        let catalog = AgentCatalog::load(cfg.agents.definitions_dir.as_deref())?;
        tracing::info!(agents = catalog.len(), "agent catalog loaded");
        Ok(Self::new(cfg, catalog, worker))
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn sessions(&self) -> &SessionStore {
        self.orchestrator.sessions()
    }

    pub fn list_agents(&self) -> Vec<AgentSummary> {
        let report = self.catalog.validation_report();
        self.catalog
            .iter()
            .map(|def| AgentSummary {
                name: def.name.clone(),
                description: def.description.clone(),
                role: def.role,
                artifact: def.artifact(),
                allowed_tools: def.allowed_tools.clone(),
                unknown_tools: report
                    .get(&def.name)
                    .map(|v| v.unknown.clone())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// 按名称调用 Agent；resume_id 为真实会话 ID
    pub async fn invoke_agent(
        &self,
        name: &str,
        prompt: &str,
        resume_id: Option<&str>,
    ) -> Result<InvocationResult, AgentError> {
        let definition = self
            .catalog
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownAgent(name.to_string()))?;
        let mut request = InvocationRequest::new(definition, prompt);
        if let Some(id) = resume_id {
            request = request.resume(id);
        }
        self.orchestrator.invoke(request, CancellationToken::new()).await
    }

    /// 完整参数（run / task 关联、取消令牌）
    pub async fn invoke(
        &self,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> Result<InvocationResult, AgentError> {
        self.orchestrator.invoke(request, cancel).await
    }

    pub async fn create_plan(&self, run_id: &str, tasks: Vec<Task>) -> Result<Progress, AgentError> {
        Ok(self.tracker.create_plan(run_id, tasks).await?)
    }

    pub async fn load_progress(&self, run_id: &str) -> Result<Progress, AgentError> {
        Ok(self.tracker.load_progress(run_id).await?)
    }

    pub async fn mark_task_in_progress(&self, task_id: &str, run_id: &str) -> Result<bool, AgentError> {
        Ok(self.tracker.mark_in_progress(task_id, run_id).await?)
    }

    pub async fn mark_task_completed(
        &self,
        task_id: &str,
        run_id: &str,
        agent_session_id: Option<&str>,
        files_modified: &[String],
        summary: Option<&str>,
    ) -> Result<bool, AgentError> {
        Ok(self
            .tracker
            .mark_completed(task_id, run_id, agent_session_id, files_modified, summary)
            .await?)
    }

    pub async fn find_in_progress_task(&self, run_id: &str) -> Result<Option<Task>, AgentError> {
        Ok(self.tracker.find_in_progress_by_run(run_id).await?)
    }

    pub async fn ready_tasks(&self, run_id: &str) -> Result<Vec<Task>, AgentError> {
        Ok(self.tracker.ready_tasks(run_id).await?)
    }

    pub async fn list_runs(&self) -> Result<Vec<RunId>, AgentError> {
        Ok(self.tracker.list_runs().await?)
    }

    /// 依次执行就绪任务直到全部完成、某个任务失败、没有就绪任务或被取消
    pub async fn drive_run(&self, run_id: &str, cancel: CancellationToken) -> Result<RunReport, AgentError> {
        let progress = self.tracker.adopt_plan(run_id).await?;
        for task in &progress.tasks {
            if self.catalog.get(&task.designated_agent).is_none() {
                return Err(AgentError::UnassignableTask {
                    run_id: run_id.to_string(),
                    task_id: task.id.clone(),
                    agent: task.designated_agent.clone(),
                });
            }
        }
        if let Some(task) = progress.in_progress() {
            tracing::warn!(run_id = %run_id, task_id = %task.id, "task left in progress by an earlier driver");
        }

        let mut report = RunReport {
            run_id: run_id.to_string(),
            completed: Vec::new(),
            failed: None,
            remaining: 0,
            cancelled: false,
        };

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(task) = self.tracker.ready_tasks(run_id).await?.into_iter().next() else {
                break;
            };
            if !self.tracker.mark_in_progress(&task.id, run_id).await? {
                continue;
            }
            let definition = self
                .catalog
                .get(&task.designated_agent)
                .cloned()
                .ok_or_else(|| AgentError::UnknownAgent(task.designated_agent.clone()))?;

            tracing::info!(run_id = %run_id, task_id = %task.id, agent = %definition.name, "dispatching task");
            let request = InvocationRequest::new(definition, task_prompt(&task)).for_task(run_id, &task.id);
            let result = self.orchestrator.invoke(request, cancel.clone()).await?;

            if !result.success {
                tracing::warn!(run_id = %run_id, task_id = %task.id, session_id = %result.session_id, "task failed");
                report.failed = Some(FailedTask {
                    task_id: task.id.clone(),
                    session_id: result.session_id.clone(),
                    error: result.error.clone().unwrap_or_default(),
                });
                break;
            }

            let summary = match (&result.artifact, &result.artifact_path) {
                (ArtifactStatus::Found, Some(path)) => artifact::read_summary(path).await.unwrap_or_default(),
                _ => Default::default(),
            };
            let summary_text = summary
                .summary
                .or_else(|| Some(result.output.clone()).filter(|s| !s.trim().is_empty()));
            self.tracker
                .mark_completed(
                    &task.id,
                    run_id,
                    Some(result.session_id.as_str()),
                    &summary.files_modified,
                    summary_text.as_deref(),
                )
                .await?;
            report.completed.push(task.id);
        }

        let progress = self.tracker.load_progress(run_id).await?;
        report.remaining = progress.tasks.len() - progress.count(TaskState::Completed);
        tracing::info!(
            run_id = %run_id,
            completed = report.completed.len(),
            remaining = report.remaining,
            "run driver stopped"
        );
        Ok(report)
    }
}

/// 交给 Agent 的任务 prompt
fn task_prompt(task: &Task) -> String {
    let mut prompt = if task.title.is_empty() {
        format!("# Task {}\n", task.id)
    } else {
        format!("# Task {}: {}\n", task.id, task.title)
    };
    if !task.instructions.trim().is_empty() {
        prompt.push('\n');
        prompt.push_str(task.instructions.trim());
        prompt.push('\n');
    }
    if !task.files_to_modify.is_empty() {
        prompt.push_str(&format!("\nFiles to modify: {}\n", task.files_to_modify.join(", ")));
    }
    prompt
}
