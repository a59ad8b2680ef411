//! 任务追踪器
//!
//! 布局：`<runs>/<runId>/plan.json`（只写一次）、`progress.json`（最新投影）、
//! `revisions/<n>.json`（已提交修订的日志）。
//!
//! 状态迁移是乐观 CAS：读取修订 n，校验前置条件，把修订 n+1 以硬链接方式提交到日志
//! （文件已存在即冲突，重读后重新校验），再刷新 progress.json。
//! 读取时沿日志向前滚动，提交与刷新之间崩溃也不会丢失已提交的修订。
//!
//! 日志压缩：progress.json 刷新成功后删除低于 n-1 的条目（按编号升序删除）。因此
//! 「条目 k+1 已删除」蕴含「条目 k 已删除」，据此：
//! - 提交 n 后若 n-1 已不存在，说明 n 是被压缩掉的旧编号，撤销并按冲突处理；
//! - 读者滚动停在 n 而 n 的条目已不存在时，说明起点过旧，改为扫描日志目录取最大修订。

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;

use crate::fs_atomic;
use crate::ids;
use crate::workflow::graph::validate_tasks;
use crate::workflow::types::*;

pub const PLAN_FILE: &str = "plan.json";
pub const PROGRESS_FILE: &str = "progress.json";
pub const REVISIONS_DIR: &str = "revisions";

const MAX_COMMIT_ATTEMPTS: usize = 32;

/// 任务追踪器
#[derive(Debug, Clone)]
pub struct TaskTracker {
    root: PathBuf,
}

impl TaskTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf, TrackerError> {
        if !ids::is_valid_id(run_id) {
            return Err(TrackerError::InvalidId(run_id.to_string()));
        }
        Ok(self.root.join(run_id))
    }

    /// plan.json 的路径（规划 Agent 的产物位置）
    pub fn plan_path(&self, run_id: &str) -> Result<PathBuf, TrackerError> {
        Ok(self.run_dir(run_id)?.join(PLAN_FILE))
    }

    fn revision_path(&self, run_id: &str, revision: u64) -> Result<PathBuf, TrackerError> {
        Ok(self
            .run_dir(run_id)?
            .join(REVISIONS_DIR)
            .join(format!("{}.json", revision)))
    }

    /// 创建计划：先校验，任何拒绝都不会写盘
    pub async fn create_plan(&self, run_id: &str, tasks: Vec<Task>) -> Result<Progress, TrackerError> {
        self.commit_plan(Plan::new(run_id, tasks)).await
    }

    /// 写入已构建的计划及初始进度
    pub async fn commit_plan(&self, plan: Plan) -> Result<Progress, TrackerError> {
        let dir = self.run_dir(&plan.run_id)?;
        validate_tasks(&plan.tasks)?;

        create_dir(&dir.join(REVISIONS_DIR)).await?;
        let path = dir.join(PLAN_FILE);
        let created = fs_atomic::write_new(&path, &to_json(&path, &plan)?)
            .await
            .map_err(|source| TrackerError::Io {
                path: path.clone(),
                source,
            })?;
        if !created {
            return Err(TrackerError::PlanExists(plan.run_id));
        }

        let progress = Progress::from_plan(&plan);
        self.commit(&progress).await?;
        tracing::info!(run_id = %plan.run_id, tasks = plan.tasks.len(), "plan created");
        Ok(progress)
    }

    /// 接管外部（规划 Agent）写好的 plan.json：校验后建立初始进度。
    /// 进度已存在时直接返回当前进度。
    pub async fn adopt_plan(&self, run_id: &str) -> Result<Progress, TrackerError> {
        match self.load_progress(run_id).await {
            Err(TrackerError::RunNotFound(_)) => {}
            other => return other,
        }
        let plan = self.load_plan(run_id).await?;
        if plan.run_id != run_id {
            return Err(TrackerError::RunMismatch {
                run_id: run_id.to_string(),
                found: plan.run_id,
            });
        }
        validate_tasks(&plan.tasks)?;

        create_dir(&self.run_dir(run_id)?.join(REVISIONS_DIR)).await?;
        let progress = Progress::from_plan(&plan);
        if !self.commit(&progress).await? {
            // 并发接管：另一方已提交修订 0
            return self.load_progress(run_id).await;
        }
        tracing::info!(run_id = %run_id, tasks = plan.tasks.len(), "adopted plan");
        Ok(progress)
    }

    pub async fn load_plan(&self, run_id: &str) -> Result<Plan, TrackerError> {
        let path = self.plan_path(run_id)?;
        read_json(&path)
            .await?
            .ok_or_else(|| TrackerError::RunNotFound(run_id.to_string()))
    }

    /// 最新已提交的进度
    pub async fn load_progress(&self, run_id: &str) -> Result<Progress, TrackerError> {
        let dir = self.run_dir(run_id)?;
        let mut progress: Progress = match read_json(&dir.join(PROGRESS_FILE)).await? {
            Some(progress) => progress,
            None => self.latest_revision(run_id).await?,
        };

        loop {
            progress = self.roll_forward(run_id, progress).await?;
            if fs::try_exists(self.revision_path(run_id, progress.revision)?)
                .await
                .unwrap_or(false)
            {
                return Ok(progress);
            }
            // 起点已被压缩掉
            tracing::debug!(run_id = %run_id, revision = progress.revision, "stale progress base, rescanning journal");
            let latest = self.latest_revision(run_id).await?;
            if latest.revision <= progress.revision {
                return Ok(progress);
            }
            progress = latest;
        }
    }

    async fn roll_forward(&self, run_id: &str, mut progress: Progress) -> Result<Progress, TrackerError> {
        loop {
            let next = self.revision_path(run_id, progress.revision + 1)?;
            match read_json::<Progress>(&next).await? {
                Some(newer) => progress = newer,
                None => return Ok(progress),
            }
        }
    }

    /// 日志中编号最大的修订
    async fn latest_revision(&self, run_id: &str) -> Result<Progress, TrackerError> {
        let revisions = self.journal_entries(run_id).await?;
        for revision in revisions.into_iter().rev() {
            if let Some(progress) = read_json(&self.revision_path(run_id, revision)?).await? {
                return Ok(progress);
            }
        }
        Err(TrackerError::RunNotFound(run_id.to_string()))
    }

    /// 日志条目编号（升序）；目录不存在时为空
    async fn journal_entries(&self, run_id: &str) -> Result<Vec<u64>, TrackerError> {
        let dir = self.run_dir(run_id)?.join(REVISIONS_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(TrackerError::Io { path: dir, source }),
        };
        let mut revisions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| TrackerError::Io {
            path: dir.clone(),
            source,
        })? {
            let name = entry.file_name();
            let revision = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u64>().ok());
            if let Some(revision) = revision {
                revisions.push(revision);
            }
        }
        revisions.sort_unstable();
        Ok(revisions)
    }

    /// 删除低于 `below` 的日志条目（升序），返回删除数量
    async fn compact(&self, run_id: &str, below: u64) -> Result<usize, TrackerError> {
        let mut removed = 0;
        for revision in self.journal_entries(run_id).await? {
            if revision >= below {
                break;
            }
            let path = self.revision_path(run_id, revision)?;
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(TrackerError::Io { path, source }),
            }
        }
        Ok(removed)
    }

    /// 提交 progress.revision 这一修订；该修订已被他人提交时返回 false
    async fn commit(&self, progress: &Progress) -> Result<bool, TrackerError> {
        let entry = self.revision_path(&progress.run_id, progress.revision)?;
        let json = to_json(&entry, progress)?;
        let committed = fs_atomic::write_new(&entry, &json)
            .await
            .map_err(|source| TrackerError::Io {
                path: entry.clone(),
                source,
            })?;
        if !committed {
            return Ok(false);
        }
        if progress.revision > 0 {
            let previous = self.revision_path(&progress.run_id, progress.revision - 1)?;
            if !fs::try_exists(&previous).await.unwrap_or(false) {
                // 基于已被压缩的旧修订
                let _ = fs::remove_file(&entry).await;
                return Ok(false);
            }
        }

        let path = self.run_dir(&progress.run_id)?.join(PROGRESS_FILE);
        if let Err(e) = fs_atomic::write_atomic(&path, &json).await {
            // 修订已在日志中，读者会向前滚动；此时不压缩
            tracing::warn!(run_id = %progress.run_id, revision = progress.revision, "failed to refresh progress document: {}", e);
            return Ok(true);
        }
        if progress.revision >= 2 {
            if let Err(e) = self.compact(&progress.run_id, progress.revision - 1).await {
                tracing::warn!(run_id = %progress.run_id, revision = progress.revision, "journal compaction failed: {}", e);
            }
        }
        Ok(true)
    }

    /// 读-校验-写。`apply` 返回 false 表示前置条件不成立；run 或任务不存在同样返回 false。
    async fn transition<F>(&self, run_id: &str, task_id: &str, apply: F) -> Result<bool, TrackerError>
    where
        F: Fn(&mut Task) -> bool,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut progress = match self.load_progress(run_id).await {
                Ok(progress) => progress,
                Err(TrackerError::RunNotFound(_)) => {
                    tracing::warn!(run_id = %run_id, task_id = %task_id, "transition on unknown run");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            };
            let Some(task) = progress.task_mut(task_id) else {
                tracing::warn!(run_id = %run_id, task_id = %task_id, "transition on unknown task");
                return Ok(false);
            };
            if !apply(task) {
                return Ok(false);
            }
            progress.revision += 1;
            progress.updated_at = Utc::now();
            if self.commit(&progress).await? {
                return Ok(true);
            }
            tracing::debug!(run_id = %run_id, task_id = %task_id, attempt, "revision conflict, re-reading progress");
            tokio::task::yield_now().await;
        }
        Err(TrackerError::Contention {
            run_id: run_id.to_string(),
            task_id: task_id.to_string(),
            attempts: MAX_COMMIT_ATTEMPTS,
        })
    }

    /// pending -> in_progress；任务不在 pending 时返回 false
    pub async fn mark_in_progress(&self, task_id: &str, run_id: &str) -> Result<bool, TrackerError> {
        let moved = self
            .transition(run_id, task_id, |task| {
                if task.state != TaskState::Pending {
                    return false;
                }
                task.state = TaskState::InProgress;
                task.started_at = Some(Utc::now());
                true
            })
            .await?;
        if moved {
            tracing::info!(run_id = %run_id, task_id = %task_id, "task in progress");
        }
        Ok(moved)
    }

    /// in_progress -> completed；任务不在 in_progress 时返回 false
    pub async fn mark_completed(
        &self,
        task_id: &str,
        run_id: &str,
        agent_session_id: Option<&str>,
        files_modified: &[String],
        summary: Option<&str>,
    ) -> Result<bool, TrackerError> {
        let moved = self
            .transition(run_id, task_id, |task| {
                if task.state != TaskState::InProgress {
                    return false;
                }
                task.state = TaskState::Completed;
                task.completed_at = Some(Utc::now());
                task.agent_session_id = agent_session_id.map(str::to_string);
                task.files_modified = files_modified.to_vec();
                task.summary = summary.map(str::to_string);
                true
            })
            .await?;
        if moved {
            tracing::info!(run_id = %run_id, task_id = %task_id, session_id = ?agent_session_id, "task completed");
        }
        Ok(moved)
    }

    pub async fn find_in_progress_by_run(&self, run_id: &str) -> Result<Option<Task>, TrackerError> {
        Ok(self.load_progress(run_id).await?.in_progress().cloned())
    }

    pub async fn ready_tasks(&self, run_id: &str) -> Result<Vec<Task>, TrackerError> {
        Ok(self
            .load_progress(run_id)
            .await?
            .ready_tasks()
            .into_iter()
            .cloned()
            .collect())
    }

    /// 含 plan.json 的 run（排序）
    pub async fn list_runs(&self) -> Result<Vec<RunId>, TrackerError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(TrackerError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };
        let mut runs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| TrackerError::Io {
            path: self.root.clone(),
            source,
        })? {
            if let Some(name) = entry.file_name().to_str() {
                if fs::try_exists(entry.path().join(PLAN_FILE)).await.unwrap_or(false) {
                    runs.push(name.to_string());
                }
            }
        }
        runs.sort();
        Ok(runs)
    }
}

async fn create_dir(path: &Path) -> Result<(), TrackerError> {
    fs::create_dir_all(path).await.map_err(|source| TrackerError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn to_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, TrackerError> {
    serde_json::to_vec_pretty(value).map_err(|source| TrackerError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// 文件不存在时返回 None
async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, TrackerError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(TrackerError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| TrackerError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}
