//! 会话存储
//!
//! 目录布局：`<sessions>/<id>/conversation.json`（完整快照，每条消息后原子重写）
//! 与 `<sessions>/<id>/transcript.log`（仅追加）。
//! 新会话先落在临时目录，Worker 报告真实 ID 后整体 rename 到真实 ID 下。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::{fs_atomic, ids};
use crate::session::handle::{ProvisionalHandle, ResolvedHandle, SessionHandle, SNAPSHOT_FILE};
use crate::session::Transcript;
use crate::worker::WorkerMessage;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("invalid session id: {0:?}")]
    InvalidId(String),

    #[error("session {0} never received a worker id and cannot be resumed")]
    Unresumable(String),

    #[error("cannot move session {from} to {target}: target already exists")]
    Conflict { from: String, target: String },

    #[error("session io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt session snapshot at {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 快照中的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub received_at: DateTime<Utc>,
    pub message: WorkerMessage,
}

/// conversation.json 的内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub agent_name: String,
    pub messages: Vec<SessionMessage>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// 续接时 Worker 换了 ID，旧 ID 记在这里
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_ids: Vec<String>,
}

impl SessionSnapshot {
    fn new(session_id: &str, agent_name: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            agent_name: agent_name.to_string(),
            messages: Vec::new(),
            created_at: now,
            last_updated: now,
            previous_ids: Vec::new(),
        }
    }

    /// 所有 assistant 文本按顺序拼接
    pub fn assistant_text(&self) -> String {
        self.messages
            .iter()
            .filter_map(|m| match &m.message {
                WorkerMessage::Assistant { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 正在进行中的会话
#[derive(Debug, Clone)]
pub struct ActiveSession {
    handle: SessionHandle,
    snapshot: SessionSnapshot,
    is_continuation: bool,
    prior_messages: usize,
}

impl ActiveSession {
    pub fn id(&self) -> &str {
        self.handle.id()
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn is_continuation(&self) -> bool {
        self.is_continuation
    }

    /// 本次调用开始前已持久化的消息数
    pub fn prior_messages(&self) -> usize {
        self.prior_messages
    }

    /// 当前目录下的 transcript；rename 之后需重新获取
    pub fn transcript(&self) -> Transcript {
        Transcript::new(self.handle.transcript_path())
    }
}

/// 会话存储
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_of(&self, id: &str) -> Result<PathBuf, SessionError> {
        if !ids::is_valid_id(id) {
            return Err(SessionError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(id))
    }

    /// 开启会话：给了 continue_id 则加载历史并标记为续接，否则分配临时会话
    pub async fn initialize_session(
        &self,
        continue_id: Option<&str>,
        agent_name: &str,
    ) -> Result<ActiveSession, SessionError> {
        match continue_id {
            Some(id) => {
                if ids::is_provisional(id) {
                    return Err(SessionError::Unresumable(id.to_string()));
                }
                let dir = self.dir_of(id)?;
                let snapshot = self.load(id).await?;
                let prior_messages = snapshot.messages.len();
                tracing::info!(session_id = %id, agent = %agent_name, prior_messages, "resuming session");
                Ok(ActiveSession {
                    handle: SessionHandle::Resolved(ResolvedHandle::at(dir, id)),
                    snapshot,
                    is_continuation: true,
                    prior_messages,
                })
            }
            None => {
                let provisional = ProvisionalHandle::allocate(&self.root);
                fs::create_dir_all(provisional.dir())
                    .await
                    .map_err(|source| SessionError::Io {
                        path: provisional.dir().to_path_buf(),
                        source,
                    })?;
                let mut session = ActiveSession {
                    snapshot: SessionSnapshot::new(provisional.id(), agent_name),
                    handle: SessionHandle::Provisional(provisional),
                    is_continuation: false,
                    prior_messages: 0,
                };
                self.persist(&mut session).await?;
                tracing::debug!(session_id = %session.id(), agent = %agent_name, "allocated provisional session");
                Ok(session)
            }
        }
    }

    pub async fn exists(&self, id: &str) -> bool {
        match self.dir_of(id) {
            Ok(dir) => fs::try_exists(dir.join(SNAPSHOT_FILE)).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn load(&self, id: &str) -> Result<SessionSnapshot, SessionError> {
        let path = self.dir_of(id)?.join(SNAPSHOT_FILE);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(id.to_string()))
            }
            Err(source) => return Err(SessionError::Io { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|source| SessionError::Corrupt { path, source })
    }

    /// 追加一条消息并立即重写快照
    pub async fn append_message(
        &self,
        session: &mut ActiveSession,
        message: WorkerMessage,
    ) -> Result<(), SessionError> {
        session.snapshot.messages.push(SessionMessage {
            received_at: Utc::now(),
            message,
        });
        self.persist(session).await
    }

    /// 原子重写快照（临时文件 + rename）
    pub async fn persist(&self, session: &mut ActiveSession) -> Result<(), SessionError> {
        session.snapshot.last_updated = Utc::now();
        let path = session.handle.snapshot_path();
        let json = serde_json::to_vec_pretty(&session.snapshot).map_err(|source| SessionError::Corrupt {
            path: path.clone(),
            source,
        })?;
        fs_atomic::write_atomic(&path, &json)
            .await
            .map_err(|source| SessionError::Io {
                path: path.clone(),
                source,
            })
    }

    /// 用 Worker 报告的真实 ID 重命名会话目录。ID 未变化时返回 false。
    pub async fn reconcile_true_id(
        &self,
        session: &mut ActiveSession,
        true_id: &str,
    ) -> Result<bool, SessionError> {
        if !ids::is_valid_id(true_id) || ids::is_provisional(true_id) {
            return Err(SessionError::InvalidId(true_id.to_string()));
        }
        let from = session.id().to_string();
        if from == true_id {
            return Ok(false);
        }

        let (target, rehomed) = match &session.handle {
            SessionHandle::Provisional(p) => (p.resolve(true_id), false),
            SessionHandle::Resolved(r) => (r.rehome(true_id), true),
        };
        if fs::try_exists(target.dir()).await.unwrap_or(false) {
            return Err(SessionError::Conflict {
                from,
                target: true_id.to_string(),
            });
        }
        fs::rename(session.handle.dir(), target.dir())
            .await
            .map_err(|source| SessionError::Io {
                path: target.dir().to_path_buf(),
                source,
            })?;

        if rehomed {
            session.snapshot.previous_ids.push(from.clone());
        }
        session.snapshot.session_id = true_id.to_string();
        session.handle = SessionHandle::Resolved(target);
        self.persist(session).await?;

        tracing::info!(session_id = %true_id, previous = %from, rehomed, "session id reconciled");
        Ok(true)
    }

    /// 已持久化的会话 ID（排序）
    pub async fn list_sessions(&self) -> Result<Vec<String>, SessionError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };
        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| SessionError::Io {
            path: self.root.clone(),
            source,
        })? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if fs::try_exists(entry.path().join(SNAPSHOT_FILE)).await.unwrap_or(false) {
                sessions.push(name);
            }
        }
        sessions.sort();
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_new_session_is_provisional_and_persisted() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        let session = store.initialize_session(None, "developer").await.unwrap();
        assert!(session.handle().is_provisional());
        assert!(!session.is_continuation());
        assert!(session.handle().snapshot_path().exists());
        assert_eq!(session.snapshot().agent_name, "developer");
    }

    #[tokio::test]
    async fn test_reconcile_moves_directory() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = store.initialize_session(None, "developer").await.unwrap();
        let provisional_dir = session.handle().dir().to_path_buf();

        session.transcript().new_session(session.id(), "developer").await.unwrap();
        store
            .append_message(&mut session, WorkerMessage::init("true-1"))
            .await
            .unwrap();
        assert!(store.reconcile_true_id(&mut session, "true-1").await.unwrap());
        assert!(!store.reconcile_true_id(&mut session, "true-1").await.unwrap());

        assert!(!provisional_dir.exists());
        assert_eq!(session.handle().dir(), dir.path().join("true-1"));
        assert!(dir.path().join("true-1").join("transcript.log").exists());

        let loaded = store.load("true-1").await.unwrap();
        assert_eq!(loaded.session_id, "true-1");
        assert_eq!(loaded.messages.len(), 1);
        assert!(loaded.previous_ids.is_empty());
        assert_eq!(store.list_sessions().await.unwrap(), vec!["true-1".to_string()]);
    }

    #[tokio::test]
    async fn test_resume_loads_history_and_rehomes() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let mut first = store.initialize_session(None, "developer").await.unwrap();
        store.reconcile_true_id(&mut first, "s-1").await.unwrap();
        store
            .append_message(&mut first, WorkerMessage::assistant("one"))
            .await
            .unwrap();

        let mut resumed = store.initialize_session(Some("s-1"), "developer").await.unwrap();
        assert!(resumed.is_continuation());
        assert_eq!(resumed.prior_messages(), 1);

        store.reconcile_true_id(&mut resumed, "s-2").await.unwrap();
        assert!(!store.exists("s-1").await);
        let loaded = store.load("s-2").await.unwrap();
        assert_eq!(loaded.previous_ids, vec!["s-1".to_string()]);
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_errors() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(matches!(
            store.initialize_session(Some("missing"), "dev").await,
            Err(SessionError::NotFound(id)) if id == "missing"
        ));
        assert!(matches!(
            store.initialize_session(Some("../escape"), "dev").await,
            Err(SessionError::InvalidId(_))
        ));
        assert!(matches!(
            store.initialize_session(Some("pending-abc"), "dev").await,
            Err(SessionError::Unresumable(_))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_conflict_keeps_provisional() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("taken")).unwrap();

        let mut session = store.initialize_session(None, "developer").await.unwrap();
        let err = store.reconcile_true_id(&mut session, "taken").await.unwrap_err();
        assert!(matches!(err, SessionError::Conflict { .. }));
        assert!(session.handle().is_provisional());
        assert!(session.handle().dir().exists());
    }
}
