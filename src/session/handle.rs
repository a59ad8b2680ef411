//! 会话句柄：两阶段身份
//!
//! ProvisionalHandle：Worker 报告真实 ID 之前，所有写入落在 `pending-<uuid>` 目录。
//! ResolvedHandle：真实 ID 已知，目录名即真实 ID。
//! 只能由 SessionStore 通过一次目录 rename 完成 Provisional -> Resolved 的转换。

use std::path::{Path, PathBuf};

use crate::ids;

pub const TRANSCRIPT_FILE: &str = "transcript.log";
pub const SNAPSHOT_FILE: &str = "conversation.json";
pub const SUMMARY_FILE: &str = "summary.json";

/// 临时句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalHandle {
    id: String,
    dir: PathBuf,
}

impl ProvisionalHandle {
    pub(crate) fn allocate(root: &Path) -> Self {
        let id = ids::new_provisional_session_id();
        Self {
            dir: root.join(&id),
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 真实 ID 对应的句柄（同一根目录下）；调用方负责把目录 rename 过去
    pub(crate) fn resolve(&self, true_id: &str) -> ResolvedHandle {
        ResolvedHandle::at(sibling(&self.dir, true_id), true_id)
    }
}

/// 已确定真实 ID 的句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHandle {
    id: String,
    dir: PathBuf,
}

impl ResolvedHandle {
    pub(crate) fn at(dir: PathBuf, id: &str) -> Self {
        Self {
            id: id.to_string(),
            dir,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Worker 续接时报告了新的 ID：整个会话目录迁到新 ID 下
    pub(crate) fn rehome(&self, new_id: &str) -> ResolvedHandle {
        ResolvedHandle::at(sibling(&self.dir, new_id), new_id)
    }
}

fn sibling(dir: &Path, id: &str) -> PathBuf {
    match dir.parent() {
        Some(parent) => parent.join(id),
        None => PathBuf::from(id),
    }
}

/// 会话当前所处阶段的句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionHandle {
    Provisional(ProvisionalHandle),
    Resolved(ResolvedHandle),
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        match self {
            Self::Provisional(h) => h.id(),
            Self::Resolved(h) => h.id(),
        }
    }

    pub fn dir(&self) -> &Path {
        match self {
            Self::Provisional(h) => h.dir(),
            Self::Resolved(h) => h.dir(),
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }

    /// 真实 ID（仍是临时句柄时为 None）
    pub fn true_id(&self) -> Option<&str> {
        match self {
            Self::Provisional(_) => None,
            Self::Resolved(h) => Some(h.id()),
        }
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.dir().join(TRANSCRIPT_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir().join(SNAPSHOT_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir().join(SUMMARY_FILE)
    }
}
