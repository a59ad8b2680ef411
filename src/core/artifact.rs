//! 必需产物：位置、存在性检查与 summary 内容读取
//!
//! summary 角色：`<sessions>/<trueId>/summary.json`；规划角色：`<runs>/<runId>/plan.json`。
//! 完成判定只看文件是否存在。

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::agents::ArtifactRequirement;
use crate::session::SessionHandle;
use crate::tools::{PLAN_TOOL, SUMMARY_TOOL};
use crate::workflow::{TaskTracker, TrackerError};

/// 期望的产物位置；不需要产物时为 None
pub fn expected_path(
    requirement: ArtifactRequirement,
    handle: &SessionHandle,
    tracker: &TaskTracker,
    run_id: Option<&str>,
) -> Result<Option<PathBuf>, TrackerError> {
    match requirement {
        ArtifactRequirement::None => Ok(None),
        ArtifactRequirement::Summary => Ok(Some(handle.summary_path())),
        ArtifactRequirement::Plan => match run_id {
            Some(run_id) => tracker.plan_path(run_id).map(Some),
            None => Ok(None),
        },
    }
}

pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// 产物对应的写入工具
pub fn producing_tool(requirement: ArtifactRequirement) -> Option<&'static str> {
    match requirement {
        ArtifactRequirement::None => None,
        ArtifactRequirement::Summary => Some(SUMMARY_TOOL),
        ArtifactRequirement::Plan => Some(PLAN_TOOL),
    }
}

/// summary.json 中调度关心的字段（其余字段忽略）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryArtifact {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
}

/// 读取 summary.json；不存在或无法解析时返回 None
pub async fn read_summary(path: &Path) -> Option<SummaryArtifact> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(summary) => Some(summary),
        Err(e) => {
            tracing::warn!(path = %path.display(), "unreadable summary artifact: {}", e);
            None
        }
    }
}
