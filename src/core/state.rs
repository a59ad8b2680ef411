//! 调用状态：阶段与最终结果
//!
//! Init -> PermissionsComputed -> Streaming -> ArtifactCheck -> (CorrectiveRetry -> ArtifactCheck) -> Finalized

use std::path::PathBuf;

use serde::Serialize;

/// 单次调用所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationPhase {
    Init,
    PermissionsComputed,
    Streaming,
    ArtifactCheck,
    CorrectiveRetry,
    Finalized,
}

impl InvocationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::PermissionsComputed => "permissions_computed",
            Self::Streaming => "streaming",
            Self::ArtifactCheck => "artifact_check",
            Self::CorrectiveRetry => "corrective_retry",
            Self::Finalized => "finalized",
        }
    }
}

impl std::fmt::Display for InvocationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产物检查结果
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    NotRequired,
    Found,
    Missing,
}

impl ArtifactStatus {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Found | Self::NotRequired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequired => "not_required",
            Self::Found => "found",
            Self::Missing => "missing",
        }
    }
}

/// 一次调用的结果。success 反映主轮次，artifact 反映最后一次检查。
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub success: bool,
    pub session_id: String,
    pub agent: String,
    /// assistant 文本（失败时为已收到的部分）
    pub output: String,
    /// 必需产物已就位（不需要产物时也为 true）
    pub artifact_found: bool,
    pub artifact: ArtifactStatus,
    pub artifact_path: Option<PathBuf>,
    pub corrective_attempted: bool,
    pub run_id: Option<String>,
    pub error: Option<String>,
    /// 快照中的消息总数（含历史）
    pub message_count: usize,
}

impl InvocationResult {
    pub fn artifact_found(&self) -> bool {
        self.artifact_found
    }

    /// 调用成功但产物仍缺失：只是警告
    pub fn warning(&self) -> Option<String> {
        match (&self.artifact, &self.artifact_path) {
            (ArtifactStatus::Missing, Some(path)) if self.success => {
                Some(format!("required artifact missing at {}", path.display()))
            }
            (ArtifactStatus::Missing, None) if self.success => Some("required artifact missing".to_string()),
            _ => None,
        }
    }
}
