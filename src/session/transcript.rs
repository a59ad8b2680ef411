//! 会话 transcript（流式日志）
//!
//! 纯追加文本：新会话 / 续接会话标记、prompt、工具限制摘要、逐条消息、完成或错误页脚。
//! 每次写入都重新以 append 模式打开文件，因此会话目录被 rename 后后续写入自然跟随新路径；从不截断。

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::session::SessionError;
use crate::worker::WorkerMessage;

/// transcript 写入器，绑定到某一时刻的文件路径
#[derive(Debug, Clone)]
pub struct Transcript {
    path: PathBuf,
}

fn stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

impl Transcript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, text: &str) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(text.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)
    }

    pub async fn new_session(&self, session_id: &str, agent: &str) -> Result<(), SessionError> {
        self.append(&format!(
            "\n==== NEW SESSION {} agent={} at {} ====\n",
            session_id,
            agent,
            stamp()
        ))
        .await
    }

    pub async fn resumed_session(&self, session_id: &str, agent: &str, prior_messages: usize) -> Result<(), SessionError> {
        self.append(&format!(
            "\n==== RESUMED SESSION {} agent={} prior_messages={} at {} ====\n",
            session_id,
            agent,
            prior_messages,
            stamp()
        ))
        .await
    }

    pub async fn prompt(&self, prompt: &str) -> Result<(), SessionError> {
        self.append(&format!("---- PROMPT ----\n{}\n---- END PROMPT ----\n", prompt.trim_end()))
            .await
    }

    pub async fn tool_restrictions(&self, summary: &str) -> Result<(), SessionError> {
        self.append(&format!("---- TOOL RESTRICTIONS ----\n{}\n", summary)).await
    }

    pub async fn identity(&self, from: &str, to: &str) -> Result<(), SessionError> {
        self.append(&format!("---- SESSION ID {} (was {}) ----\n", to, from)).await
    }

    pub async fn message(&self, message: &WorkerMessage) -> Result<(), SessionError> {
        self.append(&format!("[{}] {}\n", stamp(), message.transcript_line())).await
    }

    pub async fn note(&self, text: &str) -> Result<(), SessionError> {
        self.append(&format!("---- {} ----\n", text)).await
    }

    pub async fn completed(&self, success: bool, artifact: &str) -> Result<(), SessionError> {
        self.append(&format!(
            "==== COMPLETED success={} artifact={} at {} ====\n",
            success,
            artifact,
            stamp()
        ))
        .await
    }

    pub async fn error(&self, message: &str) -> Result<(), SessionError> {
        self.append(&format!(
            "==== ERROR {} at {} ====\n",
            message.replace('\n', " "),
            stamp()
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_markers_are_appended_in_order() {
        let dir = TempDir::new().unwrap();
        let transcript = Transcript::new(dir.path().join("s1").join("transcript.log"));

        transcript.new_session("s1", "developer").await.unwrap();
        transcript.prompt("do the thing\n").await.unwrap();
        transcript.message(&WorkerMessage::assistant("ok")).await.unwrap();
        transcript.error("stream broke").await.unwrap();
        transcript.resumed_session("s1", "developer", 1).await.unwrap();
        transcript.completed(true, "found").await.unwrap();

        let content = std::fs::read_to_string(transcript.path()).unwrap();
        let new_at = content.find("NEW SESSION s1").unwrap();
        let prompt_at = content.find("do the thing").unwrap();
        let msg_at = content.find("assistant: ok").unwrap();
        let err_at = content.find("ERROR stream broke").unwrap();
        let resumed_at = content.find("RESUMED SESSION s1").unwrap();
        let done_at = content.find("COMPLETED success=true artifact=found").unwrap();
        assert!(new_at < prompt_at && prompt_at < msg_at && msg_at < err_at);
        assert!(err_at < resumed_at && resumed_at < done_at);
    }
}
