//! Worker 抽象
//!
//! 所有后端（子进程 CLI / 脚本化测试 Worker）实现 Worker：invoke 返回有序消息流。
//! 核心只依赖消息形状，不依赖具体传输。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::worker::WorkerMessage;

/// Worker 调用或流消费中的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Failed to start worker: {0}")]
    Spawn(String),

    #[error("Worker stream failed: {0}")]
    Stream(String),

    #[error("Worker exited with status {0:?}")]
    Exited(Option<i32>),
}

/// Worker 消息流
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<WorkerMessage, WorkerError>> + Send>>;

/// 单次 Worker 调用的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    pub agent: String,
    pub prompt: String,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    /// 续接的 Worker 会话 ID（真实 ID）
    pub resume_id: Option<String>,
}

#[async_trait]
pub trait Worker: Send + Sync {
    async fn invoke(&self, request: WorkerRequest) -> Result<MessageStream, WorkerError>;
}
