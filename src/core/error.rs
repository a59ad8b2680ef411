//! 编排层错误类型
//!
//! 会话错误（续接目标不存在、目录不可写）在调用开始时立即返回，不重试；
//! Worker 执行中的错误不走这里，而是变成失败的 InvocationResult（保留部分输出）。

use thiserror::Error;

use crate::session::SessionError;
use crate::workflow::TrackerError;

/// 控制面与编排器返回的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Task tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// run 中的任务指定了目录里不存在的 Agent
    #[error("Run {run_id}: task {task_id} designates unknown agent {agent}")]
    UnassignableTask {
        run_id: String,
        task_id: String,
        agent: String,
    },
}
