//! Worker 层：外部 Agent 进程边界（消息形状、调用抽象、子进程实现、脚本化测试实现）

pub mod cli;
pub mod message;
pub mod mock;
pub mod traits;

pub use cli::{parse_stream_line, CliWorker};
pub use message::WorkerMessage;
pub use mock::{ScriptStep, ScriptedWorker};
pub use traits::{MessageStream, Worker, WorkerError, WorkerRequest};
