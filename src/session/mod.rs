//! 会话层：两阶段句柄、快照存储、流式 transcript

pub mod handle;
pub mod store;
pub mod transcript;

pub use handle::{ProvisionalHandle, ResolvedHandle, SessionHandle, SNAPSHOT_FILE, SUMMARY_FILE, TRANSCRIPT_FILE};
pub use store::{ActiveSession, SessionError, SessionMessage, SessionSnapshot, SessionStore};
pub use transcript::Transcript;
