//! 核心编排层：错误、调用阶段与结果、产物检查、调用编排器

pub mod artifact;
pub mod error;
pub mod orchestrator;
pub mod state;

pub use artifact::SummaryArtifact;
pub use error::AgentError;
pub use orchestrator::{InvocationOrchestrator, InvocationRequest};
pub use state::{ArtifactStatus, InvocationPhase, InvocationResult};
