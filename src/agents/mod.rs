//! Agent 目录：角色类别、工具请求与产物要求

pub mod catalog;
pub mod definition;

pub use catalog::AgentCatalog;
pub use definition::{AgentDefinition, AgentRole, ArtifactRequirement, RoleClass};
