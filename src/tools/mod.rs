//! 工具能力目录：内置工具名、类别与默认拒绝集

pub mod catalog;
pub mod registry;

pub use catalog::{ToolCategory, BASELINE_DENY, INVOKE_AGENT_TOOL, PLAN_TOOL, SUMMARY_TOOL};
pub use registry::{ToolRegistry, ToolStatistics, ToolValidation};
