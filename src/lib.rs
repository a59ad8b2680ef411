//! Hive - Rust 多 Agent 编排核心
//!
//! 模块划分：
//! - **agents**: Agent 目录（角色类别、请求的工具、必需产物）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 调用编排器、调用阶段与结果、产物检查
//! - **fs_atomic**: 原子写入与只写一次的文件创建
//! - **hive**: 控制面（调用 Agent、任务状态迁移、就绪任务驱动）
//! - **ids**: 会话 / run ID 生成与校验
//! - **observability**: tracing 初始化
//! - **permissions**: 按角色计算工具允许 / 拒绝集，带 TTL 缓存与降级
//! - **session**: 两阶段会话句柄、快照存储、流式 transcript
//! - **tools**: 工具能力目录与统计
//! - **worker**: 外部 Agent 进程边界（消息、子进程实现、脚本化测试实现）
//! - **workflow**: 计划 / 进度文档、依赖图、任务追踪器

pub mod agents;
pub mod config;
pub mod core;
pub mod fs_atomic;
pub mod hive;
pub mod ids;
pub mod observability;
pub mod permissions;
pub mod session;
pub mod tools;
pub mod worker;
pub mod workflow;

pub use crate::core::{AgentError, InvocationRequest, InvocationResult};
pub use crate::hive::{AgentSummary, Hive, RunReport};
