//! 权限层：按角色计算允许 / 拒绝工具集，带 TTL 缓存与降级

pub mod cache;
pub mod engine;

pub use cache::{CacheKey, Clock, ManualClock, PermissionCache, SystemClock};
pub use engine::{CapabilitySource, PermissionEngine, PermissionError, PermissionResult};
