//! 权限缓存
//!
//! 显式的缓存对象：TTL 与时钟在构造时注入，测试可用 ManualClock 精确控制过期。
//! 条目计算完成后不可变，过期只影响「是否直接命中」，降级时仍可读取旧条目。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use crate::agents::AgentRole;
use crate::permissions::engine::PermissionResult;

/// 时间源
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟（测试用）
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 缓存键：(角色, 排序去重后的请求工具)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    role: AgentRole,
    requested: Vec<String>,
}

impl CacheKey {
    pub fn new(role: &AgentRole, requested: &[String]) -> Self {
        let mut requested = requested.to_vec();
        requested.sort();
        requested.dedup();
        Self {
            role: role.clone(),
            requested,
        }
    }
}

/// 进程级权限缓存
#[derive(Debug)]
pub struct PermissionCache {
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<CacheKey, Arc<PermissionResult>>>,
}

impl PermissionCache {
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_system_clock(ttl: std::time::Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn is_fresh(&self, entry: &PermissionResult, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.generated_at) <= self.ttl
    }

    /// 未过期条目
    pub fn get_fresh(&self, key: &CacheKey) -> Option<Arc<PermissionResult>> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .cloned()
    }

    /// 任意条目（含已过期），供降级使用
    pub fn get_any(&self, key: &CacheKey) -> Option<Arc<PermissionResult>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, result: Arc<PermissionResult>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, result);
    }

    /// 清除过期条目，返回清除数量
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| now.signed_duration_since(entry.generated_at) <= self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
