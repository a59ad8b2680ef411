//! 权限引擎
//!
//! compute_permissions(requested, role)：
//! 1. 请求列表去重，并入角色隐式授权（需写 summary 的角色总能调用 SUMMARY_TOOL，规划角色总能调用 PLAN_TOOL）；
//! 2. disallowed = 已知工具 \ allowed，再并入 baseline 拒绝集（显式允许优先，从 baseline 中剔除）；
//! 3. 提示词中的禁用列表只取 disallowed 中不在 allowed 里的条目；
//! 4. 按 (role, 排序后的请求) 缓存，TTL 过期重算；目录不可用时退回旧缓存，否则退回最严格结果
//!    （只允许显式请求，内置目录中其余工具全部拒绝）。

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::agents::{AgentRole, ArtifactRequirement};
use crate::permissions::cache::{CacheKey, PermissionCache};
use crate::tools::{ToolRegistry, PLAN_TOOL, SUMMARY_TOOL};

#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("Capability catalog unavailable: {0}")]
    CatalogUnavailable(String),
}

/// 已知工具集合的来源（内置目录不会失败，动态来源可能失败）
pub trait CapabilitySource: Send + Sync {
    fn known_capabilities(&self) -> Result<BTreeSet<String>, PermissionError>;
}

impl CapabilitySource for ToolRegistry {
    fn known_capabilities(&self) -> Result<BTreeSet<String>, PermissionError> {
        Ok(self.tool_names())
    }
}

/// 一次权限计算的结果；allowed 与 disallowed 永不相交
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionResult {
    pub allowed_tools: BTreeSet<String>,
    pub disallowed_tools: BTreeSet<String>,
    pub generated_at: DateTime<Utc>,
    /// 注入 prompt 的禁用工具警告；无禁用工具时为 None
    pub restriction_prompt: Option<String>,
    /// 目录不可用时的降级结果
    pub degraded: bool,
}

impl PermissionResult {
    /// 写入 transcript 的一行摘要
    pub fn summary_line(&self) -> String {
        format!(
            "allowed={} disallowed={}{}",
            join(&self.allowed_tools),
            join(&self.disallowed_tools),
            if self.degraded { " (degraded)" } else { "" }
        )
    }
}

fn join(set: &BTreeSet<String>) -> String {
    if set.is_empty() {
        "-".to_string()
    } else {
        set.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

/// 权限引擎：持有工具来源、缓存与 baseline 拒绝集
pub struct PermissionEngine {
    source: Arc<dyn CapabilitySource>,
    cache: Arc<PermissionCache>,
    baseline_deny: BTreeSet<String>,
}

impl PermissionEngine {
    pub fn new<I, S>(source: Arc<dyn CapabilitySource>, cache: Arc<PermissionCache>, baseline_deny: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source,
            cache,
            baseline_deny: baseline_deny.into_iter().map(Into::into).collect(),
        }
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    pub fn compute_permissions(&self, requested: &[String], role: &AgentRole) -> Arc<PermissionResult> {
        let key = CacheKey::new(role, requested);
        if let Some(hit) = self.cache.get_fresh(&key) {
            tracing::debug!(agent = %role.name, "permission cache hit");
            return hit;
        }

        match self.source.known_capabilities() {
            Ok(known) => {
                let result = Arc::new(self.build(&known, requested, role));
                self.cache.insert(key, result.clone());
                tracing::debug!(
                    agent = %role.name,
                    allowed = result.allowed_tools.len(),
                    disallowed = result.disallowed_tools.len(),
                    "permissions computed"
                );
                result
            }
            Err(e) => {
                if let Some(stale) = self.cache.get_any(&key) {
                    tracing::warn!(agent = %role.name, "{}; serving previous permissions", e);
                    return stale;
                }
                tracing::warn!(agent = %role.name, "{}; falling back to explicit request only", e);
                Arc::new(self.restrictive(requested))
            }
        }
    }

    fn build(&self, known: &BTreeSet<String>, requested: &[String], role: &AgentRole) -> PermissionResult {
        let mut allowed: BTreeSet<String> = requested.iter().cloned().collect();
        allowed.extend(implicit_grants(role).iter().map(|s| s.to_string()));

        let mut disallowed: BTreeSet<String> = known.difference(&allowed).cloned().collect();
        disallowed.extend(self.baseline_deny.difference(&allowed).cloned());

        self.finish(allowed, disallowed, false)
    }

    /// 目录不可用且无旧缓存：只允许显式请求的工具，内置目录与 baseline 中其余全部拒绝
    fn restrictive(&self, requested: &[String]) -> PermissionResult {
        let allowed: BTreeSet<String> = requested.iter().cloned().collect();
        let mut denied = ToolRegistry::new().tool_names();
        denied.extend(self.baseline_deny.iter().cloned());
        let disallowed: BTreeSet<String> = denied.difference(&allowed).cloned().collect();
        self.finish(allowed, disallowed, true)
    }

    fn finish(&self, allowed: BTreeSet<String>, disallowed: BTreeSet<String>, degraded: bool) -> PermissionResult {
        let forbidden: Vec<&str> = disallowed
            .iter()
            .filter(|tool| !allowed.contains(*tool))
            .map(String::as_str)
            .collect();
        let restriction_prompt = restriction_text(&forbidden);
        PermissionResult {
            allowed_tools: allowed,
            disallowed_tools: disallowed,
            generated_at: self.cache.now(),
            restriction_prompt,
            degraded,
        }
    }
}

fn implicit_grants(role: &AgentRole) -> &'static [&'static str] {
    match role.artifact {
        ArtifactRequirement::Summary => &[SUMMARY_TOOL],
        ArtifactRequirement::Plan => &[PLAN_TOOL],
        ArtifactRequirement::None => &[],
    }
}

fn restriction_text(forbidden: &[&str]) -> Option<String> {
    if forbidden.is_empty() {
        return None;
    }
    Some(format!(
        "## Tool restrictions\n\
         The following tools are FORBIDDEN in this session: {}.\n\
         Do not call them or try to work around them; such calls are rejected. \
         If a step seems to require one of them, finish what you can and say so in your final answer.",
        forbidden.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::RoleClass;
    use crate::permissions::cache::ManualClock;
    use crate::tools::BASELINE_DENY;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct FlakySource {
        fail: AtomicBool,
    }

    impl CapabilitySource for FlakySource {
        fn known_capabilities(&self) -> Result<BTreeSet<String>, PermissionError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(PermissionError::CatalogUnavailable("registry offline".into()))
            } else {
                ToolRegistry::new().known_capabilities()
            }
        }
    }

    fn role(artifact: ArtifactRequirement) -> AgentRole {
        AgentRole {
            name: "developer".to_string(),
            class: RoleClass::Development,
            artifact,
        }
    }

    fn engine_with(source: Arc<dyn CapabilitySource>, clock: Arc<ManualClock>) -> PermissionEngine {
        let cache = Arc::new(PermissionCache::new(Duration::from_secs(60), clock));
        PermissionEngine::new(source, cache, BASELINE_DENY.iter().copied())
    }

    fn engine() -> (PermissionEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (engine_with(Arc::new(ToolRegistry::new()), clock.clone()), clock)
    }

    fn tools(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_allowed_and_disallowed_never_intersect() {
        let (engine, _) = engine();
        let requests = [
            tools(&[]),
            tools(&["Read"]),
            tools(&["Read", "Task", "Write", "mcp__x__custom"]),
            tools(BASELINE_DENY),
            ToolRegistry::new().tool_names().into_iter().collect(),
        ];
        for artifact in [ArtifactRequirement::None, ArtifactRequirement::Summary, ArtifactRequirement::Plan] {
            for requested in &requests {
                let result = engine.compute_permissions(requested, &role(artifact));
                assert!(result.allowed_tools.is_disjoint(&result.disallowed_tools));
            }
        }
    }

    #[test]
    fn test_baseline_denied_unless_explicitly_allowed() {
        let (engine, _) = engine();
        let result = engine.compute_permissions(&tools(&["Read", "Edit"]), &role(ArtifactRequirement::None));
        assert!(result.allowed_tools.contains("Edit"));
        assert!(!result.disallowed_tools.contains("Edit"));
        for name in BASELINE_DENY.iter().filter(|n| **n != "Edit") {
            assert!(result.disallowed_tools.contains(*name), "{name} should be denied");
        }
    }

    #[test]
    fn test_restriction_text_never_mentions_allowed_tools() {
        let (engine, _) = engine();
        let result = engine.compute_permissions(&tools(&["Task", "Read"]), &role(ArtifactRequirement::Summary));
        let text = result.restriction_prompt.as_deref().unwrap();
        assert!(text.contains("Write"));
        assert!(!text.contains("Task"));
        assert!(!text.contains(SUMMARY_TOOL));
    }

    #[test]
    fn test_implicit_grants_follow_artifact() {
        let (engine, _) = engine();
        let summary = engine.compute_permissions(&tools(&["Read"]), &role(ArtifactRequirement::Summary));
        assert!(summary.allowed_tools.contains(SUMMARY_TOOL));
        assert!(summary.disallowed_tools.contains(PLAN_TOOL));

        let plan = engine.compute_permissions(&tools(&["Read"]), &role(ArtifactRequirement::Plan));
        assert!(plan.allowed_tools.contains(PLAN_TOOL));
        assert!(plan.disallowed_tools.contains(SUMMARY_TOOL));
    }

    #[test]
    fn test_unknown_requested_tools_are_kept() {
        let (engine, _) = engine();
        let result = engine.compute_permissions(&tools(&["mcp__github__create_pr"]), &role(ArtifactRequirement::None));
        assert!(result.allowed_tools.contains("mcp__github__create_pr"));
    }

    #[test]
    fn test_cache_hit_then_refresh_after_ttl() {
        let (engine, clock) = engine();
        let requested = tools(&["Read", "Bash"]);
        let first = engine.compute_permissions(&requested, &role(ArtifactRequirement::Summary));

        clock.advance(chrono::Duration::seconds(10));
        let reordered = tools(&["Bash", "Read", "Bash"]);
        let second = engine.compute_permissions(&reordered, &role(ArtifactRequirement::Summary));
        assert!(Arc::ptr_eq(&first, &second));

        clock.advance(chrono::Duration::seconds(61));
        let third = engine.compute_permissions(&requested, &role(ArtifactRequirement::Summary));
        assert!(third.generated_at > first.generated_at);
        assert_eq!(third.allowed_tools, first.allowed_tools);
    }

    #[test]
    fn test_source_failure_serves_stale_entry() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let source = Arc::new(FlakySource {
            fail: AtomicBool::new(false),
        });
        let engine = engine_with(source.clone(), clock.clone());
        let requested = tools(&["Read"]);
        let fresh = engine.compute_permissions(&requested, &role(ArtifactRequirement::None));

        source.fail.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::seconds(120));
        let stale = engine.compute_permissions(&requested, &role(ArtifactRequirement::None));
        assert!(Arc::ptr_eq(&fresh, &stale));
        assert!(!stale.degraded);
    }

    #[test]
    fn test_source_failure_without_cache_is_restrictive() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let source = Arc::new(FlakySource {
            fail: AtomicBool::new(true),
        });
        let engine = engine_with(source, clock);
        let result = engine.compute_permissions(&tools(&["Read", "Write"]), &role(ArtifactRequirement::Summary));
        assert!(result.degraded);
        assert_eq!(
            result.allowed_tools,
            tools(&["Read", "Write"]).into_iter().collect::<BTreeSet<_>>()
        );
        assert!(result.disallowed_tools.contains("Task"));
        assert!(!result.disallowed_tools.contains("Write"));
        assert!(result.allowed_tools.is_disjoint(&result.disallowed_tools));
    }

    #[test]
    fn test_restrictive_fallback_denies_whole_catalog() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let source = Arc::new(FlakySource {
            fail: AtomicBool::new(true),
        });
        let engine = engine_with(source, clock);
        let result = engine.compute_permissions(&tools(&["Read"]), &role(ArtifactRequirement::Summary));
        assert!(result.degraded);
        for name in ["Bash", "WebFetch", "Glob", SUMMARY_TOOL] {
            assert!(result.disallowed_tools.contains(name), "{name} should be denied");
        }
        let expected: BTreeSet<String> = ToolRegistry::new()
            .tool_names()
            .into_iter()
            .chain(BASELINE_DENY.iter().map(|s| s.to_string()))
            .filter(|name| name != "Read")
            .collect();
        assert_eq!(result.disallowed_tools, expected);
        let text = result.restriction_prompt.as_deref().unwrap();
        assert!(text.contains("Bash"));
    }
}
