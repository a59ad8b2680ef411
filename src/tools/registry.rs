//! 工具注册表
//!
//! 基于 catalog 的只读查询：类别、成员、统计与批量校验。无 I/O、无可变状态；
//! 未知名称只会被标记，不会被拒绝（第三方工具可能在运行时出现）。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use serde::Serialize;

use crate::tools::catalog::{ToolCategory, CATALOG};

/// 工具统计：总数与每类数量
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatistics {
    pub total: usize,
    pub per_category: BTreeMap<ToolCategory, usize>,
}

/// 批量校验结果：已知 / 未知（保持输入顺序，去重）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolValidation {
    pub known: Vec<String>,
    pub unknown: Vec<String>,
}

impl ToolValidation {
    pub fn is_clean(&self) -> bool {
        self.unknown.is_empty()
    }
}

fn index() -> &'static HashMap<&'static str, ToolCategory> {
    static INDEX: OnceLock<HashMap<&'static str, ToolCategory>> = OnceLock::new();
    INDEX.get_or_init(|| {
        CATALOG
            .iter()
            .flat_map(|(category, names)| names.iter().map(move |name| (*name, *category)))
            .collect()
    })
}

/// 工具注册表：内置目录的查询入口
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolRegistry;

impl ToolRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn categories(&self) -> BTreeMap<ToolCategory, BTreeSet<&'static str>> {
        CATALOG
            .iter()
            .map(|(category, names)| (*category, names.iter().copied().collect()))
            .collect()
    }

    pub fn is_known(&self, name: &str) -> bool {
        index().contains_key(name)
    }

    pub fn category(&self, name: &str) -> Option<ToolCategory> {
        index().get(name).copied()
    }

    pub fn statistics(&self) -> ToolStatistics {
        let per_category: BTreeMap<ToolCategory, usize> = CATALOG
            .iter()
            .map(|(category, names)| (*category, names.len()))
            .collect();
        ToolStatistics {
            total: index().len(),
            per_category,
        }
    }

    /// 所有已知工具名
    pub fn tool_names(&self) -> BTreeSet<String> {
        index().keys().map(|s| s.to_string()).collect()
    }

    pub fn validate<'a, I>(&self, names: I) -> ToolValidation
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = BTreeSet::new();
        let mut report = ToolValidation::default();
        for name in names {
            if !seen.insert(name) {
                continue;
            }
            if self.is_known(name) {
                report.known.push(name.to_string());
            } else {
                report.unknown.push(name.to_string());
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::catalog::{BASELINE_DENY, SUMMARY_TOOL};

    #[test]
    fn test_known_and_category() {
        let registry = ToolRegistry::new();
        assert!(registry.is_known("Read"));
        assert_eq!(registry.category("Bash"), Some(ToolCategory::Shell));
        assert_eq!(registry.category(SUMMARY_TOOL), Some(ToolCategory::Orchestration));
        assert!(!registry.is_known("mcp__github__create_issue"));
        assert_eq!(registry.category("mcp__github__create_issue"), None);
    }

    #[test]
    fn test_statistics_match_categories() {
        let registry = ToolRegistry::new();
        let stats = registry.statistics();
        let summed: usize = stats.per_category.values().sum();
        assert_eq!(stats.total, summed);
        for (category, names) in registry.categories() {
            assert_eq!(stats.per_category[&category], names.len());
        }
    }

    #[test]
    fn test_baseline_deny_is_catalogued() {
        let registry = ToolRegistry::new();
        for name in BASELINE_DENY {
            assert!(registry.is_known(name), "{name} missing from catalog");
        }
    }

    #[test]
    fn test_validate_flags_unknown_without_dropping() {
        let registry = ToolRegistry::new();
        let report = registry.validate(["Read", "mcp__jira__search", "Read", "Bash"]);
        assert_eq!(report.known, vec!["Read", "Bash"]);
        assert_eq!(report.unknown, vec!["mcp__jira__search"]);
        assert!(!report.is_clean());
    }
}
