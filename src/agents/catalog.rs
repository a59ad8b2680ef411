//! Agent 目录
//!
//! 内置 planner / developer / validator / reviewer 四个 Agent，可被 config/agents/*.toml 覆盖或扩充。
//! 加载时用 ToolRegistry 校验 allowed_tools：未知工具只记录在报告里，不会被丢弃。

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::agents::definition::{AgentDefinition, RoleClass};
use crate::tools::{ToolRegistry, ToolValidation};

#[derive(Debug, Deserialize)]
struct AgentToml {
    agent: AgentDefinition,
}

/// 按名称索引的 Agent 定义集合
#[derive(Debug, Clone, Default)]
pub struct AgentCatalog {
    agents: BTreeMap<String, AgentDefinition>,
    /// 每个 Agent 的工具校验结果（只保存含未知工具的）
    unknown_tools: BTreeMap<String, ToolValidation>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置 Agent
    pub fn builtin() -> Self {
        let read_only = ["Read", "Glob", "Grep", "LS"];
        let mut catalog = Self::new();
        catalog.insert(
            AgentDefinition::new("planner", RoleClass::Planning)
                .with_description("Breaks a goal into a dependency-ordered task plan")
                .with_tools(read_only.iter().copied().chain(["mcp__hive__list_agents"])),
        );
        catalog.insert(
            AgentDefinition::new("developer", RoleClass::Development)
                .with_description("Implements a task through the restricted write path")
                .with_tools(read_only.iter().copied().chain([
                    "Bash",
                    "TodoWrite",
                    "mcp__hive__write_file",
                    "mcp__hive__run_build",
                    "mcp__hive__run_lint",
                    "mcp__hive__run_tests",
                ])),
        );
        catalog.insert(
            AgentDefinition::new("validator", RoleClass::Validation)
                .with_description("Builds, lints and tests the workspace and reports findings")
                .with_tools(read_only.iter().copied().chain([
                    "mcp__hive__run_build",
                    "mcp__hive__run_lint",
                    "mcp__hive__run_tests",
                ])),
        );
        catalog.insert(
            AgentDefinition::new("reviewer", RoleClass::Validation)
                .with_description("Reviews modified files against the task instructions")
                .with_tools(read_only),
        );
        catalog
    }

    /// 内置 Agent + 目录中的 *.toml（同名覆盖内置）；目录不存在时只返回内置
    pub fn load(dir: Option<&Path>) -> anyhow::Result<Self> {
        let mut catalog = Self::builtin();
        let Some(dir) = dir else {
            return Ok(catalog);
        };
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "agent definitions dir missing, using builtin agents");
            return Ok(catalog);
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            match toml::from_str::<AgentToml>(&content) {
                Ok(parsed) => catalog.insert(parsed.agent),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping invalid agent definition: {}", e);
                }
            }
        }

        tracing::info!("Loaded {} agents", catalog.len());
        Ok(catalog)
    }

    pub fn insert(&mut self, definition: AgentDefinition) {
        let report = ToolRegistry::new().validate(definition.allowed_tools.iter().map(String::as_str));
        if report.is_clean() {
            self.unknown_tools.remove(&definition.name);
        } else {
            tracing::warn!(
                agent = %definition.name,
                unknown = ?report.unknown,
                "agent requests tools outside the builtin catalog"
            );
            self.unknown_tools.insert(definition.name.clone(), report);
        }
        self.agents.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.get(name)
    }

    /// Agent 名称（字典序）
    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDefinition> {
        self.agents.values()
    }

    /// 含未知工具的 Agent 及其校验结果
    pub fn validation_report(&self) -> &BTreeMap<String, ToolValidation> {
        &self.unknown_tools
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
