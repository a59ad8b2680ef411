//! Agent 定义：角色类别、请求的工具与必须产出的产物

use serde::{Deserialize, Serialize};

/// 角色类别：决定超时档位与产物类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleClass {
    /// 唯一的规划角色，产物是本次 run 的 plan.json
    Planning,
    /// 开放式开发任务，长超时
    Development,
    /// 校验 / 评审类任务，短超时
    Validation,
}

impl RoleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleClass::Planning => "planning",
            RoleClass::Development => "development",
            RoleClass::Validation => "validation",
        }
    }
}

/// 调用结束时必须存在的产物
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRequirement {
    None,
    /// 会话目录下的 summary.json
    Summary,
    /// run 目录下的 plan.json
    Plan,
}

/// 权限计算与缓存使用的角色描述
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgentRole {
    pub name: String,
    pub class: RoleClass,
    pub artifact: ArtifactRequirement,
}

/// 单个 Agent 的定义（对应 config/agents/<name>.toml 的 [agent] 段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub role: RoleClass,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// 非规划角色是否必须写 summary.json
    #[serde(default = "default_requires_summary")]
    pub requires_summary: bool,
}

fn default_requires_summary() -> bool {
    true
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, role: RoleClass) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            role,
            allowed_tools: Vec::new(),
            requires_summary: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn without_summary(mut self) -> Self {
        self.requires_summary = false;
        self
    }

    pub fn artifact(&self) -> ArtifactRequirement {
        match self.role {
            RoleClass::Planning => ArtifactRequirement::Plan,
            _ if self.requires_summary => ArtifactRequirement::Summary,
            _ => ArtifactRequirement::None,
        }
    }

    pub fn role(&self) -> AgentRole {
        AgentRole {
            name: self.name.clone(),
            class: self.role,
            artifact: self.artifact(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_follows_role() {
        let planner = AgentDefinition::new("planner", RoleClass::Planning).without_summary();
        assert_eq!(planner.artifact(), ArtifactRequirement::Plan);

        let dev = AgentDefinition::new("dev", RoleClass::Development);
        assert_eq!(dev.artifact(), ArtifactRequirement::Summary);

        let quiet = AgentDefinition::new("lint", RoleClass::Validation).without_summary();
        assert_eq!(quiet.artifact(), ArtifactRequirement::None);
    }

    #[test]
    fn test_parse_toml_defaults() {
        #[derive(Deserialize)]
        struct File {
            agent: AgentDefinition,
        }
        let parsed: File = toml::from_str(
            "[agent]\nname = \"tester\"\nrole = \"validation\"\nallowed_tools = [\"Read\", \"Bash\"]\n",
        )
        .unwrap();
        assert_eq!(parsed.agent.name, "tester");
        assert_eq!(parsed.agent.role, RoleClass::Validation);
        assert!(parsed.agent.requires_summary);
        assert_eq!(parsed.agent.allowed_tools, vec!["Read", "Bash"]);
    }
}
