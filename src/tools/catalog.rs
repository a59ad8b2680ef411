//! 内置工具目录
//!
//! 只登记 hive 认证过的内置能力名；第三方集成在运行时动态提供的工具不在此表中，查询时报告为未知。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 工具类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// 只读文件访问
    FileRead,
    /// 直接写文件（绕过受限写路径）
    FileWrite,
    Shell,
    Web,
    /// 子 Agent / 待办 / 计划模式
    Agent,
    /// hive 提供的受限写入、构建、校验与产物工具
    Orchestration,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::FileRead => "file_read",
            ToolCategory::FileWrite => "file_write",
            ToolCategory::Shell => "shell",
            ToolCategory::Web => "web",
            ToolCategory::Agent => "agent",
            ToolCategory::Orchestration => "orchestration",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 写结构化总结产物
pub const SUMMARY_TOOL: &str = "mcp__hive__write_summary";
/// 规划角色写 plan.json
pub const PLAN_TOOL: &str = "mcp__hive__write_plan";
/// 递归调用其它 Agent
pub const INVOKE_AGENT_TOOL: &str = "mcp__hive__invoke_agent";

/// 静态目录：类别 -> 工具名
pub const CATALOG: &[(ToolCategory, &[&str])] = &[
    (ToolCategory::FileRead, &["Read", "Glob", "Grep", "LS"]),
    (
        ToolCategory::FileWrite,
        &["Write", "Edit", "MultiEdit", "NotebookEdit"],
    ),
    (ToolCategory::Shell, &["Bash", "BashOutput", "KillShell"]),
    (ToolCategory::Web, &["WebFetch", "WebSearch"]),
    (
        ToolCategory::Agent,
        &["Task", "TodoWrite", "ExitPlanMode", "SlashCommand"],
    ),
    (
        ToolCategory::Orchestration,
        &[
            "mcp__hive__write_file",
            "mcp__hive__run_build",
            "mcp__hive__run_lint",
            "mcp__hive__run_tests",
            "mcp__hive__list_agents",
            SUMMARY_TOOL,
            PLAN_TOOL,
            INVOKE_AGENT_TOOL,
        ],
    ),
];

/// 默认拒绝集：可递归调用更多 Agent，或绕过 mcp__hive__write_file 的受限写路径
pub const BASELINE_DENY: &[&str] = &[
    "Task",
    INVOKE_AGENT_TOOL,
    "Write",
    "Edit",
    "MultiEdit",
    "NotebookEdit",
];
