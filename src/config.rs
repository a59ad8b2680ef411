//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__TIMEOUTS__DEVELOPMENT_SECS=3600`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::agents::RoleClass;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub permissions: PermissionsSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub agents: AgentsSection,
}

/// [storage] 段：会话目录与运行目录
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// 会话根目录，每个真实会话 ID 一个子目录
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
    /// 运行根目录，每个 run 一个子目录（plan.json / progress.json）
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            sessions_dir: default_sessions_dir(),
            runs_dir: default_runs_dir(),
        }
    }
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from(".hive/sessions")
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from(".hive/runs")
}

/// [permissions] 段：缓存 TTL 与默认拒绝的危险工具
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsSection {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// 未显式允许时一律拒绝（可递归调用 Agent 或绕过受限写路径的工具）
    #[serde(default = "default_baseline_deny")]
    pub baseline_deny: Vec<String>,
}

impl Default for PermissionsSection {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            baseline_deny: default_baseline_deny(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_baseline_deny() -> Vec<String> {
    crate::tools::BASELINE_DENY
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// [timeouts] 段：按角色类别的墙钟超时（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsSection {
    #[serde(default = "default_validation_secs")]
    pub validation_secs: u64,
    #[serde(default = "default_development_secs")]
    pub development_secs: u64,
    #[serde(default = "default_planning_secs")]
    pub planning_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            validation_secs: default_validation_secs(),
            development_secs: default_development_secs(),
            planning_secs: default_planning_secs(),
        }
    }
}

fn default_validation_secs() -> u64 {
    600
}

fn default_development_secs() -> u64 {
    3600
}

fn default_planning_secs() -> u64 {
    1200
}

impl TimeoutsSection {
    pub fn for_role(&self, role: RoleClass) -> Duration {
        let secs = match role {
            RoleClass::Validation => self.validation_secs,
            RoleClass::Development => self.development_secs,
            RoleClass::Planning => self.planning_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// [worker] 段：外部 Agent 进程的启动命令
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    #[serde(default = "default_worker_command")]
    pub command: String,
    /// 附加参数（放在 hive 自动生成的参数之前）
    #[serde(default)]
    pub args: Vec<String>,
    /// 子进程工作目录，未设置时继承当前目录
    pub workdir: Option<PathBuf>,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            command: default_worker_command(),
            args: Vec::new(),
            workdir: None,
        }
    }
}

fn default_worker_command() -> String {
    "claude".to_string()
}

/// [agents] 段：Agent 定义目录（每个 *.toml 一个 Agent）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentsSection {
    pub definitions_dir: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_role() {
        let cfg = AppConfig::default();
        assert!(cfg.timeouts.for_role(RoleClass::Validation) < cfg.timeouts.for_role(RoleClass::Development));
        assert_eq!(cfg.permissions.cache_ttl_secs, 300);
        assert!(cfg.permissions.baseline_deny.iter().any(|t| t == "Task"));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(
            &path,
            "[timeouts]\nvalidation_secs = 42\n\n[storage]\nsessions_dir = \"/tmp/s\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.timeouts.validation_secs, 42);
        assert_eq!(cfg.timeouts.development_secs, 3600);
        assert_eq!(cfg.storage.sessions_dir, PathBuf::from("/tmp/s"));
        assert_eq!(cfg.storage.runs_dir, PathBuf::from(".hive/runs"));
    }
}
