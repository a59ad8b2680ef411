//! 标识符：会话 / run ID 的生成与校验
//!
//! ID 会直接用作目录名，只允许 ASCII 字母、数字、`.`、`_`、`-`，且不能以 `.` 开头。

use std::sync::OnceLock;

use regex::Regex;

/// 临时会话 ID 前缀（Worker 报告真实 ID 前使用）
pub const PROVISIONAL_PREFIX: &str = "pending-";

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("static id pattern compiles")
    })
}

pub fn is_valid_id(value: &str) -> bool {
    id_pattern().is_match(value) && !value.contains("..")
}

pub fn new_provisional_session_id() -> String {
    format!("{}{}", PROVISIONAL_PREFIX, uuid::Uuid::new_v4())
}

pub fn is_provisional(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

/// run ID：时间前缀便于按目录排序
pub fn new_run_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "run-{}-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S"),
        &suffix[..8]
    )
}
