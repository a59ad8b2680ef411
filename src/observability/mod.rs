//! 可观测性
//!
//! 开发期诊断走 tracing（RUST_LOG 控制，输出到 stderr）；会话 transcript 是产品产物，见 session::transcript。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化 tracing：默认 info，可通过 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
