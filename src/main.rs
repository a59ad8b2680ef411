//! hive - Agent 会话与任务编排
//!
//! 入口：初始化日志、加载配置，用子进程 Worker 构建 Hive 并执行一个命令：
//!   hive agents                        列出 Agent
//!   hive invoke <agent> <prompt> [id]  调用 Agent（可续接会话）
//!   hive drive <run_id>                按依赖顺序执行 run 中的任务
//!   hive status [run_id]               查看 run 进度（不给 run_id 时列出所有 run）

use std::sync::Arc;

use anyhow::{bail, Context};
use hive::config::{load_config, AppConfig};
use hive::core::InvocationRequest;
use hive::worker::CliWorker;
use hive::{observability, Hive};
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: hive <agents | invoke <agent> <prompt> [session_id] | drive <run_id> | status [run_id]>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    let cfg = load_config(std::env::var_os("HIVE_CONFIG").map(Into::into)).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let worker = Arc::new(CliWorker::from_config(&cfg.worker));
    let hive = Hive::from_config(&cfg, worker).context("Failed to build hive")?;

    // Ctrl-C 取消正在进行的调用，会话照常收尾
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["agents"] => {
            println!("{}", serde_json::to_string_pretty(&hive.list_agents())?);
        }
        ["invoke", agent, prompt, rest @ ..] if rest.len() <= 1 => {
            let definition = hive
                .catalog()
                .get(agent)
                .cloned()
                .with_context(|| format!("unknown agent {}", agent))?;
            let mut request = InvocationRequest::new(definition, *prompt);
            if let Some(id) = rest.first() {
                request = request.resume(*id);
            }
            let result = hive.invoke(request, cancel).await?;
            if let Some(warning) = result.warning() {
                tracing::warn!(session_id = %result.session_id, "{}", warning);
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        ["drive", run_id] => {
            let report = hive.drive_run(run_id, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.failed.is_some() {
                std::process::exit(1);
            }
        }
        ["status", run_id] => {
            let progress = hive.load_progress(run_id).await?;
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
        ["status"] => {
            for run_id in hive.list_runs().await? {
                println!("{}", run_id);
            }
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
