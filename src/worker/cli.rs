//! 子进程 Worker
//!
//! 启动外部 Agent CLI（默认 `claude -p --output-format stream-json --verbose`），prompt 经 stdin 写入，
//! stdout 按行读取 JSON 事件并转换为 WorkerMessage。流被丢弃（超时 / 取消）时子进程随之被杀掉。

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures_util::stream;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::config::WorkerSection;
use crate::worker::{MessageStream, Worker, WorkerError, WorkerMessage, WorkerRequest};

/// 外部 CLI Worker
#[derive(Debug, Clone)]
pub struct CliWorker {
    command: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
}

impl CliWorker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            workdir: None,
        }
    }

    pub fn from_config(cfg: &WorkerSection) -> Self {
        Self {
            command: cfg.command.clone(),
            args: cfg.args.clone(),
            workdir: cfg.workdir.clone(),
        }
    }

    /// 完整参数列表（配置参数在前）
    pub fn build_args(&self, request: &WorkerRequest) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(
            ["-p", "--output-format", "stream-json", "--verbose"]
                .iter()
                .map(|s| s.to_string()),
        );
        if !request.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(request.allowed_tools.join(","));
        }
        if !request.disallowed_tools.is_empty() {
            args.push("--disallowedTools".to_string());
            args.push(request.disallowed_tools.join(","));
        }
        if let Some(id) = &request.resume_id {
            args.push("--resume".to_string());
            args.push(id.clone());
        }
        args
    }
}

struct ReadState {
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    pending: VecDeque<WorkerMessage>,
    saw_result: bool,
    done: bool,
}

#[async_trait]
impl Worker for CliWorker {
    async fn invoke(&self, request: WorkerRequest) -> Result<MessageStream, WorkerError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.build_args(&request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        tracing::info!(agent = %request.agent, command = %self.command, resume = ?request.resume_id, "starting worker process");
        let mut child = cmd
            .spawn()
            .map_err(|e| WorkerError::Spawn(format!("{}: {}", self.command, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Spawn("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Spawn("failed to capture stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            let agent = request.agent.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(agent = %agent, "worker stderr: {}", line);
                }
            });
        }

        let prompt = request.prompt.clone();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                tracing::warn!("failed to write prompt to worker: {}", e);
            }
            // 关闭 stdin，通知 Worker 输入结束
            drop(stdin);
        });

        let state = ReadState {
            lines: BufReader::new(stdout).lines(),
            child,
            pending: VecDeque::new(),
            saw_result: false,
            done: false,
        };

        let stream = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(message) = state.pending.pop_front() {
                    return Some((Ok(message), state));
                }
                if state.done {
                    return None;
                }
                match state.lines.next_line().await {
                    Ok(Some(line)) => match parse_stream_line(&line) {
                        Ok(messages) => {
                            state.saw_result |= messages.iter().any(|m| matches!(m, WorkerMessage::Result { .. }));
                            state.pending.extend(messages);
                        }
                        Err(e) => tracing::warn!("skipping unparseable worker line: {}", e),
                    },
                    Ok(None) => {
                        state.done = true;
                        let status = state.child.wait().await;
                        match status {
                            Ok(status) if status.success() || state.saw_result => {}
                            Ok(status) => return Some((Err(WorkerError::Exited(status.code())), state)),
                            Err(e) => return Some((Err(WorkerError::Stream(e.to_string())), state)),
                        }
                    }
                    Err(e) => {
                        state.done = true;
                        return Some((Err(WorkerError::Stream(e.to_string())), state));
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

/// 解析 stream-json 的一行；不关心的事件返回空列表
pub fn parse_stream_line(line: &str) -> Result<Vec<WorkerMessage>, WorkerError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(line).map_err(|e| WorkerError::Stream(format!("invalid JSON line: {e}")))?;

    let str_field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    let messages = match value.get("type").and_then(Value::as_str) {
        Some("system") if value.get("subtype").and_then(Value::as_str) == Some("init") => {
            let session_id = str_field(&value, "session_id")
                .ok_or_else(|| WorkerError::Stream("init event without session_id".to_string()))?;
            let tools = value
                .get("tools")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            vec![WorkerMessage::SystemInit {
                session_id,
                model: str_field(&value, "model"),
                tools,
            }]
        }
        Some("assistant") => content_blocks(&value)
            .filter_map(|block| match block.get("type").and_then(Value::as_str) {
                Some("text") => str_field(block, "text").map(|text| WorkerMessage::Assistant { text }),
                Some("tool_use") => Some(WorkerMessage::ToolCall {
                    id: str_field(block, "id"),
                    name: str_field(block, "name").unwrap_or_default(),
                    input: block.get("input").cloned().unwrap_or(Value::Null),
                }),
                _ => None,
            })
            .collect(),
        Some("user") => content_blocks(&value)
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_result"))
            .map(|block| WorkerMessage::ToolResult {
                id: str_field(block, "tool_use_id"),
                content: tool_result_text(block.get("content")),
                is_error: block.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            })
            .collect(),
        Some("result") => vec![WorkerMessage::Result {
            session_id: str_field(&value, "session_id"),
            is_error: value.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            text: str_field(&value, "result"),
        }],
        _ => Vec::new(),
    };
    Ok(messages)
}

fn content_blocks(value: &Value) -> impl Iterator<Item = &Value> {
    value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn tool_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
