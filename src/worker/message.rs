//! Worker 消息
//!
//! 核心只依赖这一形状：助手文本、工具调用、工具结果、最终结果、以及携带真实会话 ID 的 system/init。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Worker 流中的单条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// 流的第一条消息，报告 Worker 自己的会话 ID
    SystemInit {
        session_id: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        tools: Vec<String>,
    },
    Assistant {
        text: String,
    },
    ToolCall {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    /// 最终结果；is_error 为真时是终止性错误
    Result {
        #[serde(default)]
        session_id: Option<String>,
        is_error: bool,
        #[serde(default)]
        text: Option<String>,
    },
}

impl WorkerMessage {
    pub fn init(session_id: impl Into<String>) -> Self {
        Self::SystemInit {
            session_id: session_id.into(),
            model: None,
            tools: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant { text: text.into() }
    }

    pub fn tool_call(name: impl Into<String>, input: Value) -> Self {
        Self::ToolCall {
            id: None,
            name: name.into(),
            input,
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::Result {
            session_id: None,
            is_error: false,
            text: Some(text.into()),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self::Result {
            session_id: None,
            is_error: true,
            text: Some(text.into()),
        }
    }

    /// 消息中携带的 Worker 会话 ID
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SystemInit { session_id, .. } => Some(session_id),
            Self::Result { session_id, .. } => session_id.as_deref(),
            _ => None,
        }
    }

    pub fn is_terminal_error(&self) -> bool {
        matches!(self, Self::Result { is_error: true, .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SystemInit { .. } => "system",
            Self::Assistant { .. } => "assistant",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Result { .. } => "result",
        }
    }

    /// transcript 中的单行（多行文本会被缩进）
    pub fn transcript_line(&self) -> String {
        let body = match self {
            Self::SystemInit { session_id, model, .. } => match model {
                Some(model) => format!("init session={session_id} model={model}"),
                None => format!("init session={session_id}"),
            },
            Self::Assistant { text } => text.clone(),
            Self::ToolCall { name, input, .. } => format!("{name} {input}"),
            Self::ToolResult { content, is_error, .. } => {
                if *is_error {
                    format!("(error) {content}")
                } else {
                    content.clone()
                }
            }
            Self::Result { is_error, text, .. } => format!(
                "{} {}",
                if *is_error { "error" } else { "success" },
                text.as_deref().unwrap_or("")
            ),
        };
        format!("{}: {}", self.kind(), body.trim_end().replace('\n', "\n    "))
    }
}
