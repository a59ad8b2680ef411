//! 脚本化 Worker（用于测试，无需外部进程）
//!
//! 每次 invoke 弹出一段预先排好的「轮次」：依次产出消息、执行副作用（如写产物文件）、
//! 失败或永远挂起（用于超时测试）。收到的请求会被记录下来供断言。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::worker::{MessageStream, Worker, WorkerError, WorkerMessage, WorkerRequest};

type Effect = Arc<dyn Fn(&WorkerRequest) + Send + Sync>;

/// 脚本中的一步
#[derive(Clone)]
pub enum ScriptStep {
    Message(WorkerMessage),
    /// 流中途失败
    Fail(String),
    /// 在流中执行副作用（模拟工具写文件）
    Run(Effect),
    Delay(Duration),
    /// 永不结束
    Hang,
}

impl ScriptStep {
    pub fn run<F>(f: F) -> Self
    where
        F: Fn(&WorkerRequest) + Send + Sync + 'static,
    {
        Self::Run(Arc::new(f))
    }
}

impl std::fmt::Debug for ScriptStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(m) => f.debug_tuple("Message").field(m).finish(),
            Self::Fail(e) => f.debug_tuple("Fail").field(e).finish(),
            Self::Run(_) => f.write_str("Run(..)"),
            Self::Delay(d) => f.debug_tuple("Delay").field(d).finish(),
            Self::Hang => f.write_str("Hang"),
        }
    }
}

impl From<WorkerMessage> for ScriptStep {
    fn from(message: WorkerMessage) -> Self {
        Self::Message(message)
    }
}

enum Pass {
    Stream(Vec<ScriptStep>),
    Refuse(String),
}

/// 脚本化 Worker：按调用顺序消费 pass 队列
#[derive(Default)]
pub struct ScriptedWorker {
    passes: Mutex<VecDeque<Pass>>,
    requests: Mutex<Vec<WorkerRequest>>,
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一轮流式输出
    pub fn push_pass<I, S>(&self, steps: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ScriptStep>,
    {
        let steps = steps.into_iter().map(Into::into).collect();
        self.passes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Pass::Stream(steps));
        self
    }

    /// 追加一轮启动失败
    pub fn push_refusal(&self, reason: impl Into<String>) -> &Self {
        self.passes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Pass::Refuse(reason.into()));
        self
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<WorkerRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn remaining_passes(&self) -> usize {
        self.passes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn invoke(&self, request: WorkerRequest) -> Result<MessageStream, WorkerError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let pass = self
            .passes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| WorkerError::Spawn("no scripted pass left".to_string()))?;

        let steps = match pass {
            Pass::Stream(steps) => steps,
            Pass::Refuse(reason) => return Err(WorkerError::Spawn(reason)),
        };

        let stream = stream::unfold(
            (steps.into_iter(), request),
            |(mut steps, request)| async move {
                loop {
                    match steps.next()? {
                        ScriptStep::Message(message) => return Some((Ok(message), (steps, request))),
                        ScriptStep::Fail(reason) => {
                            return Some((Err(WorkerError::Stream(reason)), (steps, request)))
                        }
                        ScriptStep::Run(effect) => effect(&request),
                        ScriptStep::Delay(d) => tokio::time::sleep(d).await,
                        ScriptStep::Hang => futures_util::future::pending::<()>().await,
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> WorkerRequest {
        WorkerRequest {
            agent: "developer".into(),
            prompt: "do it".into(),
            allowed_tools: vec![],
            disallowed_tools: vec![],
            resume_id: None,
        }
    }

    #[tokio::test]
    async fn test_pass_yields_messages_and_runs_effects() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let worker = ScriptedWorker::new();
        worker.push_pass([
            ScriptStep::from(WorkerMessage::init("s-1")),
            ScriptStep::run(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            ScriptStep::Fail("boom".into()),
        ]);

        let items: Vec<_> = worker.invoke(request()).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(WorkerMessage::init("s-1")));
        assert_eq!(items[1], Err(WorkerError::Stream("boom".into())));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(worker.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_script_refuses() {
        let worker = ScriptedWorker::new();
        worker.push_refusal("offline");
        assert!(matches!(worker.invoke(request()).await, Err(WorkerError::Spawn(r)) if r == "offline"));
        assert!(worker.invoke(request()).await.is_err());
    }
}
