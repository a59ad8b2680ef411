//! 调用编排器：驱动一次 Worker 调用
//!
//! Init（开启/续接会话、写 transcript 头）-> PermissionsComputed（权限与 prompt）
//! -> Streaming（逐条持久化并记录，同时在首个带 ID 的消息处把临时会话迁到真实 ID）
//! -> ArtifactCheck -> 至多一次 CorrectiveRetry -> Finalized（页脚 + 最终快照）。
//!
//! 会话错误在开始阶段直接返回；流中的任何错误都变成失败结果，已收到的内容保留。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::agents::{AgentDefinition, ArtifactRequirement};
use crate::config::TimeoutsSection;
use crate::core::artifact;
use crate::core::{AgentError, ArtifactStatus, InvocationPhase, InvocationResult};
use crate::ids;
use crate::permissions::{PermissionEngine, PermissionResult};
use crate::session::{ActiveSession, SessionError, SessionStore};
use crate::worker::{Worker, WorkerMessage, WorkerRequest};
use crate::workflow::TaskTracker;

/// 一次调用的输入
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub agent: AgentDefinition,
    pub instructions: String,
    /// 续接的会话（真实 ID）
    pub resume_id: Option<String>,
    pub run_id: Option<String>,
    pub task_id: Option<String>,
}

impl InvocationRequest {
    pub fn new(agent: AgentDefinition, instructions: impl Into<String>) -> Self {
        Self {
            agent,
            instructions: instructions.into(),
            resume_id: None,
            run_id: None,
            task_id: None,
        }
    }

    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume_id = Some(session_id.into());
        self
    }

    pub fn in_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn for_task(mut self, run_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self.task_id = Some(task_id.into());
        self
    }
}

/// 单轮流式输出
#[derive(Debug, Default)]
struct PassOutput {
    texts: Vec<String>,
    result_text: Option<String>,
}

impl PassOutput {
    fn text(&self) -> String {
        if self.texts.is_empty() {
            self.result_text.clone().unwrap_or_default()
        } else {
            self.texts.join("\n")
        }
    }
}

/// 调用编排器
pub struct InvocationOrchestrator {
    worker: Arc<dyn Worker>,
    permissions: Arc<PermissionEngine>,
    sessions: SessionStore,
    tracker: TaskTracker,
    timeouts: TimeoutsSection,
}

impl InvocationOrchestrator {
    pub fn new(
        worker: Arc<dyn Worker>,
        permissions: Arc<PermissionEngine>,
        sessions: SessionStore,
        tracker: TaskTracker,
        timeouts: TimeoutsSection,
    ) -> Self {
        Self {
            worker,
            permissions,
            sessions,
            tracker,
            timeouts,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn permissions(&self) -> &Arc<PermissionEngine> {
        &self.permissions
    }

    fn advance(&self, session: &ActiveSession, from: InvocationPhase, to: InvocationPhase) -> InvocationPhase {
        tracing::debug!(session_id = %session.id(), "phase {} -> {}", from, to);
        to
    }

    pub async fn invoke(
        &self,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> Result<InvocationResult, AgentError> {
        let agent = &request.agent;
        let requirement = agent.artifact();
        let run_id = match (requirement, &request.run_id) {
            (ArtifactRequirement::Plan, None) => Some(ids::new_run_id()),
            (_, run_id) => run_id.clone(),
        };
        if let Some(run_id) = &run_id {
            self.tracker.run_dir(run_id)?;
        }

        let phase = InvocationPhase::Init;
        let mut session = self
            .sessions
            .initialize_session(request.resume_id.as_deref(), &agent.name)
            .await?;
        let transcript = session.transcript();
        if session.is_continuation() {
            transcript
                .resumed_session(session.id(), &agent.name, session.prior_messages())
                .await?;
        } else {
            transcript.new_session(session.id(), &agent.name).await?;
        }

        let phase = self.advance(&session, phase, InvocationPhase::PermissionsComputed);
        let permissions = self.permissions.compute_permissions(&agent.allowed_tools, &agent.role());
        let plan_path = match (requirement, &run_id) {
            (ArtifactRequirement::Plan, Some(run_id)) => Some(self.tracker.plan_path(run_id)?),
            _ => None,
        };
        let prompt = build_prompt(&request, &session, &permissions, run_id.as_deref(), plan_path.as_deref());
        transcript.tool_restrictions(&permissions.summary_line()).await?;
        transcript.prompt(&prompt).await?;

        let deadline = Instant::now() + self.timeouts.for_role(agent.role);
        let allowed_tools: Vec<String> = permissions.allowed_tools.iter().cloned().collect();
        let disallowed_tools: Vec<String> = permissions.disallowed_tools.iter().cloned().collect();
        tracing::info!(
            session_id = %session.id(),
            agent = %agent.name,
            run_id = ?run_id,
            task_id = ?request.task_id,
            continuation = session.is_continuation(),
            "invoking agent"
        );

        let mut phase = self.advance(&session, phase, InvocationPhase::Streaming);
        let mut primary = PassOutput::default();
        let worker_request = WorkerRequest {
            agent: agent.name.clone(),
            prompt,
            allowed_tools: allowed_tools.clone(),
            disallowed_tools: disallowed_tools.clone(),
            resume_id: session.handle().true_id().map(str::to_string),
        };
        let error = self
            .stream_pass(&mut session, worker_request, deadline, &cancel, &mut primary)
            .await
            .err();
        if let Some(e) = &error {
            tracing::warn!(session_id = %session.id(), agent = %agent.name, "invocation failed: {}", e);
            log_transcript(session.id(), session.transcript().error(e).await);
        }

        phase = self.advance(&session, phase, InvocationPhase::ArtifactCheck);
        let mut artifact_path = self.artifact_path(requirement, &session, &plan_path);
        let mut status = self.check_artifact(requirement, &session, artifact_path.as_deref()).await;

        let mut corrective_attempted = false;
        if status == ArtifactStatus::Missing && error.is_none() {
            match session.handle().true_id().map(str::to_string) {
                None => {
                    tracing::warn!(session_id = %session.id(), "worker never reported a session id; skipping corrective continuation");
                }
                Some(_) if cancel.is_cancelled() => {}
                Some(true_id) => {
                    phase = self.advance(&session, phase, InvocationPhase::CorrectiveRetry);
                    corrective_attempted = true;
                    let corrective = corrective_prompt(requirement, artifact_path.as_deref());
                    let transcript = session.transcript();
                    log_transcript(&true_id, transcript.note("CORRECTIVE CONTINUATION").await);
                    log_transcript(&true_id, transcript.prompt(&corrective).await);

                    let worker_request = WorkerRequest {
                        agent: agent.name.clone(),
                        prompt: corrective,
                        allowed_tools,
                        disallowed_tools,
                        resume_id: Some(true_id),
                    };
                    let mut retry = PassOutput::default();
                    if let Err(e) = self
                        .stream_pass(&mut session, worker_request, deadline, &cancel, &mut retry)
                        .await
                    {
                        tracing::warn!(session_id = %session.id(), "corrective continuation failed: {}", e);
                        log_transcript(
                            session.id(),
                            session
                                .transcript()
                                .error(&format!("corrective continuation failed: {}", e))
                                .await,
                        );
                    }

                    phase = self.advance(&session, phase, InvocationPhase::ArtifactCheck);
                    artifact_path = self.artifact_path(requirement, &session, &plan_path);
                    status = self.check_artifact(requirement, &session, artifact_path.as_deref()).await;
                }
            }
        }
        if status == ArtifactStatus::Missing {
            tracing::warn!(session_id = %session.id(), agent = %agent.name, path = ?artifact_path, "required artifact missing");
        }

        self.advance(&session, phase, InvocationPhase::Finalized);
        let success = error.is_none();
        log_transcript(session.id(), session.transcript().completed(success, status.as_str()).await);
        if let Err(e) = self.sessions.persist(&mut session).await {
            tracing::warn!(session_id = %session.id(), "failed to persist final snapshot: {}", e);
        }

        Ok(InvocationResult {
            success,
            session_id: session.id().to_string(),
            agent: agent.name.clone(),
            output: primary.text(),
            artifact_found: status.is_satisfied(),
            artifact: status,
            artifact_path,
            corrective_attempted,
            run_id,
            error,
            message_count: session.snapshot().messages.len(),
        })
    }

    fn artifact_path(
        &self,
        requirement: ArtifactRequirement,
        session: &ActiveSession,
        plan_path: &Option<PathBuf>,
    ) -> Option<PathBuf> {
        match requirement {
            ArtifactRequirement::Plan => plan_path.clone(),
            _ => artifact::expected_path(requirement, session.handle(), &self.tracker, None)
                .ok()
                .flatten(),
        }
    }

    async fn check_artifact(
        &self,
        requirement: ArtifactRequirement,
        session: &ActiveSession,
        path: Option<&Path>,
    ) -> ArtifactStatus {
        match (requirement, path) {
            (ArtifactRequirement::None, _) => ArtifactStatus::NotRequired,
            // summary 只认真实 ID 目录下的文件
            (ArtifactRequirement::Summary, _) if session.handle().is_provisional() => ArtifactStatus::Missing,
            (_, Some(path)) if artifact::exists(path).await => ArtifactStatus::Found,
            _ => ArtifactStatus::Missing,
        }
    }

    /// 消费一轮流，直到结束、出错、超时或取消
    async fn stream_pass(
        &self,
        session: &mut ActiveSession,
        request: WorkerRequest,
        deadline: Instant,
        cancel: &CancellationToken,
        output: &mut PassOutput,
    ) -> Result<(), String> {
        let agent = request.agent.clone();
        let consume = async {
            let mut stream = self.worker.invoke(request).await.map_err(|e| e.to_string())?;
            while let Some(item) = stream.next().await {
                let message = item.map_err(|e| e.to_string())?;
                self.record(session, message, output).await?;
            }
            Ok::<(), String>(())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err("invocation cancelled".to_string()),
            outcome = tokio::time::timeout_at(deadline, consume) => match outcome {
                Ok(result) => result,
                Err(_) => Err(format!("agent {} timed out", agent)),
            },
        }
    }

    /// 处理一条消息：必要时迁移会话 ID，持久化快照，写 transcript
    async fn record(
        &self,
        session: &mut ActiveSession,
        message: WorkerMessage,
        output: &mut PassOutput,
    ) -> Result<(), String> {
        if let Some(reported) = message.session_id() {
            if reported != session.id() {
                let from = session.id().to_string();
                self.sessions
                    .reconcile_true_id(session, reported)
                    .await
                    .map_err(|e| e.to_string())?;
                log_transcript(reported, session.transcript().identity(&from, reported).await);
            }
        }

        let terminal = match &message {
            WorkerMessage::Assistant { text } => {
                output.texts.push(text.clone());
                None
            }
            WorkerMessage::Result { is_error, text, .. } => {
                output.result_text = text.clone();
                is_error.then(|| {
                    format!(
                        "worker reported an error: {}",
                        text.as_deref().unwrap_or("no details")
                    )
                })
            }
            _ => None,
        };

        log_transcript(session.id(), session.transcript().message(&message).await);
        self.sessions
            .append_message(session, message)
            .await
            .map_err(|e| e.to_string())?;

        match terminal {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

/// transcript 写失败不影响调用结果
fn log_transcript(session_id: &str, result: Result<(), SessionError>) {
    if let Err(e) = result {
        tracing::warn!(session_id = %session_id, "transcript write failed: {}", e);
    }
}

fn build_prompt(
    request: &InvocationRequest,
    session: &ActiveSession,
    permissions: &PermissionResult,
    run_id: Option<&str>,
    plan_path: Option<&Path>,
) -> String {
    let agent = &request.agent;
    let mut prompt = request.instructions.trim().to_string();

    prompt.push_str("\n\n## Session\n");
    prompt.push_str(&format!("- Agent: {} ({})\n", agent.name, agent.role.as_str()));
    if session.is_continuation() {
        prompt.push_str(&format!(
            "- Continuing session {} ({} earlier messages)\n",
            session.id(),
            session.prior_messages()
        ));
    }
    if let Some(run_id) = run_id {
        prompt.push_str(&format!("- Run: {}\n", run_id));
    }
    if let Some(task_id) = &request.task_id {
        prompt.push_str(&format!("- Task: {}\n", task_id));
    }

    match agent.artifact() {
        ArtifactRequirement::Summary => prompt.push_str(&format!(
            "\nBefore you finish, record a summary of your work (what changed and which files) with `{}`.\n",
            crate::tools::SUMMARY_TOOL
        )),
        ArtifactRequirement::Plan => {
            prompt.push_str(&format!(
                "\nWrite the task plan for run {} with `{}`",
                run_id.unwrap_or("-"),
                crate::tools::PLAN_TOOL
            ));
            if let Some(path) = plan_path {
                prompt.push_str(&format!(" (stored at {})", path.display()));
            }
            prompt.push_str(".\n");
        }
        ArtifactRequirement::None => {}
    }

    if let Some(restrictions) = &permissions.restriction_prompt {
        prompt.push('\n');
        prompt.push_str(restrictions);
        prompt.push('\n');
    }
    prompt
}

fn corrective_prompt(requirement: ArtifactRequirement, path: Option<&Path>) -> String {
    let kind = match requirement {
        ArtifactRequirement::Plan => "plan",
        _ => "summary",
    };
    let tool = artifact::producing_tool(requirement).unwrap_or(crate::tools::SUMMARY_TOOL);
    let location = path
        .map(|p| format!(" at {}", p.display()))
        .unwrap_or_default();
    format!(
        "Your previous turn ended without writing the required {}{}. \
         Write it now with `{}` and then stop. Do not redo any other work.",
        kind, location, tool
    )
}
