//! 调用编排集成测试：规划 Agent 写计划，驱动器按依赖执行

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use hive::agents::AgentCatalog;
    use hive::config::AppConfig;
    use hive::worker::{ScriptStep, ScriptedWorker, WorkerMessage};
    use hive::{Hive, InvocationRequest};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (TempDir, Arc<ScriptedWorker>, Hive) {
        let dir = TempDir::new().unwrap();
        let mut cfg = AppConfig::default();
        cfg.storage.sessions_dir = dir.path().join("sessions");
        cfg.storage.runs_dir = dir.path().join("runs");
        let worker = Arc::new(ScriptedWorker::new());
        let hive = Hive::new(&cfg, AgentCatalog::builtin(), worker.clone());
        (dir, worker, hive)
    }

    fn write_summary(sessions: PathBuf, session_id: &'static str) -> ScriptStep {
        ScriptStep::run(move |_| {
            std::fs::write(
                sessions.join(session_id).join("summary.json"),
                r#"{"summary":"ok","filesModified":["src/lib.rs"]}"#,
            )
            .unwrap();
        })
    }

    #[tokio::test]
    async fn test_plan_then_drive() {
        let (dir, worker, hive) = setup();
        let sessions = dir.path().join("sessions");
        let run_dir = dir.path().join("runs").join("run-e2e");

        worker.push_pass([
            ScriptStep::from(WorkerMessage::init("plan-session")),
            ScriptStep::run(move |_| {
                std::fs::create_dir_all(&run_dir).unwrap();
                std::fs::write(
                    run_dir.join("plan.json"),
                    r#"{"runId":"run-e2e","createdAt":"2026-10-17T09:00:00Z","tasks":[
                        {"id":"impl","title":"Implement","designatedAgent":"developer","instructions":"Add the feature"},
                        {"id":"verify","title":"Verify","designatedAgent":"validator","dependencies":["impl"]}]}"#,
                )
                .unwrap();
            }),
            WorkerMessage::success("plan written").into(),
        ]);
        worker.push_pass([
            ScriptStep::from(WorkerMessage::init("dev-session")),
            WorkerMessage::assistant("implemented").into(),
            write_summary(sessions.clone(), "dev-session"),
            WorkerMessage::success("done").into(),
        ]);
        worker.push_pass([
            ScriptStep::from(WorkerMessage::init("val-session")),
            write_summary(sessions.clone(), "val-session"),
            WorkerMessage::success("all green").into(),
        ]);

        let planner = hive.catalog().get("planner").cloned().unwrap();
        let planned = hive
            .invoke(
                InvocationRequest::new(planner, "Plan the feature").in_run("run-e2e"),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(planned.success);
        assert!(planned.artifact_found());
        assert!(sessions.join("plan-session").join("conversation.json").exists());

        let report = hive.drive_run("run-e2e", CancellationToken::new()).await.unwrap();
        assert_eq!(report.completed, vec!["impl", "verify"]);
        assert_eq!(report.remaining, 0);

        let progress = hive.load_progress("run-e2e").await.unwrap();
        let implemented = progress.task("impl").unwrap();
        assert_eq!(implemented.agent_session_id.as_deref(), Some("dev-session"));
        assert_eq!(implemented.files_modified, vec!["src/lib.rs"]);

        let requests = worker.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].prompt.contains("Add the feature"));
        assert!(requests[1].prompt.contains("- Task: impl"));
        assert_eq!(worker.remaining_passes(), 0);
    }

    #[tokio::test]
    async fn test_resume_rehomes_when_worker_reports_new_id() {
        let (dir, worker, hive) = setup();
        let sessions = dir.path().join("sessions");
        worker.push_pass([
            ScriptStep::from(WorkerMessage::init("first-id")),
            write_summary(sessions.clone(), "first-id"),
            WorkerMessage::success("one").into(),
        ]);
        worker.push_pass([
            ScriptStep::from(WorkerMessage::init("second-id")),
            WorkerMessage::assistant("continued").into(),
            WorkerMessage::success("two").into(),
        ]);

        let first = hive.invoke_agent("developer", "Start", None).await.unwrap();
        assert_eq!(first.session_id, "first-id");
        let second = hive.invoke_agent("developer", "Continue", Some("first-id")).await.unwrap();
        assert_eq!(second.session_id, "second-id");
        assert_eq!(second.message_count, 6);
        assert!(second.artifact_found());

        assert!(!sessions.join("first-id").exists());
        let snapshot = hive.sessions().load("second-id").await.unwrap();
        assert_eq!(snapshot.previous_ids, vec!["first-id"]);
        let transcript = std::fs::read_to_string(sessions.join("second-id").join("transcript.log")).unwrap();
        assert!(transcript.contains("NEW SESSION"));
        assert!(transcript.contains("RESUMED SESSION first-id"));
        assert!(transcript.contains("SESSION ID second-id (was first-id)"));
    }
}
