//! 任务追踪集成测试

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hive::workflow::*;
    use tempfile::TempDir;

    fn plan(run_id: &str) -> Plan {
        PlanBuilder::for_run(run_id)
            .task("a", "developer", "Task A")
            .task("b", "developer", "Task B")
            .task("c", "validator", "Task C")
            .depends_on("b", &["a"])
            .depends_on("c", &["a", "b"])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_run_lifecycle() {
        let dir = TempDir::new().unwrap();
        let tracker = TaskTracker::new(dir.path());
        tracker.commit_plan(plan("run-life")).await.unwrap();

        for id in ["a", "b", "c"] {
            let ready: Vec<_> = tracker.ready_tasks("run-life").await.unwrap().into_iter().map(|t| t.id).collect();
            assert_eq!(ready, vec![id]);
            assert!(tracker.mark_in_progress(id, "run-life").await.unwrap());
            let summary = format!("finished {}", id);
            assert!(tracker
                .mark_completed(id, "run-life", Some("s-1"), &[], Some(summary.as_str()))
                .await
                .unwrap());
        }

        let progress = tracker.load_progress("run-life").await.unwrap();
        assert!(progress.is_complete());
        assert_eq!(progress.revision, 6);
        assert_eq!(progress.task("c").unwrap().summary.as_deref(), Some("finished c"));

        // plan.json 保持原样
        let plan = tracker.load_plan("run-life").await.unwrap();
        assert!(plan.tasks.iter().all(|t| t.state == TaskState::Pending));
    }

    #[tokio::test]
    async fn test_concurrent_transitions_across_trackers() {
        let dir = TempDir::new().unwrap();
        TaskTracker::new(dir.path()).commit_plan(plan("run-race")).await.unwrap();

        // 每个竞争者持有独立的 tracker，只通过文件系统共享状态
        let root = Arc::new(dir.path().to_path_buf());
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let root = root.clone();
                tokio::spawn(async move {
                    TaskTracker::new(root.as_path()).mark_in_progress("a", "run-race").await.unwrap()
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }
        assert_eq!(outcomes.iter().filter(|won| **won).count(), 1);

        let tracker = TaskTracker::new(dir.path());
        assert_eq!(tracker.find_in_progress_by_run("run-race").await.unwrap().unwrap().id, "a");
        assert!(tracker.ready_tasks("run-race").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_interleaved_transitions_on_different_tasks_all_commit() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(TaskTracker::new(dir.path()));
        let tasks = (0..5).map(|i| Task::new(format!("t{}", i), "developer")).collect();
        tracker.create_plan("run-wide", tasks).await.unwrap();

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.mark_in_progress(&format!("t{}", i), "run-wide").await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let progress = tracker.load_progress("run-wide").await.unwrap();
        assert_eq!(progress.count(TaskState::InProgress), 5);
        assert_eq!(progress.revision, 5);
    }

    #[tokio::test]
    async fn test_cyclic_plan_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let tracker = TaskTracker::new(dir.path());
        let result = PlanBuilder::for_run("run-cycle")
            .task("A", "developer", "A")
            .task("B", "developer", "B")
            .task("C", "developer", "C")
            .task("D", "developer", "D")
            .depends_on("A", &["D"])
            .depends_on("B", &["A"])
            .depends_on("C", &["B"])
            .depends_on("D", &["C"])
            .build();
        assert!(matches!(result, Err(TrackerError::CyclicDependency(_))));

        let mut tasks = vec![
            Task::new("A", "developer"),
            Task::new("B", "developer"),
            Task::new("C", "developer"),
            Task::new("D", "developer"),
        ];
        tasks[0].dependencies = vec!["D".into()];
        tasks[1].dependencies = vec!["A".into()];
        tasks[2].dependencies = vec!["B".into()];
        tasks[3].dependencies = vec!["C".into()];
        assert!(tracker.create_plan("run-cycle", tasks).await.is_err());
        assert!(tracker.list_runs().await.unwrap().is_empty());
        assert!(!dir.path().join("run-cycle").join(PROGRESS_FILE).exists());
    }
}
