pub mod types;
pub mod graph;
pub mod builder;
pub mod tracker;

pub use types::*;
pub use graph::{validate_tasks, TaskGraph};
pub use builder::PlanBuilder;
pub use tracker::{TaskTracker, PLAN_FILE, PROGRESS_FILE, REVISIONS_DIR};
