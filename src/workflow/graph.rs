//! 任务依赖图
//!
//! 邻接表 + 入度表，Kahn 拓扑排序检测环；建图时拒绝重复 ID 与未知依赖。

use std::collections::{HashMap, HashSet};

use crate::workflow::types::*;

/// 任务依赖图
pub struct TaskGraph {
    /// 计划顺序
    order: Vec<TaskId>,
    /// 邻接表：任务 ID -> 依赖该任务的任务列表
    pub adjacency: HashMap<TaskId, Vec<TaskId>>,
    /// 入度表：任务 ID -> 依赖数
    pub in_degree: HashMap<TaskId, usize>,
    dependencies: HashMap<TaskId, Vec<TaskId>>,
}

impl TaskGraph {
    /// 创建依赖图
    pub fn new(tasks: &[Task]) -> Result<Self, TrackerError> {
        let mut order = Vec::with_capacity(tasks.len());
        let mut adjacency: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut in_degree: HashMap<TaskId, usize> = HashMap::new();
        let mut dependencies: HashMap<TaskId, Vec<TaskId>> = HashMap::new();

        for task in tasks {
            if in_degree.insert(task.id.clone(), 0).is_some() {
                return Err(TrackerError::DuplicateTask(task.id.clone()));
            }
            adjacency.insert(task.id.clone(), Vec::new());
            order.push(task.id.clone());
        }

        for task in tasks {
            let mut seen = HashSet::new();
            for dep_id in &task.dependencies {
                if !seen.insert(dep_id) {
                    continue;
                }
                if !in_degree.contains_key(dep_id) {
                    return Err(TrackerError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep_id.clone(),
                    });
                }
                adjacency.entry(dep_id.clone()).or_default().push(task.id.clone());
                *in_degree.entry(task.id.clone()).or_insert(0) += 1;
                dependencies.entry(task.id.clone()).or_default().push(dep_id.clone());
            }
        }

        Ok(Self {
            order,
            adjacency,
            in_degree,
            dependencies,
        })
    }

    /// 拓扑序（同层保持计划顺序）；有环时返回环路径
    pub fn topological_order(&self) -> Result<Vec<TaskId>, TrackerError> {
        let mut in_degree = self.in_degree.clone();
        let mut queue: std::collections::VecDeque<&TaskId> =
            self.order.iter().filter(|id| in_degree[*id] == 0).collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while let Some(id) = queue.pop_front() {
            sorted.push(id.clone());
            for dependent in &self.adjacency[id] {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if sorted.len() == self.order.len() {
            return Ok(sorted);
        }
        let remaining: HashSet<&TaskId> = self.order.iter().filter(|id| in_degree[*id] > 0).collect();
        Err(TrackerError::CyclicDependency(self.cycle_within(&remaining)))
    }

    /// 剩余节点都至少有一个剩余依赖，沿依赖走必然回到走过的节点
    fn cycle_within(&self, remaining: &HashSet<&TaskId>) -> Vec<TaskId> {
        let Some(start) = self.order.iter().find(|id| remaining.contains(id)) else {
            return Vec::new();
        };
        let mut path: Vec<&TaskId> = vec![start];
        let mut current = start;
        loop {
            let next = self
                .dependencies
                .get(current)
                .and_then(|deps| deps.iter().find(|d| remaining.contains(d)));
            let Some(next) = next else {
                return path.into_iter().cloned().collect();
            };
            if let Some(pos) = path.iter().position(|id| *id == next) {
                let mut cycle: Vec<TaskId> = path[pos..].iter().rev().map(|id| (*id).clone()).collect();
                cycle.push(cycle[0].clone());
                return cycle;
            }
            path.push(next);
            current = next;
        }
    }

    /// 直接依赖该任务的任务
    pub fn dependents(&self, id: &str) -> &[TaskId] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// 校验计划任务：重复 ID、未知依赖、环
pub fn validate_tasks(tasks: &[Task]) -> Result<Vec<TaskId>, TrackerError> {
    TaskGraph::new(tasks)?.topological_order()
}
