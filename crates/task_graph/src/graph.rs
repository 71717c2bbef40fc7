use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Identifies one producer sharing a runner. Issued by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceToken(u64);

impl NamespaceToken {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskCategory {
    Concurrent,
    /// Runs alone: no other task of any category is in flight meanwhile.
    NonConcurrentForeground,
}

/// Work executed on a runner thread. Completion is reported separately on the
/// producing thread, so `run` must not touch producer-owned state.
pub trait Task: Send + Sync {
    fn run(&self);
}

pub type Dependencies = SmallVec<[TaskId; 4]>;

#[derive(Clone)]
pub struct TaskNode {
    pub id: TaskId,
    pub category: TaskCategory,
    pub dependencies: Dependencies,
    pub task: Arc<dyn Task>,
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("task {0:?} appears more than once")]
    DuplicateTask(TaskId),
    #[error("task {task:?} depends on {dependency:?}, which is not in the graph")]
    UnknownDependency { task: TaskId, dependency: TaskId },
    #[error("dependency cycle through task {0:?}")]
    Cycle(TaskId),
}

/// A namespace's complete set of wanted tasks. Node order is submission order.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    namespace: NamespaceToken,
    nodes: Vec<TaskNode>,
}

impl TaskGraph {
    pub fn new(namespace: NamespaceToken) -> Self {
        Self {
            namespace,
            nodes: Vec::new(),
        }
    }

    pub fn namespace(&self) -> NamespaceToken {
        self.namespace
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_task(
        &mut self,
        id: TaskId,
        category: TaskCategory,
        dependencies: impl IntoIterator<Item = TaskId>,
        task: Arc<dyn Task>,
    ) -> &mut Self {
        self.nodes.push(TaskNode {
            id,
            category,
            dependencies: dependencies.into_iter().collect(),
            task,
        });
        self
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        let mut index_by_id = HashMap::with_capacity(self.nodes.len());
        for (index, node) in self.nodes.iter().enumerate() {
            if index_by_id.insert(node.id, index).is_some() {
                return Err(GraphError::DuplicateTask(node.id));
            }
        }
        for node in &self.nodes {
            for dependency in &node.dependencies {
                if !index_by_id.contains_key(dependency) {
                    return Err(GraphError::UnknownDependency {
                        task: node.id,
                        dependency: *dependency,
                    });
                }
            }
        }

        // Kahn's algorithm: whatever never reaches in-degree zero sits on a cycle.
        let mut remaining: Vec<usize> = self
            .nodes
            .iter()
            .map(|node| node.dependencies.len())
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            for dependency in &node.dependencies {
                dependents[index_by_id[dependency]].push(index);
            }
        }
        let mut ready: Vec<usize> = (0..self.nodes.len())
            .filter(|index| remaining[*index] == 0)
            .collect();
        let mut visited = HashSet::with_capacity(self.nodes.len());
        while let Some(index) = ready.pop() {
            visited.insert(index);
            for dependent in &dependents[index] {
                remaining[*dependent] -= 1;
                if remaining[*dependent] == 0 {
                    ready.push(*dependent);
                }
            }
        }
        if let Some(index) = (0..self.nodes.len()).find(|index| !visited.contains(index)) {
            return Err(GraphError::Cycle(self.nodes[index].id));
        }
        Ok(())
    }
}
