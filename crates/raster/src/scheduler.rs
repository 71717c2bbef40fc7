use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use task_graph::{NamespaceToken, TaskGraph, TaskGraphRunner, TaskId};

use crate::buffer::RasterTaskClient;
use crate::format::ResourceFormat;
use crate::tile_task::{TileTask, TileTaskAdapter, TileTaskCompletion};

/// Feeds tile tasks to a task graph runner and settles their completions on
/// the origin thread with the injected buffer client.
pub struct TileTaskScheduler {
    runner: Arc<dyn TaskGraphRunner>,
    namespace: NamespaceToken,
    client: Box<dyn RasterTaskClient>,
    in_flight: HashMap<TaskId, Arc<dyn TileTask>>,
}

impl TileTaskScheduler {
    pub fn new(runner: Arc<dyn TaskGraphRunner>, client: Box<dyn RasterTaskClient>) -> Self {
        let namespace = runner.namespace_token();
        Self {
            runner,
            namespace,
            client,
            in_flight: HashMap::new(),
        }
    }

    pub fn namespace(&self) -> NamespaceToken {
        self.namespace
    }

    /// Replaces the previously scheduled set. `tasks` (typically raster
    /// tasks) pull in their dependencies; tasks no longer named are cancelled
    /// unless already running.
    pub fn schedule_tasks(&mut self, tasks: &[Arc<dyn TileTask>]) {
        let mut ordered = Vec::new();
        let mut visited = HashSet::new();
        for task in tasks {
            collect_in_dependency_order(task, &mut visited, &mut ordered);
        }

        let mut graph = TaskGraph::new(self.namespace);
        for task in &ordered {
            if !task.lifecycle().has_been_scheduled() {
                task.lifecycle().will_schedule();
                task.schedule_on_origin_thread(self.client.as_mut());
                task.lifecycle().did_schedule();
                self.in_flight.insert(task.id(), task.clone());
            }
            let dependencies = task
                .dependencies()
                .iter()
                .filter(|dependency| !dependency.lifecycle().has_completed())
                .map(|dependency| dependency.id())
                .collect::<Vec<_>>();
            graph.add_task(
                task.id(),
                task.category(),
                dependencies,
                Arc::new(TileTaskAdapter(task.clone())),
            );
        }
        log::trace!("scheduling {} tile tasks", graph.len());
        self.runner.schedule_tasks(graph);
    }

    /// Settles everything the runner finished since the last call. Call once per frame.
    pub fn check_for_completed_tasks(&mut self) -> Vec<TileTaskCompletion> {
        let completed = self.runner.collect_completed_tasks(self.namespace);
        let mut reports = Vec::with_capacity(completed.len());
        for finished in completed {
            let Some(task) = self.in_flight.remove(&finished.id) else {
                panic!("completion for unknown tile task {:?}", finished.id);
            };
            task.lifecycle().will_complete();
            let outcome = task.complete_on_origin_thread(self.client.as_mut(), finished.outcome);
            task.lifecycle().did_complete();
            reports.push(TileTaskCompletion {
                task_id: finished.id,
                kind: task.kind(),
                outcome,
            });
        }
        reports
    }

    /// Cancels everything not started and waits for running tasks. Their
    /// completions are still delivered by the next `check_for_completed_tasks`.
    pub fn shutdown(&mut self) {
        log::debug!("tile task scheduler shutting down");
        self.runner.schedule_tasks(TaskGraph::new(self.namespace));
        self.runner.wait_for_tasks_to_finish_running(self.namespace);
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn resource_format(&self, must_support_alpha: bool) -> ResourceFormat {
        self.client.resource_format(must_support_alpha)
    }

    pub fn resource_requires_swizzle(&self, must_support_alpha: bool) -> bool {
        self.client.resource_requires_swizzle(must_support_alpha)
    }
}

// Finished dependencies are left out; the graph treats them as satisfied.
fn collect_in_dependency_order(
    task: &Arc<dyn TileTask>,
    visited: &mut HashSet<TaskId>,
    ordered: &mut Vec<Arc<dyn TileTask>>,
) {
    if task.lifecycle().has_completed() || !visited.insert(task.id()) {
        return;
    }
    for dependency in task.dependencies() {
        collect_in_dependency_order(&dependency, visited, ordered);
    }
    ordered.push(task.clone());
}
