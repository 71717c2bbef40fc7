//! Thread-free bookkeeping behind every runner.
//!
//! The queue never runs anything itself. A runner takes a [`RunnableTask`],
//! runs it wherever it likes and reports back through [`complete`]. All
//! methods expect the caller to serialize access (the executor keeps the
//! queue behind its mutex).
//!
//! [`complete`]: TaskGraphWorkQueue::complete

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::graph::{Dependencies, NamespaceToken, Task, TaskCategory, TaskGraph, TaskId};
use crate::state::{AtomicTaskState, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Finished,
    Cancelled,
    /// The task body panicked.
    Failed,
}

#[derive(Clone)]
pub struct CompletedTask {
    pub id: TaskId,
    pub outcome: TaskOutcome,
    pub task: Arc<dyn Task>,
}

impl fmt::Debug for CompletedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletedTask")
            .field("id", &self.id)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

pub struct RunnableTask {
    pub namespace: NamespaceToken,
    pub id: TaskId,
    pub category: TaskCategory,
    pub task: Arc<dyn Task>,
}

struct PendingTask {
    category: TaskCategory,
    dependencies: Dependencies,
    task: Arc<dyn Task>,
    state: Arc<AtomicTaskState>,
    sequence: u64,
    unfinished_dependencies: usize,
}

#[derive(Default)]
struct Namespace {
    /// Scheduled and running tasks.
    tasks: HashMap<TaskId, PendingTask>,
    dependents: HashMap<TaskId, SmallVec<[TaskId; 4]>>,
    /// How tasks that ran or were cancelled ended, kept while the current
    /// graph names them or their completion is still uncollected. Never rerun.
    finished: HashMap<TaskId, TaskOutcome>,
    completed: VecDeque<CompletedTask>,
}

impl Namespace {
    fn cancel(&mut self, id: TaskId, pending: PendingTask) {
        pending
            .state
            .expect_transition(TaskState::Scheduled, TaskState::Cancelled);
        self.finished.insert(id, TaskOutcome::Cancelled);
        self.completed.push_back(CompletedTask {
            id,
            outcome: TaskOutcome::Cancelled,
            task: pending.task,
        });
    }

    /// Cancels scheduled tasks that depend, directly or not, on a cancelled
    /// task. Failed dependencies still count as satisfied.
    fn cancel_dependents_of_cancelled(&mut self) {
        loop {
            let finished = &self.finished;
            let mut doomed: Vec<(u64, TaskId)> = self
                .tasks
                .iter()
                .filter(|(_, pending)| {
                    pending.state.load() == TaskState::Scheduled
                        && pending.dependencies.iter().any(|dependency| {
                            finished.get(dependency) == Some(&TaskOutcome::Cancelled)
                        })
                })
                .map(|(id, pending)| (pending.sequence, *id))
                .collect();
            if doomed.is_empty() {
                return;
            }
            doomed.sort_unstable();
            for (_, id) in doomed {
                if let Some(pending) = self.tasks.remove(&id) {
                    log::trace!("task {id:?} cancelled with its dependency");
                    self.cancel(id, pending);
                }
            }
        }
    }
}

type ReadyKey = (NamespaceToken, TaskId);

#[derive(Default)]
pub struct TaskGraphWorkQueue {
    namespaces: HashMap<NamespaceToken, Namespace>,
    ready_foreground: BTreeMap<u64, ReadyKey>,
    ready_concurrent: BTreeMap<u64, ReadyKey>,
    next_namespace: u64,
    next_sequence: u64,
    running: usize,
    foreground_running: bool,
}

impl TaskGraphWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate_namespace_token(&mut self) -> NamespaceToken {
        self.next_namespace += 1;
        NamespaceToken::from_raw(self.next_namespace)
    }

    /// Replaces the namespace's graph. Scheduled tasks the new graph drops are
    /// cancelled; running ones finish normally. A task whose dependency was
    /// cancelled and not yet collected completes as cancelled without running.
    pub fn schedule_tasks(&mut self, graph: TaskGraph) {
        if let Err(error) = graph.validate() {
            panic!("invalid task graph: {error}");
        }
        let token = graph.namespace();
        let wanted: HashSet<TaskId> = graph.nodes().iter().map(|node| node.id).collect();
        let namespace = self.namespaces.entry(token).or_default();

        let dropped: Vec<TaskId> = namespace
            .tasks
            .iter()
            .filter(|(id, pending)| {
                !wanted.contains(*id) && pending.state.load() == TaskState::Scheduled
            })
            .map(|(id, _)| *id)
            .collect();
        for id in dropped {
            if let Some(pending) = namespace.tasks.remove(&id) {
                pending
                    .state
                    .expect_transition(TaskState::Scheduled, TaskState::Cancelled);
                log::trace!("task {id:?} cancelled by reschedule");
                namespace.cancel(id, pending);
            }
        }
        let completed = &namespace.completed;
        namespace.finished.retain(|id, _| {
            wanted.contains(id) || completed.iter().any(|task| task.id == *id)
        });

        for node in graph.nodes() {
            if namespace.finished.contains_key(&node.id) {
                continue;
            }
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            match namespace.tasks.get_mut(&node.id) {
                Some(pending) if pending.state.load() == TaskState::Running => {}
                Some(pending) => {
                    pending.category = node.category;
                    pending.dependencies = node.dependencies.clone();
                    pending.task = node.task.clone();
                    pending.sequence = sequence;
                }
                None => {
                    let state = Arc::new(AtomicTaskState::new());
                    state.expect_transition(TaskState::NotScheduled, TaskState::Scheduled);
                    namespace.tasks.insert(
                        node.id,
                        PendingTask {
                            category: node.category,
                            dependencies: node.dependencies.clone(),
                            task: node.task.clone(),
                            state,
                            sequence,
                            unfinished_dependencies: 0,
                        },
                    );
                }
            }
        }

        namespace.cancel_dependents_of_cancelled();

        namespace.dependents.clear();
        let finished = &namespace.finished;
        for (id, pending) in namespace.tasks.iter_mut() {
            if pending.state.load() != TaskState::Scheduled {
                continue;
            }
            pending.unfinished_dependencies = pending
                .dependencies
                .iter()
                .filter(|dependency| !finished.contains_key(*dependency))
                .count();
            for dependency in &pending.dependencies {
                namespace
                    .dependents
                    .entry(*dependency)
                    .or_default()
                    .push(*id);
            }
        }

        self.ready_foreground.retain(|_, (owner, _)| *owner != token);
        self.ready_concurrent.retain(|_, (owner, _)| *owner != token);
        for (id, pending) in &namespace.tasks {
            if pending.state.load() == TaskState::Scheduled && pending.unfinished_dependencies == 0
            {
                let ready = match pending.category {
                    TaskCategory::Concurrent => &mut self.ready_concurrent,
                    TaskCategory::NonConcurrentForeground => &mut self.ready_foreground,
                };
                ready.insert(pending.sequence, (token, *id));
            }
        }
        log::debug!(
            "namespace {} scheduled {} tasks ({} pending)",
            token.raw(),
            graph.len(),
            namespace.tasks.len()
        );
    }

    /// Picks the next task to run and marks it running.
    ///
    /// A ready foreground task waits until nothing else is in flight and
    /// blocks new concurrent work meanwhile.
    pub fn take_next(&mut self) -> Option<RunnableTask> {
        if self.foreground_running {
            return None;
        }
        let (token, id) = if !self.ready_foreground.is_empty() {
            if self.running > 0 {
                return None;
            }
            let (_, key) = self.ready_foreground.pop_first()?;
            self.foreground_running = true;
            key
        } else {
            let (_, key) = self.ready_concurrent.pop_first()?;
            key
        };

        let Some(pending) = self
            .namespaces
            .get(&token)
            .and_then(|namespace| namespace.tasks.get(&id))
        else {
            panic!("ready task {id:?} missing from namespace {}", token.raw());
        };
        pending
            .state
            .expect_transition(TaskState::Scheduled, TaskState::Running);
        self.running += 1;
        Some(RunnableTask {
            namespace: token,
            id,
            category: pending.category,
            task: pending.task.clone(),
        })
    }

    pub fn complete(&mut self, runnable: &RunnableTask, outcome: TaskOutcome) {
        let Some(namespace) = self.namespaces.get_mut(&runnable.namespace) else {
            panic!("completed task {:?} has no namespace", runnable.id);
        };
        let Some(pending) = namespace.tasks.remove(&runnable.id) else {
            panic!("completed task {:?} was not running", runnable.id);
        };
        pending
            .state
            .expect_transition(TaskState::Running, TaskState::Completed);
        self.running -= 1;
        if runnable.category == TaskCategory::NonConcurrentForeground {
            self.foreground_running = false;
        }

        namespace.finished.insert(runnable.id, outcome);
        namespace.completed.push_back(CompletedTask {
            id: runnable.id,
            outcome,
            task: pending.task,
        });

        let Some(dependents) = namespace.dependents.remove(&runnable.id) else {
            return;
        };
        for dependent in dependents {
            let Some(waiting) = namespace.tasks.get_mut(&dependent) else {
                continue;
            };
            if waiting.state.load() != TaskState::Scheduled {
                continue;
            }
            waiting.unfinished_dependencies -= 1;
            if waiting.unfinished_dependencies == 0 {
                let ready = match waiting.category {
                    TaskCategory::Concurrent => &mut self.ready_concurrent,
                    TaskCategory::NonConcurrentForeground => &mut self.ready_foreground,
                };
                ready.insert(waiting.sequence, (runnable.namespace, dependent));
            }
        }
    }

    /// Cancels every task that has not started, in all namespaces.
    pub fn cancel_all_scheduled(&mut self) -> usize {
        let mut cancelled = 0;
        for namespace in self.namespaces.values_mut() {
            let scheduled: Vec<TaskId> = namespace
                .tasks
                .iter()
                .filter(|(_, pending)| pending.state.load() == TaskState::Scheduled)
                .map(|(id, _)| *id)
                .collect();
            for id in scheduled {
                if let Some(pending) = namespace.tasks.remove(&id) {
                    namespace.cancel(id, pending);
                    cancelled += 1;
                }
            }
            namespace.dependents.clear();
        }
        self.ready_foreground.clear();
        self.ready_concurrent.clear();
        cancelled
    }

    pub fn collect_completed_tasks(&mut self, token: NamespaceToken) -> Vec<CompletedTask> {
        self.namespaces
            .get_mut(&token)
            .map(|namespace| namespace.completed.drain(..).collect())
            .unwrap_or_default()
    }

    /// Whether the namespace still has tasks scheduled or running.
    pub fn has_unfinished_tasks(&self, token: NamespaceToken) -> bool {
        self.namespaces
            .get(&token)
            .is_some_and(|namespace| !namespace.tasks.is_empty())
    }

    pub fn has_ready_tasks(&self) -> bool {
        !self.ready_foreground.is_empty() || !self.ready_concurrent.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn is_idle(&self) -> bool {
        self.running == 0 && self.namespaces.values().all(|namespace| namespace.tasks.is_empty())
    }

    pub fn task_state(&self, token: NamespaceToken, id: TaskId) -> Option<TaskState> {
        self.namespaces
            .get(&token)
            .and_then(|namespace| namespace.tasks.get(&id))
            .map(|pending| pending.state.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Task for Noop {
        fn run(&self) {}
    }

    fn graph(token: NamespaceToken) -> TaskGraph {
        TaskGraph::new(token)
    }

    fn run_next(queue: &mut TaskGraphWorkQueue) -> TaskId {
        let runnable = queue.take_next().expect("a ready task");
        queue.complete(&runnable, TaskOutcome::Finished);
        runnable.id
    }

    #[test]
    fn dependencies_gate_readiness() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut graph = graph(token);
        graph
            .add_task(TaskId(2), TaskCategory::Concurrent, [TaskId(1)], Arc::new(Noop))
            .add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(graph);

        let first = queue.take_next().expect("task 1 ready");
        assert_eq!(first.id, TaskId(1));
        assert!(queue.take_next().is_none());
        queue.complete(&first, TaskOutcome::Finished);
        assert_eq!(run_next(&mut queue), TaskId(2));
        assert!(queue.is_idle());
    }

    #[test]
    fn ready_tasks_follow_submission_order() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut graph = graph(token);
        for id in [5, 3, 9] {
            graph.add_task(TaskId(id), TaskCategory::Concurrent, [], Arc::new(Noop));
        }
        queue.schedule_tasks(graph);

        let order: Vec<TaskId> = (0..3).map(|_| run_next(&mut queue)).collect();
        assert_eq!(order, vec![TaskId(5), TaskId(3), TaskId(9)]);
    }

    #[test]
    fn foreground_task_runs_alone_and_first() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut graph = graph(token);
        graph
            .add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop))
            .add_task(TaskId(2), TaskCategory::NonConcurrentForeground, [], Arc::new(Noop))
            .add_task(TaskId(3), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(graph);

        let foreground = queue.take_next().expect("foreground ready");
        assert_eq!(foreground.id, TaskId(2));
        assert!(queue.take_next().is_none());
        queue.complete(&foreground, TaskOutcome::Finished);

        let concurrent = queue.take_next().expect("concurrent ready");
        let other = queue.take_next().expect("second concurrent ready");
        assert_eq!((concurrent.id, other.id), (TaskId(1), TaskId(3)));
        assert_eq!(queue.running_count(), 2);
    }

    #[test]
    fn foreground_waits_for_running_work_to_drain() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut first = graph(token);
        first.add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(first);
        let running = queue.take_next().expect("task 1");

        let mut second = graph(token);
        second
            .add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop))
            .add_task(TaskId(2), TaskCategory::NonConcurrentForeground, [], Arc::new(Noop))
            .add_task(TaskId(3), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(second);
        assert!(queue.take_next().is_none());

        queue.complete(&running, TaskOutcome::Finished);
        assert_eq!(run_next(&mut queue), TaskId(2));
        assert_eq!(run_next(&mut queue), TaskId(3));
    }

    #[test]
    fn reschedule_cancels_dropped_tasks_once() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut first = graph(token);
        first
            .add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop))
            .add_task(TaskId(2), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(first);
        let running = queue.take_next().expect("task 1");

        queue.schedule_tasks(graph(token));
        let completed = queue.collect_completed_tasks(token);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, TaskId(2));
        assert_eq!(completed[0].outcome, TaskOutcome::Cancelled);

        assert!(queue.has_unfinished_tasks(token));
        queue.complete(&running, TaskOutcome::Finished);
        let completed = queue.collect_completed_tasks(token);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].outcome, TaskOutcome::Finished);
        assert!(queue.collect_completed_tasks(token).is_empty());
    }

    #[test]
    fn finished_tasks_named_again_are_not_rerun() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut first = graph(token);
        first.add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(first);
        run_next(&mut queue);

        let mut second = graph(token);
        second
            .add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop))
            .add_task(TaskId(2), TaskCategory::Concurrent, [TaskId(1)], Arc::new(Noop));
        queue.schedule_tasks(second);
        assert_eq!(run_next(&mut queue), TaskId(2));
        assert!(queue.take_next().is_none());
    }

    #[test]
    fn cancelled_task_named_again_before_collection_is_not_rerun() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut first = graph(token);
        first.add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(first);
        queue.schedule_tasks(graph(token));

        let mut again = graph(token);
        again.add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(again);
        assert!(queue.take_next().is_none());

        let completed = queue.collect_completed_tasks(token);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].outcome, TaskOutcome::Cancelled);
    }

    #[test]
    fn task_depending_on_an_uncollected_cancellation_is_cancelled_too() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut first = graph(token);
        first.add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(first);
        queue.schedule_tasks(graph(token));

        let mut again = graph(token);
        again
            .add_task(TaskId(3), TaskCategory::Concurrent, [TaskId(2)], Arc::new(Noop))
            .add_task(TaskId(2), TaskCategory::Concurrent, [TaskId(1)], Arc::new(Noop))
            .add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop))
            .add_task(TaskId(4), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(again);

        assert_eq!(run_next(&mut queue), TaskId(4));
        assert!(queue.take_next().is_none());
        assert!(queue.is_idle());
        let completed = queue.collect_completed_tasks(token);
        let outcomes: Vec<_> = completed.iter().map(|task| (task.id, task.outcome)).collect();
        assert_eq!(
            outcomes,
            vec![
                (TaskId(1), TaskOutcome::Cancelled),
                (TaskId(2), TaskOutcome::Cancelled),
                (TaskId(3), TaskOutcome::Cancelled),
                (TaskId(4), TaskOutcome::Finished),
            ]
        );

        // Once collected, the same graph runs in dependency order.
        let mut retry = graph(token);
        retry
            .add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop))
            .add_task(TaskId(2), TaskCategory::Concurrent, [TaskId(1)], Arc::new(Noop));
        queue.schedule_tasks(retry);
        assert_eq!(run_next(&mut queue), TaskId(1));
        assert_eq!(run_next(&mut queue), TaskId(2));
    }

    #[test]
    fn failed_dependency_still_releases_its_dependents() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut graph = graph(token);
        graph
            .add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop))
            .add_task(TaskId(2), TaskCategory::Concurrent, [TaskId(1)], Arc::new(Noop));
        queue.schedule_tasks(graph);

        let failing = queue.take_next().expect("task 1");
        queue.complete(&failing, TaskOutcome::Failed);
        assert_eq!(run_next(&mut queue), TaskId(2));
    }

    #[test]
    fn namespaces_are_isolated() {
        let mut queue = TaskGraphWorkQueue::new();
        let a = queue.generate_namespace_token();
        let b = queue.generate_namespace_token();
        let mut graph_a = graph(a);
        graph_a.add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop));
        let mut graph_b = graph(b);
        graph_b.add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop));
        queue.schedule_tasks(graph_a);
        queue.schedule_tasks(graph_b);

        queue.schedule_tasks(graph(a));
        assert_eq!(queue.collect_completed_tasks(a).len(), 1);
        assert!(queue.collect_completed_tasks(b).is_empty());
        assert_eq!(queue.task_state(b, TaskId(1)), Some(TaskState::Scheduled));
    }

    #[test]
    fn cancel_all_completes_every_scheduled_task() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut graph = graph(token);
        graph
            .add_task(TaskId(1), TaskCategory::Concurrent, [], Arc::new(Noop))
            .add_task(TaskId(2), TaskCategory::Concurrent, [TaskId(1)], Arc::new(Noop));
        queue.schedule_tasks(graph);

        assert_eq!(queue.cancel_all_scheduled(), 2);
        assert!(queue.is_idle());
        assert!(queue.take_next().is_none());
        assert_eq!(queue.collect_completed_tasks(token).len(), 2);
    }

    #[test]
    #[should_panic(expected = "invalid task graph")]
    fn invalid_graph_panics() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let mut graph = graph(token);
        graph.add_task(TaskId(1), TaskCategory::Concurrent, [TaskId(1)], Arc::new(Noop));
        queue.schedule_tasks(graph);
    }
}
