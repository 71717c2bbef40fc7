use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use thiserror::Error;

use crate::graph::{NamespaceToken, TaskGraph};
use crate::runner::{TaskGraphRunner, run_guarded};
use crate::work_queue::{CompletedTask, TaskGraphWorkQueue};

const MAX_DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub worker_count: usize,
    pub thread_name_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().clamp(1, MAX_DEFAULT_WORKERS),
            thread_name_prefix: "task_graph_worker".to_owned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor needs at least one worker")]
    NoWorkers,
    #[error("failed to spawn worker thread {index}")]
    SpawnWorker {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

struct ExecutorState {
    queue: TaskGraphWorkQueue,
    shutdown: bool,
}

struct Shared {
    state: Mutex<ExecutorState>,
    work_available: Condvar,
    task_finished: Condvar,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ExecutorState> {
        self.state.lock().expect("task graph executor lock poisoned")
    }
}

/// Fixed pool of worker threads running task graphs.
pub struct TaskGraphExecutor {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskGraphExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        if config.worker_count == 0 {
            return Err(ExecutorError::NoWorkers);
        }
        let executor = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ExecutorState {
                    queue: TaskGraphWorkQueue::new(),
                    shutdown: false,
                }),
                work_available: Condvar::new(),
                task_finished: Condvar::new(),
            }),
            workers: Mutex::new(Vec::with_capacity(config.worker_count)),
        };

        for index in 0..config.worker_count {
            let shared = Arc::clone(&executor.shared);
            let spawned = std::thread::Builder::new()
                .name(format!("{}_{index}", config.thread_name_prefix))
                .spawn(move || worker_loop(shared, index));
            match spawned {
                Ok(handle) => executor.lock_workers().push(handle),
                // Dropping the executor joins the workers already started.
                Err(source) => return Err(ExecutorError::SpawnWorker { index, source }),
            }
        }
        log::debug!("task graph executor started {} workers", config.worker_count);
        Ok(executor)
    }

    pub fn worker_count(&self) -> usize {
        self.lock_workers().len()
    }

    /// Cancels everything not yet started, lets in-flight tasks finish and
    /// joins the workers. Completions stay collectable afterwards.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock_state();
            if !state.shutdown {
                state.shutdown = true;
                let cancelled = state.queue.cancel_all_scheduled();
                log::debug!("task graph executor shutting down; {cancelled} tasks cancelled");
            }
        }
        self.shared.work_available.notify_all();
        self.shared.task_finished.notify_all();

        let workers = std::mem::take(&mut *self.lock_workers());
        for worker in workers {
            if worker.join().is_err() {
                log::warn!("task graph worker exited by panic");
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.lock_state().shutdown
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers
            .lock()
            .expect("task graph executor worker list lock poisoned")
    }
}

impl TaskGraphRunner for TaskGraphExecutor {
    fn namespace_token(&self) -> NamespaceToken {
        self.shared.lock_state().queue.generate_namespace_token()
    }

    fn schedule_tasks(&self, graph: TaskGraph) {
        {
            let mut state = self.shared.lock_state();
            if state.shutdown {
                panic!("scheduling tasks after shutdown");
            }
            state.queue.schedule_tasks(graph);
        }
        self.shared.work_available.notify_all();
        // Dropped tasks may have completed as cancelled.
        self.shared.task_finished.notify_all();
    }

    fn wait_for_tasks_to_finish_running(&self, token: NamespaceToken) {
        let mut state = self.shared.lock_state();
        while state.queue.has_unfinished_tasks(token) {
            state = self
                .shared
                .task_finished
                .wait(state)
                .expect("task graph executor lock poisoned");
        }
    }

    fn collect_completed_tasks(&self, token: NamespaceToken) -> Vec<CompletedTask> {
        self.shared.lock_state().queue.collect_completed_tasks(token)
    }
}

impl Drop for TaskGraphExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    log::trace!("task graph worker {index} started");
    let mut state = shared.lock_state();
    loop {
        if let Some(runnable) = state.queue.take_next() {
            drop(state);
            let outcome = run_guarded(&runnable);
            state = shared.lock_state();
            state.queue.complete(&runnable, outcome);
            // Completion can make dependents or a waiting foreground task ready.
            shared.work_available.notify_all();
            shared.task_finished.notify_all();
            continue;
        }
        // Shutdown cancelled everything unstarted, so nothing can become ready again.
        if state.shutdown {
            break;
        }
        state = shared
            .work_available
            .wait(state)
            .expect("task graph executor lock poisoned");
    }
    drop(state);
    log::trace!("task graph worker {index} exiting");
}
