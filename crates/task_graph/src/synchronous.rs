use std::sync::{Mutex, MutexGuard};

use crate::graph::{NamespaceToken, TaskGraph};
use crate::runner::{TaskGraphRunner, run_guarded};
use crate::work_queue::{CompletedTask, TaskGraphWorkQueue};

/// Runs tasks on the calling thread, only when asked to.
#[derive(Default)]
pub struct SynchronousTaskGraphRunner {
    queue: Mutex<TaskGraphWorkQueue>,
    shutdown: Mutex<bool>,
}

impl SynchronousTaskGraphRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one ready task. Returns false when nothing was ready.
    pub fn run_one(&self) -> bool {
        let Some(runnable) = self.lock_queue().take_next() else {
            return false;
        };
        let outcome = run_guarded(&runnable);
        self.lock_queue().complete(&runnable, outcome);
        true
    }

    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    pub fn shutdown(&self) {
        let mut shutdown = self.lock_shutdown();
        if !*shutdown {
            *shutdown = true;
            let cancelled = self.lock_queue().cancel_all_scheduled();
            log::debug!("synchronous task runner shut down; {cancelled} tasks cancelled");
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, TaskGraphWorkQueue> {
        self.queue
            .lock()
            .expect("synchronous task runner queue lock poisoned")
    }

    fn lock_shutdown(&self) -> MutexGuard<'_, bool> {
        self.shutdown
            .lock()
            .expect("synchronous task runner shutdown lock poisoned")
    }
}

impl TaskGraphRunner for SynchronousTaskGraphRunner {
    fn namespace_token(&self) -> NamespaceToken {
        self.lock_queue().generate_namespace_token()
    }

    fn schedule_tasks(&self, graph: TaskGraph) {
        if *self.lock_shutdown() {
            panic!("scheduling tasks after shutdown");
        }
        self.lock_queue().schedule_tasks(graph);
    }

    fn wait_for_tasks_to_finish_running(&self, token: NamespaceToken) {
        while self.lock_queue().has_unfinished_tasks(token) {
            if !self.run_one() {
                panic!(
                    "namespace {} has unfinished tasks but nothing is ready to run",
                    token.raw()
                );
            }
        }
    }

    fn collect_completed_tasks(&self, token: NamespaceToken) -> Vec<CompletedTask> {
        self.lock_queue().collect_completed_tasks(token)
    }
}
