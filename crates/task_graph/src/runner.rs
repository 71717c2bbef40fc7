use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::graph::{NamespaceToken, TaskGraph};
use crate::work_queue::{CompletedTask, RunnableTask, TaskOutcome};

/// What producers hold to get work executed.
pub trait TaskGraphRunner: Send + Sync {
    fn namespace_token(&self) -> NamespaceToken;

    /// Replaces the namespace's previous graph.
    fn schedule_tasks(&self, graph: TaskGraph);

    /// Blocks until the namespace has nothing scheduled or running.
    fn wait_for_tasks_to_finish_running(&self, token: NamespaceToken);

    fn collect_completed_tasks(&self, token: NamespaceToken) -> Vec<CompletedTask>;

    /// Hands every completion gathered since the last call to `on_completed`,
    /// on the calling thread. Returns how many were dispatched.
    fn check_for_completed_tasks(
        &self,
        token: NamespaceToken,
        on_completed: &mut dyn FnMut(CompletedTask),
    ) -> usize {
        let completed = self.collect_completed_tasks(token);
        let count = completed.len();
        for task in completed {
            on_completed(task);
        }
        count
    }
}

pub(crate) fn run_guarded(runnable: &RunnableTask) -> TaskOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| runnable.task.run())) {
        Ok(()) => TaskOutcome::Finished,
        Err(payload) => {
            log::warn!(
                "task {:?} in namespace {} panicked: {}",
                runnable.id,
                runnable.namespace.raw(),
                panic_message(payload.as_ref())
            );
            TaskOutcome::Failed
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
