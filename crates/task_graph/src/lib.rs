//! Dependency-ordered task execution on a worker pool.
//!
//! Producers build a [`TaskGraph`] per namespace and hand it to a
//! [`TaskGraphRunner`]. Completions are never delivered from worker threads:
//! the producer drains them with [`TaskGraphRunner::check_for_completed_tasks`].

pub mod executor;
pub mod graph;
pub mod runner;
pub mod state;
pub mod synchronous;
pub mod work_queue;

pub use executor::{ExecutorConfig, ExecutorError, TaskGraphExecutor};
pub use graph::{Dependencies, GraphError, NamespaceToken, Task, TaskCategory, TaskGraph, TaskId, TaskNode};
pub use runner::TaskGraphRunner;
pub use state::{AtomicTaskState, TaskState};
pub use synchronous::SynchronousTaskGraphRunner;
pub use work_queue::{CompletedTask, RunnableTask, TaskGraphWorkQueue, TaskOutcome};
