use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;
use task_graph::{Task, TaskCategory, TaskId, TaskOutcome};
use thiserror::Error;

use crate::buffer::{RasterBufferError, RasterTaskClient};
use crate::decode::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileTaskKind {
    ImageDecode,
    Raster,
}

#[derive(Debug, Error)]
pub enum TileTaskError {
    #[error(transparent)]
    Buffer(#[from] RasterBufferError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("task body panicked")]
    Panicked,
}

#[derive(Debug)]
pub enum RasterOutcome {
    Completed,
    Cancelled,
    Failed(TileTaskError),
}

impl RasterOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RasterOutcome::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RasterOutcome::Failed(_))
    }
}

#[derive(Debug)]
pub struct TileTaskCompletion {
    pub task_id: TaskId,
    pub kind: TileTaskKind,
    pub outcome: RasterOutcome,
}

/// Single-use schedule/complete flags shared by every tile task.
#[derive(Debug, Default)]
pub struct TileTaskLifecycle {
    scheduled: AtomicBool,
    completed: AtomicBool,
}

impl TileTaskLifecycle {
    pub fn will_schedule(&self) {
        if self.has_been_scheduled() {
            panic!("tile task scheduled twice");
        }
    }

    pub fn did_schedule(&self) {
        self.scheduled.store(true, Ordering::Release);
    }

    pub fn has_been_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }

    pub fn will_complete(&self) {
        if !self.has_been_scheduled() {
            panic!("completing a tile task that was never scheduled");
        }
        if self.has_completed() {
            panic!("tile task completed twice");
        }
    }

    pub fn did_complete(&self) {
        self.completed.store(true, Ordering::Release);
    }

    pub fn has_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

pub type TileTaskDependencies = SmallVec<[Arc<dyn TileTask>; 4]>;

/// Raster-side work with origin-thread hooks around the worker-thread body.
pub trait TileTask: Send + Sync {
    fn id(&self) -> TaskId;

    fn kind(&self) -> TileTaskKind;

    fn category(&self) -> TaskCategory {
        TaskCategory::Concurrent
    }

    /// Tasks that must finish before this one runs.
    fn dependencies(&self) -> TileTaskDependencies;

    fn lifecycle(&self) -> &TileTaskLifecycle;

    fn schedule_on_origin_thread(&self, client: &mut dyn RasterTaskClient);

    fn run_on_worker_thread(&self);

    fn complete_on_origin_thread(
        &self,
        client: &mut dyn RasterTaskClient,
        outcome: TaskOutcome,
    ) -> RasterOutcome;
}

/// Lets the task graph run a tile task without knowing about raster clients.
pub(crate) struct TileTaskAdapter(pub(crate) Arc<dyn TileTask>);

impl Task for TileTaskAdapter {
    fn run(&self) {
        self.0.run_on_worker_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_tracks_schedule_and_complete() {
        let lifecycle = TileTaskLifecycle::default();
        lifecycle.will_schedule();
        lifecycle.did_schedule();
        assert!(lifecycle.has_been_scheduled());
        lifecycle.will_complete();
        lifecycle.did_complete();
        assert!(lifecycle.has_completed());
    }

    #[test]
    #[should_panic(expected = "tile task scheduled twice")]
    fn double_schedule_panics() {
        let lifecycle = TileTaskLifecycle::default();
        lifecycle.did_schedule();
        lifecycle.will_schedule();
    }

    #[test]
    #[should_panic(expected = "tile task completed twice")]
    fn double_complete_panics() {
        let lifecycle = TileTaskLifecycle::default();
        lifecycle.did_schedule();
        lifecycle.did_complete();
        lifecycle.will_complete();
    }
}
