use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use display::{DisplayClient, OutputSurface};
use frame_protocol::SurfaceId;
use raster::{RasterOutcome, TileTask, TileTaskCompletion, TileTaskKind, TileTaskScheduler};
use task_graph::TaskId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileDrainStats {
    pub completed: u32,
    pub cancelled: u32,
    pub failed: u32,
}

impl TileDrainStats {
    fn observe(&mut self, outcome: &RasterOutcome) {
        let counter = match outcome {
            RasterOutcome::Completed => &mut self.completed,
            RasterOutcome::Cancelled => &mut self.cancelled,
            RasterOutcome::Failed(_) => &mut self.failed,
        };
        *counter = counter
            .checked_add(1)
            .expect("tile completion count overflow");
    }

    pub fn total(&self) -> u32 {
        self.completed + self.cancelled + self.failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_sequence_id: u64,
    pub tiles: TileDrainStats,
    pub damaged_surfaces: u32,
    pub drew: bool,
}

#[derive(Debug)]
pub struct FrameResult {
    pub stats: FrameStats,
    pub completions: Vec<TileTaskCompletion>,
}

/// A tile task and the surface its raster output lands on.
pub struct RasterWork {
    pub task: Arc<dyn TileTask>,
    pub surface: SurfaceId,
}

/// Per-frame driver: drains tile completions, turns finished rasters into
/// surface damage and then lets the display decide whether to draw.
pub struct FrameLoop<S: OutputSurface + 'static> {
    display: DisplayClient<S>,
    tiles: TileTaskScheduler,
    tile_targets: HashMap<TaskId, SurfaceId>,
    next_frame_sequence_id: u64,
}

impl<S: OutputSurface + 'static> FrameLoop<S> {
    pub fn new(display: DisplayClient<S>, tiles: TileTaskScheduler) -> Self {
        Self {
            display,
            tiles,
            tile_targets: HashMap::new(),
            next_frame_sequence_id: 1,
        }
    }

    pub fn display(&self) -> &DisplayClient<S> {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut DisplayClient<S> {
        &mut self.display
    }

    pub fn tiles(&self) -> &TileTaskScheduler {
        &self.tiles
    }

    /// Replaces the scheduled raster work. Work left out of `work` is cancelled
    /// unless it already started.
    pub fn schedule_raster_work(&mut self, work: Vec<RasterWork>) {
        let mut tasks = Vec::with_capacity(work.len());
        for RasterWork { task, surface } in work {
            if !task.lifecycle().has_completed() {
                self.tile_targets.insert(task.id(), surface);
            }
            tasks.push(task);
        }
        self.tiles.schedule_tasks(&tasks);
    }

    /// Tasks whose completion has not been drained yet.
    pub fn pending_tile_count(&self) -> usize {
        self.tiles.in_flight_count()
    }

    pub fn next_wakeup(&self) -> Option<Instant> {
        self.display.next_wakeup()
    }

    pub fn run_frame(&mut self, now: Instant) -> FrameResult {
        let frame_sequence_id = self.next_frame_sequence_id;
        self.next_frame_sequence_id = self
            .next_frame_sequence_id
            .checked_add(1)
            .expect("frame sequence id overflow");

        let completions = self.tiles.check_for_completed_tasks();
        let mut tiles = TileDrainStats::default();
        let mut damaged = BTreeSet::new();
        for completion in &completions {
            tiles.observe(&completion.outcome);
            let target = self.tile_targets.remove(&completion.task_id);
            if completion.kind != TileTaskKind::Raster {
                continue;
            }
            match (&completion.outcome, target) {
                (RasterOutcome::Completed, Some(surface)) => {
                    damaged.insert(surface);
                }
                (RasterOutcome::Failed(error), _) => {
                    log::warn!("raster task {:?} failed: {error}", completion.task_id);
                }
                _ => {}
            }
        }

        for surface in &damaged {
            self.display.surface_damaged(*surface);
        }
        let drew = self.display.run_until(now);
        if tiles.total() > 0 || drew {
            log::trace!(
                "frame {frame_sequence_id}: {} tile completions, {} surfaces damaged, drew={drew}",
                tiles.total(),
                damaged.len()
            );
        }

        FrameResult {
            stats: FrameStats {
                frame_sequence_id,
                tiles,
                damaged_surfaces: u32::try_from(damaged.len())
                    .expect("damaged surface count overflow"),
                drew,
            },
            completions,
        }
    }

    /// Cancels outstanding tile work and returns every completion still owed.
    pub fn shutdown(&mut self) -> Vec<TileTaskCompletion> {
        self.tiles.shutdown();
        let completions = self.tiles.check_for_completed_tasks();
        self.tile_targets.clear();
        log::debug!("frame loop shut down; {} tile completions drained", completions.len());
        completions
    }
}
