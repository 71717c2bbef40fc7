use std::time::Instant;

use frame_protocol::SurfaceId;

use crate::FrameSchedulerConfig;
use crate::clock::ClockObserver;
use crate::damage::SurfaceDamageState;
use crate::tick::FrameTick;

/// Assembles and presents a frame. Returns false when nothing was swapped.
pub trait FrameSchedulerClient {
    fn draw_and_swap(&mut self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Immediate,
    At(Instant),
}

impl Deadline {
    pub fn is_due(self, now: Instant) -> bool {
        match self {
            Deadline::Immediate => true,
            Deadline::At(at) => at <= now,
        }
    }

    pub fn instant(self, now: Instant) -> Instant {
        match self {
            Deadline::Immediate => now,
            Deadline::At(at) => at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSchedulerState {
    Idle,
    WaitingForTick,
    InsideDeadlineInterval,
    Drawing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSchedulerStats {
    pub ticks: u64,
    pub frames_drawn: u64,
    pub draws_deferred: u64,
}

/// Decides when to draw, driven by clock ticks, surface damage and swap acks.
///
/// The scheduler does not own a clock. It reports through [`wants_ticks`]
/// whether it should be observing one and through [`take_frame_finished`]
/// when it is done with the current tick; the owner forwards both to its
/// clock source.
///
/// [`wants_ticks`]: FrameScheduler::wants_ticks
/// [`take_frame_finished`]: FrameScheduler::take_frame_finished
pub struct FrameScheduler<C: FrameSchedulerClient> {
    client: C,
    max_pending_swaps: u32,
    pending_swaps: u32,
    damage: SurfaceDamageState,
    current_tick: Option<FrameTick>,
    deadline: Option<Deadline>,
    inside_deadline_interval: bool,
    drawing: bool,
    needs_draw: bool,
    draw_deferred_by_backpressure: bool,
    output_surface_lost: bool,
    root_surface_resources_locked: bool,
    observing_clock: bool,
    source_paused: bool,
    frame_finished: bool,
    stats: FrameSchedulerStats,
}

impl<C: FrameSchedulerClient> FrameScheduler<C> {
    pub fn new(client: C, config: FrameSchedulerConfig) -> Self {
        if config.max_pending_swaps == 0 {
            panic!("invalid frame scheduler config: max_pending_swaps must be at least 1");
        }
        Self {
            client,
            max_pending_swaps: config.max_pending_swaps,
            pending_swaps: 0,
            damage: SurfaceDamageState::default(),
            current_tick: None,
            deadline: None,
            inside_deadline_interval: false,
            drawing: false,
            needs_draw: false,
            draw_deferred_by_backpressure: false,
            output_surface_lost: false,
            root_surface_resources_locked: false,
            observing_clock: false,
            source_paused: false,
            frame_finished: false,
            stats: FrameSchedulerStats::default(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn state(&self) -> FrameSchedulerState {
        if self.drawing {
            FrameSchedulerState::Drawing
        } else if self.inside_deadline_interval {
            FrameSchedulerState::InsideDeadlineInterval
        } else if self.observing_clock {
            FrameSchedulerState::WaitingForTick
        } else {
            FrameSchedulerState::Idle
        }
    }

    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    pub fn pending_swaps(&self) -> u32 {
        self.pending_swaps
    }

    pub fn max_pending_swaps(&self) -> u32 {
        self.max_pending_swaps
    }

    pub fn needs_draw(&self) -> bool {
        self.needs_draw
    }

    pub fn wants_ticks(&self) -> bool {
        self.observing_clock
    }

    pub fn is_output_surface_lost(&self) -> bool {
        self.output_surface_lost
    }

    pub fn is_source_paused(&self) -> bool {
        self.source_paused
    }

    pub fn damage(&self) -> &SurfaceDamageState {
        &self.damage
    }

    pub fn stats(&self) -> FrameSchedulerStats {
        self.stats
    }

    /// Returns true once per finished tick; the owner tells its clock source.
    pub fn take_frame_finished(&mut self) -> bool {
        std::mem::take(&mut self.frame_finished)
    }

    pub fn on_tick(&mut self, tick: FrameTick) {
        self.stats.ticks += 1;
        // A tick arriving before the previous deadline fired runs that deadline first.
        if self.inside_deadline_interval {
            log::trace!("tick #{} preempts pending deadline", tick.sequence_number);
            self.on_deadline();
        }
        self.current_tick = Some(tick);
        self.inside_deadline_interval = true;
        self.schedule_deadline();
    }

    pub fn on_source_paused_changed(&mut self, paused: bool) {
        self.source_paused = paused;
        log::debug!("frame scheduler clock paused={paused}");
    }

    pub fn set_new_root_surface(&mut self, id: SurfaceId) {
        log::debug!("new root surface {id:?}");
        self.damage.set_root_surface(id);
        self.on_surface_damaged(id);
    }

    pub fn on_surface_damaged(&mut self, id: SurfaceId) {
        self.needs_draw = true;
        self.damage.mark_damaged(id);
        if !self.output_surface_lost {
            self.observing_clock = true;
        }
        self.schedule_deadline();
    }

    pub fn display_resized(&mut self) {
        self.damage.expect_resize_damage();
        self.schedule_deadline();
    }

    pub fn set_root_surface_resources_locked(&mut self, locked: bool) {
        self.root_surface_resources_locked = locked;
        self.schedule_deadline();
    }

    /// Draws right now if nothing blocks it. Returns whether a frame was swapped.
    pub fn force_immediate_swap_if_possible(&mut self) -> bool {
        let was_inside_interval = self.inside_deadline_interval;
        let drawn_before = self.stats.frames_drawn;
        self.attempt_draw_and_swap();
        if was_inside_interval {
            self.frame_finished = true;
        }
        self.stats.frames_drawn > drawn_before
    }

    pub fn did_swap_buffers_complete(&mut self) {
        if self.pending_swaps == 0 {
            panic!("swap completion reported with no pending swap");
        }
        self.pending_swaps -= 1;
        if std::mem::take(&mut self.draw_deferred_by_backpressure) {
            log::trace!("swap ack releases deferred draw");
            if self.inside_deadline_interval {
                self.on_deadline();
            } else {
                self.attempt_draw_and_swap();
            }
            return;
        }
        self.schedule_deadline();
    }

    pub fn output_surface_lost(&mut self) {
        log::warn!("output surface lost; draws suspended");
        self.output_surface_lost = true;
        self.observing_clock = false;
        self.schedule_deadline();
    }

    /// Swaps issued to the lost surface will never be acknowledged.
    pub fn output_surface_replaced(&mut self) {
        log::debug!("output surface replaced; dropping {} pending swaps", self.pending_swaps);
        self.output_surface_lost = false;
        self.pending_swaps = 0;
        self.draw_deferred_by_backpressure = false;
        if self.needs_draw {
            self.observing_clock = true;
        }
        self.schedule_deadline();
    }

    /// Fires the deadline if it is due. Returns whether it fired.
    pub fn poll_deadline(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline.is_due(now) => {
                self.on_deadline();
                true
            }
            _ => false,
        }
    }

    pub fn attempt_draw_and_swap(&mut self) {
        self.inside_deadline_interval = false;
        self.deadline = None;

        if self.needs_draw && !self.output_surface_lost {
            if self.pending_swaps >= self.max_pending_swaps {
                if !self.draw_deferred_by_backpressure {
                    self.stats.draws_deferred += 1;
                    log::debug!(
                        "draw deferred: {} of {} swaps pending",
                        self.pending_swaps,
                        self.max_pending_swaps
                    );
                }
                self.draw_deferred_by_backpressure = true;
            } else if !self.root_surface_resources_locked {
                self.draw_and_swap();
            }
            return;
        }

        self.damage.reset_expectations();
        if self.observing_clock {
            log::trace!("frame scheduler going idle");
            self.observing_clock = false;
        }
    }

    fn on_deadline(&mut self) {
        self.attempt_draw_and_swap();
        self.frame_finished = true;
    }

    fn draw_and_swap(&mut self) {
        debug_assert!(self.pending_swaps < self.max_pending_swaps);
        self.drawing = true;
        let swapped = self.client.draw_and_swap();
        self.drawing = false;
        if !swapped {
            log::trace!("draw produced no swap");
            return;
        }
        self.pending_swaps += 1;
        self.stats.frames_drawn += 1;
        self.needs_draw = false;
        self.damage.finish_frame();
    }

    fn schedule_deadline(&mut self) {
        if !self.inside_deadline_interval {
            self.deadline = None;
            return;
        }
        let desired = self.desired_deadline();
        if self.deadline != Some(desired) {
            log::trace!("deadline scheduled: {desired:?}");
            self.deadline = Some(desired);
        }
    }

    fn desired_deadline(&self) -> Deadline {
        let Some(tick) = self.current_tick else {
            return Deadline::Immediate;
        };
        let next_frame = Deadline::At(tick.next_frame_time());
        if self.output_surface_lost {
            return Deadline::Immediate;
        }
        if self.pending_swaps >= self.max_pending_swaps {
            return next_frame;
        }
        if !self.needs_draw {
            return next_frame;
        }
        if self.root_surface_resources_locked {
            return next_frame;
        }
        if self.damage.all_expected_children_damaged() && self.damage.root_ready_to_draw() {
            return Deadline::Immediate;
        }
        if self.damage.expecting_resize_damage() {
            return next_frame;
        }
        Deadline::At(tick.deadline)
    }
}

impl<C: FrameSchedulerClient> ClockObserver for FrameScheduler<C> {
    fn on_tick(&mut self, tick: FrameTick) {
        FrameScheduler::on_tick(self, tick);
    }

    fn on_source_paused_changed(&mut self, paused: bool) {
        FrameScheduler::on_source_paused_changed(self, paused);
    }
}
