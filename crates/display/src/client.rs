use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use frame_protocol::{PixelSize, SurfaceId};
use frame_scheduler::{
    ClockObserverHandle, ClockSource, FrameScheduler, FrameSchedulerClient, TickClock,
    VSyncSender,
};

use crate::clock::DisplayClock;
use crate::output::{MemoryPolicy, OutputSurface, PresentedFrame};
use crate::settings::{ClockMode, DisplaySettings, SettingsError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayStats {
    pub ticks: u64,
    pub frames_drawn: u64,
    pub draws_deferred: u64,
    pub pending_swaps: u32,
}

/// The scheduler's draw callback: presents the root surface when there is one to present.
pub struct DisplayDrawClient<S> {
    surface: S,
    root_surface: Option<SurfaceId>,
    size: PixelSize,
    memory_policy: Option<MemoryPolicy>,
    next_sequence_number: u64,
}

impl<S: OutputSurface> DisplayDrawClient<S> {
    fn new(surface: S) -> Self {
        Self {
            surface,
            root_surface: None,
            size: PixelSize::new(0, 0),
            memory_policy: None,
            next_sequence_number: 1,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn root_surface(&self) -> Option<SurfaceId> {
        self.root_surface
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }
}

impl<S: OutputSurface> FrameSchedulerClient for DisplayDrawClient<S> {
    fn draw_and_swap(&mut self) -> bool {
        let Some(root_surface) = self.root_surface else {
            log::trace!("draw skipped: no root surface");
            return false;
        };
        if self.size.is_empty() {
            log::trace!("draw skipped: display has no size");
            return false;
        }
        let frame = PresentedFrame {
            sequence_number: self.next_sequence_number,
            root_surface,
            size: self.size,
        };
        self.next_sequence_number += 1;
        self.surface.swap_buffers(frame);
        true
    }
}

type DisplayScheduler<S> = FrameScheduler<DisplayDrawClient<S>>;

/// Ties a clock source, a frame scheduler and an output surface together.
///
/// Single-threaded: the embedder calls [`DisplayClient::run_until`] whenever
/// [`DisplayClient::next_wakeup`] comes due, and reports swap completion and
/// surface loss as they happen.
pub struct DisplayClient<S: OutputSurface + 'static> {
    // Declared before `clock` so the scheduler goes first.
    scheduler: Rc<RefCell<DisplayScheduler<S>>>,
    observer: ClockObserverHandle,
    clock: DisplayClock,
    tick_clock: Rc<dyn TickClock>,
    vsync_sender: Option<VSyncSender>,
    observing_clock: bool,
    settings: DisplaySettings,
}

impl<S: OutputSurface + 'static> DisplayClient<S> {
    pub fn new(
        settings: DisplaySettings,
        surface: S,
        tick_clock: Rc<dyn TickClock>,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        let (clock, vsync_sender) = DisplayClock::from_settings(&settings, tick_clock.clone());
        let scheduler = Rc::new(RefCell::new(FrameScheduler::new(
            DisplayDrawClient::new(surface),
            settings.scheduler_config(),
        )));
        let observer: ClockObserverHandle = scheduler.clone();
        log::debug!("display created with {:?} clock", settings.clock_mode);
        Ok(Self {
            scheduler,
            observer,
            clock,
            tick_clock,
            vsync_sender,
            observing_clock: false,
            settings,
        })
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    pub fn clock(&self) -> &DisplayClock {
        &self.clock
    }

    pub fn clock_mode(&self) -> ClockMode {
        self.clock.mode()
    }

    /// Hands out the vsync producer of an external clock, once.
    pub fn take_vsync_sender(&mut self) -> Option<VSyncSender> {
        self.vsync_sender.take()
    }

    /// Reads the draw client, including the output surface it owns.
    pub fn with_draw_client<R>(&self, read: impl FnOnce(&DisplayDrawClient<S>) -> R) -> R {
        read(self.scheduler.borrow().client())
    }

    pub fn stats(&self) -> DisplayStats {
        let scheduler = self.scheduler.borrow();
        let stats = scheduler.stats();
        DisplayStats {
            ticks: stats.ticks,
            frames_drawn: stats.frames_drawn,
            draws_deferred: stats.draws_deferred,
            pending_swaps: scheduler.pending_swaps(),
        }
    }

    pub fn needs_draw(&self) -> bool {
        self.scheduler.borrow().needs_draw()
    }

    pub fn is_observing_clock(&self) -> bool {
        self.observing_clock
    }

    /// Polls the clock, fires a due deadline and settles clock observation.
    /// Returns whether a frame was swapped.
    pub fn run_until(&mut self, now: Instant) -> bool {
        let drawn_before = self.scheduler.borrow().stats().frames_drawn;
        self.sync_clock_observation();
        self.clock.poll(now);
        self.scheduler.borrow_mut().poll_deadline(now);
        self.settle();
        self.scheduler.borrow().stats().frames_drawn > drawn_before
    }

    /// Earliest of the clock's next tick and the scheduler's deadline.
    pub fn next_wakeup(&self) -> Option<Instant> {
        let now = self.tick_clock.now();
        let deadline = self
            .scheduler
            .borrow()
            .deadline()
            .map(|deadline| deadline.instant(now));
        match (self.clock.next_wakeup(), deadline) {
            (Some(tick), Some(deadline)) => Some(tick.min(deadline)),
            (tick, deadline) => tick.or(deadline),
        }
    }

    pub fn on_update_vsync_parameters(&mut self, timebase: Instant, interval: Duration) {
        match &mut self.clock {
            DisplayClock::Synthetic(source) => {
                source.on_update_vsync_parameters(timebase, interval);
            }
            other => {
                log::debug!("vsync parameters ignored by {:?} clock", other.mode());
            }
        }
    }

    pub fn set_new_root_surface(&mut self, id: SurfaceId) {
        {
            let mut scheduler = self.scheduler.borrow_mut();
            scheduler.client_mut().root_surface = Some(id);
            scheduler.set_new_root_surface(id);
        }
        self.sync_clock_observation();
    }

    pub fn surface_damaged(&mut self, id: SurfaceId) {
        self.scheduler.borrow_mut().on_surface_damaged(id);
        self.sync_clock_observation();
    }

    pub fn resize(&mut self, size: PixelSize) {
        {
            let mut scheduler = self.scheduler.borrow_mut();
            if scheduler.client().size == size {
                return;
            }
            log::debug!("display resized to {}x{}", size.width, size.height);
            scheduler.client_mut().size = size;
            scheduler.display_resized();
        }
        self.sync_clock_observation();
    }

    pub fn set_root_surface_resources_locked(&mut self, locked: bool) {
        self.scheduler
            .borrow_mut()
            .set_root_surface_resources_locked(locked);
    }

    /// Draws now if backpressure and surface state allow it.
    pub fn force_immediate_swap(&mut self) -> bool {
        let swapped = self
            .scheduler
            .borrow_mut()
            .force_immediate_swap_if_possible();
        self.settle();
        swapped
    }

    pub fn did_swap_buffers_complete(&mut self) {
        self.scheduler.borrow_mut().did_swap_buffers_complete();
        self.settle();
    }

    pub fn did_lose_output_surface(&mut self) {
        self.scheduler.borrow_mut().output_surface_lost();
        self.sync_clock_observation();
    }

    /// Installs a replacement surface. The current memory policy carries over.
    pub fn set_output_surface(&mut self, surface: S) {
        {
            let mut scheduler = self.scheduler.borrow_mut();
            let client = scheduler.client_mut();
            client.surface = surface;
            if let Some(policy) = client.memory_policy {
                client.surface.set_memory_policy(policy);
            }
            scheduler.output_surface_replaced();
        }
        self.sync_clock_observation();
    }

    pub fn set_memory_policy(&mut self, policy: MemoryPolicy) {
        let mut scheduler = self.scheduler.borrow_mut();
        let client = scheduler.client_mut();
        client.memory_policy = Some(policy);
        client.surface.set_memory_policy(policy);
    }

    fn settle(&mut self) {
        let finished = self.scheduler.borrow_mut().take_frame_finished();
        if finished && self.observing_clock {
            self.clock.did_finish_frame(&self.observer);
        }
        self.sync_clock_observation();
    }

    // Sources may tick a new observer synchronously, so the scheduler must not be borrowed here.
    fn sync_clock_observation(&mut self) {
        let wants_ticks = self.scheduler.borrow().wants_ticks();
        if wants_ticks == self.observing_clock {
            return;
        }
        self.observing_clock = wants_ticks;
        if wants_ticks {
            self.clock.add_observer(self.observer.clone());
        } else {
            self.clock.remove_observer(&self.observer);
        }
    }
}

impl<S: OutputSurface + 'static> Drop for DisplayClient<S> {
    fn drop(&mut self) {
        if self.observing_clock {
            self.clock.remove_observer(&self.observer);
            self.observing_clock = false;
        }
    }
}

#[cfg(test)]
mod tests;
