use std::rc::Rc;
use std::time::{Duration, Instant};

use frame_scheduler::{
    BackToBackClockSource, ClockObserverHandle, ClockSource, ClockSourceId, ExternalClockSource,
    FrameTick, SyntheticClockSource, TickClock, VSyncSender,
};

use crate::settings::{ClockMode, DisplaySettings};

/// The clock flavor a display runs on.
pub enum DisplayClock {
    Synthetic(SyntheticClockSource),
    BackToBack(BackToBackClockSource),
    External(ExternalClockSource),
}

impl DisplayClock {
    /// Builds the clock for `settings.clock_mode`. External clocks also hand
    /// back the sender the embedder feeds vsync into.
    pub fn from_settings(
        settings: &DisplaySettings,
        tick_clock: Rc<dyn TickClock>,
    ) -> (Self, Option<VSyncSender>) {
        match settings.clock_mode {
            ClockMode::Throttled => (
                DisplayClock::Synthetic(SyntheticClockSource::new(
                    tick_clock,
                    settings.refresh_interval,
                )),
                None,
            ),
            ClockMode::Unthrottled => (
                DisplayClock::BackToBack(BackToBackClockSource::new(tick_clock)),
                None,
            ),
            ClockMode::External => {
                let (source, sender) =
                    ExternalClockSource::new(settings.external_signal_capacity);
                (DisplayClock::External(source), Some(sender))
            }
        }
    }

    pub fn mode(&self) -> ClockMode {
        match self {
            DisplayClock::Synthetic(_) => ClockMode::Throttled,
            DisplayClock::BackToBack(_) => ClockMode::Unthrottled,
            DisplayClock::External(_) => ClockMode::External,
        }
    }

    /// Refresh interval of a synthetic clock.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            DisplayClock::Synthetic(source) => Some(source.interval()),
            _ => None,
        }
    }

    fn source(&self) -> &dyn ClockSource {
        match self {
            DisplayClock::Synthetic(source) => source,
            DisplayClock::BackToBack(source) => source,
            DisplayClock::External(source) => source,
        }
    }

    fn source_mut(&mut self) -> &mut dyn ClockSource {
        match self {
            DisplayClock::Synthetic(source) => source,
            DisplayClock::BackToBack(source) => source,
            DisplayClock::External(source) => source,
        }
    }
}

impl ClockSource for DisplayClock {
    fn id(&self) -> ClockSourceId {
        self.source().id()
    }

    fn add_observer(&mut self, observer: ClockObserverHandle) {
        self.source_mut().add_observer(observer);
    }

    fn remove_observer(&mut self, observer: &ClockObserverHandle) {
        self.source_mut().remove_observer(observer);
    }

    fn last_tick(&self) -> Option<FrameTick> {
        self.source().last_tick()
    }

    fn did_finish_frame(&mut self, observer: &ClockObserverHandle) {
        self.source_mut().did_finish_frame(observer);
    }

    fn poll(&mut self, now: Instant) {
        self.source_mut().poll(now);
    }

    fn next_wakeup(&self) -> Option<Instant> {
        self.source().next_wakeup()
    }

    fn is_paused(&self) -> bool {
        self.source().is_paused()
    }

    fn observer_count(&self) -> usize {
        self.source().observer_count()
    }
}
