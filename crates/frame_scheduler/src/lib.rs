//! Frame timing: clock sources and the deadline-driven frame scheduler.

pub mod clock;
pub mod damage;
pub mod scheduler;
pub mod tick;

pub use clock::{
    BackToBackClockSource, ClockObserver, ClockObserverHandle, ClockSource, ExternalClockSource,
    SyntheticClockSource, VSyncSender, VSyncSignal,
};
pub use damage::{ChildDamage, SurfaceDamageState};
pub use scheduler::{
    Deadline, FrameScheduler, FrameSchedulerClient, FrameSchedulerState, FrameSchedulerStats,
};
pub use tick::{
    ClockSourceId, DEFAULT_INTERVAL, FrameTick, FrameTickKind, ManualTickClock, SystemTickClock,
    TickClock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSchedulerConfig {
    /// Swaps that may be in flight before further draws are deferred.
    pub max_pending_swaps: u32,
}

impl Default for FrameSchedulerConfig {
    fn default() -> Self {
        Self {
            max_pending_swaps: 2,
        }
    }
}
