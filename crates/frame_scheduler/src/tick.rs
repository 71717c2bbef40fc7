use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Refresh interval used when a source has nothing better (60 Hz).
pub const DEFAULT_INTERVAL: Duration = Duration::from_nanos(16_666_667);

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockSourceId(u64);

impl ClockSourceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTickKind {
    Normal,
    /// Replayed to an observer that joined after the interval started.
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    pub source_id: ClockSourceId,
    pub sequence_number: u64,
    pub frame_time: Instant,
    pub deadline: Instant,
    pub interval: Duration,
    pub kind: FrameTickKind,
}

impl FrameTick {
    /// Frame time of the tick that is expected to follow this one.
    pub fn next_frame_time(&self) -> Instant {
        self.frame_time + self.interval
    }
}

pub trait TickClock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTickClock;

impl TickClock for SystemTickClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualTickClock {
    now: Rc<Cell<Instant>>,
}

impl ManualTickClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, delta: Duration) -> Instant {
        let next = self.now.get() + delta;
        self.now.set(next);
        next
    }

    pub fn set(&self, now: Instant) {
        assert!(now >= self.now.get(), "manual tick clock must not go backwards");
        self.now.set(now);
    }
}

impl Default for ManualTickClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl TickClock for ManualTickClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Latest `timebase + k * interval` that is not after `now`.
pub(crate) fn aligned_tick_at_or_before(now: Instant, timebase: Instant, interval: Duration) -> Instant {
    assert!(!interval.is_zero(), "tick interval must be non-zero");
    let interval_nanos = interval.as_nanos();
    if now >= timebase {
        let elapsed = (now - timebase).as_nanos();
        let steps = elapsed / interval_nanos;
        timebase + nanos_to_duration(steps * interval_nanos)
    } else {
        let ahead = (timebase - now).as_nanos();
        let steps = ahead.div_ceil(interval_nanos);
        timebase
            .checked_sub(nanos_to_duration(steps * interval_nanos))
            .unwrap_or(now)
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    let nanos = u64::try_from(nanos).expect("tick offset does not fit in u64 nanoseconds");
    Duration::from_nanos(nanos)
}
