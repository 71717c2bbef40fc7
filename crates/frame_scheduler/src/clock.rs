//! Clock sources that drive frame production.
//!
//! A source owns a list of observers and hands every one of them a
//! [`FrameTick`] per frame. Sources are single-threaded: they are polled by
//! whoever owns them (normally the display) and never block. A source with
//! no observers is paused and reports no wakeup.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rtrb::{Consumer, Producer, PushError, RingBuffer};

use crate::tick::{
    ClockSourceId, DEFAULT_INTERVAL, FrameTick, FrameTickKind, TickClock,
    aligned_tick_at_or_before,
};

pub trait ClockObserver {
    fn on_tick(&mut self, tick: FrameTick);
    fn on_source_paused_changed(&mut self, paused: bool);
}

pub type ClockObserverHandle = Rc<RefCell<dyn ClockObserver>>;

pub trait ClockSource {
    fn id(&self) -> ClockSourceId;

    fn add_observer(&mut self, observer: ClockObserverHandle);

    fn remove_observer(&mut self, observer: &ClockObserverHandle);

    fn last_tick(&self) -> Option<FrameTick>;

    /// Tells the source that `observer` is done with the current tick.
    fn did_finish_frame(&mut self, observer: &ClockObserverHandle) {
        let _ = observer;
    }

    /// Delivers every tick that is due at `now`.
    fn poll(&mut self, now: Instant);

    /// When the source next wants to be polled. `None` while paused.
    fn next_wakeup(&self) -> Option<Instant>;

    fn is_paused(&self) -> bool;

    fn observer_count(&self) -> usize;
}

#[derive(Default)]
struct ObserverList {
    observers: Vec<ClockObserverHandle>,
}

impl ObserverList {
    fn contains(&self, observer: &ClockObserverHandle) -> bool {
        self.observers
            .iter()
            .any(|existing| Rc::ptr_eq(existing, observer))
    }

    /// Returns true when the list went from empty to non-empty.
    fn add(&mut self, observer: ClockObserverHandle) -> bool {
        if self.contains(&observer) {
            panic!("clock observer registered twice");
        }
        let was_empty = self.observers.is_empty();
        self.observers.push(observer);
        was_empty
    }

    /// Returns true when the list became empty.
    fn remove(&mut self, observer: &ClockObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers
            .retain(|existing| !Rc::ptr_eq(existing, observer));
        if self.observers.len() == before {
            panic!("removing a clock observer that was never added");
        }
        self.observers.is_empty()
    }

    fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn len(&self) -> usize {
        self.observers.len()
    }

    // Observers may add or remove themselves in response, so iterate a snapshot.
    fn send_tick(&self, tick: FrameTick) {
        let snapshot = self.observers.clone();
        for observer in snapshot {
            observer.borrow_mut().on_tick(tick);
        }
    }

    fn send_paused_changed(&self, paused: bool) {
        let snapshot = self.observers.clone();
        for observer in snapshot {
            observer.borrow_mut().on_source_paused_changed(paused);
        }
    }
}

/// Ticks at `timebase + k * interval`, like a vsync timer.
pub struct SyntheticClockSource {
    id: ClockSourceId,
    tick_clock: Rc<dyn TickClock>,
    timebase: Instant,
    interval: Duration,
    observers: ObserverList,
    next_tick_time: Option<Instant>,
    last_tick: Option<FrameTick>,
    next_sequence_number: u64,
}

impl SyntheticClockSource {
    pub fn new(tick_clock: Rc<dyn TickClock>, interval: Duration) -> Self {
        let timebase = tick_clock.now();
        Self {
            id: ClockSourceId::next(),
            tick_clock,
            timebase,
            interval: sanitize_interval(interval),
            observers: ObserverList::default(),
            next_tick_time: None,
            last_tick: None,
            next_sequence_number: 1,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timebase(&self) -> Instant {
        self.timebase
    }

    /// Retunes the timer. A zero interval falls back to the default 60 Hz.
    pub fn on_update_vsync_parameters(&mut self, timebase: Instant, interval: Duration) {
        self.timebase = timebase;
        self.interval = sanitize_interval(interval);
        log::debug!(
            "synthetic clock {:?} retuned: interval {:?}",
            self.id,
            self.interval
        );
        if self.next_tick_time.is_some() {
            self.next_tick_time = Some(self.next_tick_after(self.tick_clock.now()));
        }
    }

    fn next_tick_after(&self, now: Instant) -> Instant {
        aligned_tick_at_or_before(now, self.timebase, self.interval) + self.interval
    }

    fn make_tick(&mut self, frame_time: Instant, kind: FrameTickKind) -> FrameTick {
        let tick = FrameTick {
            source_id: self.id,
            sequence_number: self.next_sequence_number,
            frame_time,
            deadline: frame_time + self.interval,
            interval: self.interval,
            kind,
        };
        self.next_sequence_number += 1;
        tick
    }
}

impl ClockSource for SyntheticClockSource {
    fn id(&self) -> ClockSourceId {
        self.id
    }

    fn add_observer(&mut self, observer: ClockObserverHandle) {
        let became_active = self.observers.add(observer.clone());
        let now = self.tick_clock.now();
        if became_active {
            self.next_tick_time = Some(self.next_tick_after(now));
            log::debug!("synthetic clock {:?} resumed", self.id);
        }

        // A late observer still gets the current interval if its deadline is ahead.
        let current_frame_time = aligned_tick_at_or_before(now, self.timebase, self.interval);
        if current_frame_time + self.interval > now {
            let missed = self.make_tick(current_frame_time, FrameTickKind::Missed);
            self.last_tick = Some(missed);
            observer.borrow_mut().on_tick(missed);
        }
    }

    fn remove_observer(&mut self, observer: &ClockObserverHandle) {
        if self.observers.remove(observer) {
            self.next_tick_time = None;
            log::debug!("synthetic clock {:?} paused: no observers", self.id);
        }
    }

    fn last_tick(&self) -> Option<FrameTick> {
        self.last_tick
    }

    fn poll(&mut self, now: Instant) {
        let Some(next_tick_time) = self.next_tick_time else {
            return;
        };
        if next_tick_time > now {
            return;
        }
        // Skipped intervals are not replayed; only the most recent boundary fires.
        let frame_time = aligned_tick_at_or_before(now, self.timebase, self.interval);
        let tick = self.make_tick(frame_time, FrameTickKind::Normal);
        self.next_tick_time = Some(frame_time + self.interval);
        self.last_tick = Some(tick);
        log::trace!(
            "synthetic clock {:?} tick #{}",
            self.id,
            tick.sequence_number
        );
        self.observers.send_tick(tick);
    }

    fn next_wakeup(&self) -> Option<Instant> {
        self.next_tick_time
    }

    fn is_paused(&self) -> bool {
        self.observers.is_empty()
    }

    fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

/// Unthrottled source: the next tick goes out as soon as every observer
/// finished the previous one.
pub struct BackToBackClockSource {
    id: ClockSourceId,
    tick_clock: Rc<dyn TickClock>,
    observers: ObserverList,
    pending_finish: Vec<ClockObserverHandle>,
    needs_tick: bool,
    last_tick: Option<FrameTick>,
    next_sequence_number: u64,
}

impl BackToBackClockSource {
    pub fn new(tick_clock: Rc<dyn TickClock>) -> Self {
        Self {
            id: ClockSourceId::next(),
            tick_clock,
            observers: ObserverList::default(),
            pending_finish: Vec::new(),
            needs_tick: false,
            last_tick: None,
            next_sequence_number: 1,
        }
    }

    fn refresh_needs_tick(&mut self) {
        if self.pending_finish.is_empty() && !self.observers.is_empty() {
            self.needs_tick = true;
        }
    }
}

impl ClockSource for BackToBackClockSource {
    fn id(&self) -> ClockSourceId {
        self.id
    }

    fn add_observer(&mut self, observer: ClockObserverHandle) {
        if self.observers.add(observer) {
            log::debug!("back-to-back clock {:?} resumed", self.id);
        }
        self.refresh_needs_tick();
    }

    fn remove_observer(&mut self, observer: &ClockObserverHandle) {
        let became_empty = self.observers.remove(observer);
        self.pending_finish
            .retain(|pending| !Rc::ptr_eq(pending, observer));
        if became_empty {
            self.needs_tick = false;
            log::debug!("back-to-back clock {:?} paused: no observers", self.id);
        } else {
            self.refresh_needs_tick();
        }
    }

    fn last_tick(&self) -> Option<FrameTick> {
        self.last_tick
    }

    fn did_finish_frame(&mut self, observer: &ClockObserverHandle) {
        self.pending_finish
            .retain(|pending| !Rc::ptr_eq(pending, observer));
        self.refresh_needs_tick();
    }

    fn poll(&mut self, now: Instant) {
        if !self.needs_tick || self.observers.is_empty() {
            return;
        }
        self.needs_tick = false;
        let tick = FrameTick {
            source_id: self.id,
            sequence_number: self.next_sequence_number,
            frame_time: now,
            deadline: now + DEFAULT_INTERVAL,
            interval: DEFAULT_INTERVAL,
            kind: FrameTickKind::Normal,
        };
        self.next_sequence_number += 1;
        self.last_tick = Some(tick);
        self.pending_finish = self.observers.observers.clone();
        self.observers.send_tick(tick);
    }

    fn next_wakeup(&self) -> Option<Instant> {
        if self.needs_tick && !self.observers.is_empty() {
            Some(self.tick_clock.now())
        } else {
            None
        }
    }

    fn is_paused(&self) -> bool {
        self.observers.is_empty()
    }

    fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VSyncSignal {
    VSync { timestamp: Instant, interval: Duration },
    Paused(bool),
}

/// Producer half of an [`ExternalClockSource`]. May live on a vsync thread.
pub struct VSyncSender {
    producer: Producer<VSyncSignal>,
    needs_vsync: Arc<AtomicBool>,
}

impl VSyncSender {
    pub fn send(&mut self, signal: VSyncSignal) -> Result<(), PushError<VSyncSignal>> {
        self.producer.push(signal)
    }

    /// Whether anyone is observing the source. Hardware may stop signalling otherwise.
    pub fn needs_vsync(&self) -> bool {
        self.needs_vsync.load(Ordering::Acquire)
    }

    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Source driven by an outside hardware signal.
pub struct ExternalClockSource {
    id: ClockSourceId,
    consumer: Consumer<VSyncSignal>,
    needs_vsync: Arc<AtomicBool>,
    observers: ObserverList,
    hardware_paused: bool,
    last_tick: Option<FrameTick>,
    next_sequence_number: u64,
}

impl ExternalClockSource {
    pub fn new(signal_capacity: usize) -> (Self, VSyncSender) {
        assert!(
            signal_capacity > 0,
            "vsync signal capacity must be greater than zero"
        );
        let (producer, consumer) = RingBuffer::new(signal_capacity);
        let needs_vsync = Arc::new(AtomicBool::new(false));
        let source = Self {
            id: ClockSourceId::next(),
            consumer,
            needs_vsync: needs_vsync.clone(),
            observers: ObserverList::default(),
            hardware_paused: false,
            last_tick: None,
            next_sequence_number: 1,
        };
        (
            source,
            VSyncSender {
                producer,
                needs_vsync,
            },
        )
    }

    fn handle_signal(&mut self, signal: VSyncSignal) {
        match signal {
            VSyncSignal::VSync {
                timestamp,
                interval,
            } => {
                if self.observers.is_empty() || self.hardware_paused {
                    return;
                }
                let interval = sanitize_interval(interval);
                let tick = FrameTick {
                    source_id: self.id,
                    sequence_number: self.next_sequence_number,
                    frame_time: timestamp,
                    deadline: timestamp + interval,
                    interval,
                    kind: FrameTickKind::Normal,
                };
                self.next_sequence_number += 1;
                self.last_tick = Some(tick);
                self.observers.send_tick(tick);
            }
            VSyncSignal::Paused(paused) => {
                if paused == self.hardware_paused {
                    return;
                }
                self.hardware_paused = paused;
                log::debug!("external clock {:?} paused={paused}", self.id);
                self.observers.send_paused_changed(paused);
            }
        }
    }
}

impl ClockSource for ExternalClockSource {
    fn id(&self) -> ClockSourceId {
        self.id
    }

    fn add_observer(&mut self, observer: ClockObserverHandle) {
        if self.observers.add(observer.clone()) {
            self.needs_vsync.store(true, Ordering::Release);
        }
        if self.hardware_paused {
            observer.borrow_mut().on_source_paused_changed(true);
        }
    }

    fn remove_observer(&mut self, observer: &ClockObserverHandle) {
        if self.observers.remove(observer) {
            self.needs_vsync.store(false, Ordering::Release);
        }
    }

    fn last_tick(&self) -> Option<FrameTick> {
        self.last_tick
    }

    fn poll(&mut self, _now: Instant) {
        while let Ok(signal) = self.consumer.pop() {
            self.handle_signal(signal);
        }
    }

    fn next_wakeup(&self) -> Option<Instant> {
        None
    }

    fn is_paused(&self) -> bool {
        self.observers.is_empty() || self.hardware_paused
    }

    fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

fn sanitize_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        DEFAULT_INTERVAL
    } else {
        interval
    }
}
