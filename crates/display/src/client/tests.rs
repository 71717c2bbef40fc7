use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use frame_protocol::{PixelSize, SurfaceId};
use frame_scheduler::{ClockSource, DEFAULT_INTERVAL, ManualTickClock, TickClock, VSyncSignal};

use super::*;
use crate::output::MemoryCutoff;

const ROOT: SurfaceId = SurfaceId(1);
const SIZE: PixelSize = PixelSize {
    width: 64,
    height: 48,
};

#[derive(Default)]
struct SurfaceLog {
    frames: Vec<PresentedFrame>,
    policies: Vec<MemoryPolicy>,
}

struct RecordingSurface {
    log: Rc<RefCell<SurfaceLog>>,
}

impl RecordingSurface {
    fn new() -> (Self, Rc<RefCell<SurfaceLog>>) {
        let log = Rc::new(RefCell::new(SurfaceLog::default()));
        (Self { log: log.clone() }, log)
    }
}

impl OutputSurface for RecordingSurface {
    fn swap_buffers(&mut self, frame: PresentedFrame) {
        self.log.borrow_mut().frames.push(frame);
    }

    fn set_memory_policy(&mut self, policy: MemoryPolicy) {
        self.log.borrow_mut().policies.push(policy);
    }
}

fn new_display(
    settings: DisplaySettings,
) -> (
    DisplayClient<RecordingSurface>,
    ManualTickClock,
    Rc<RefCell<SurfaceLog>>,
) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = ManualTickClock::default();
    let tick_clock: Rc<dyn TickClock> = Rc::new(clock.clone());
    let (surface, log) = RecordingSurface::new();
    let display = DisplayClient::new(settings, surface, tick_clock).expect("valid settings");
    (display, clock, log)
}

fn ready_display(
    settings: DisplaySettings,
) -> (
    DisplayClient<RecordingSurface>,
    ManualTickClock,
    Rc<RefCell<SurfaceLog>>,
) {
    let (mut display, clock, log) = new_display(settings);
    display.resize(SIZE);
    display.set_new_root_surface(ROOT);
    (display, clock, log)
}

#[test]
fn throttled_display_draws_root_damage_right_away() {
    let (mut display, clock, log) = ready_display(DisplaySettings::default());
    assert_eq!(display.clock_mode(), ClockMode::Throttled);
    assert!(display.is_observing_clock());
    assert_eq!(display.next_wakeup(), Some(clock.now()));

    assert!(display.run_until(clock.now()));
    assert_eq!(
        log.borrow().frames,
        vec![PresentedFrame {
            sequence_number: 1,
            root_surface: ROOT,
            size: SIZE,
        }]
    );
    assert_eq!(display.stats().pending_swaps, 1);
    assert_eq!(display.next_wakeup(), Some(clock.now() + DEFAULT_INTERVAL));
}

#[test]
fn display_without_damage_stops_observing_the_clock() {
    let (mut display, clock, _log) = ready_display(DisplaySettings::default());
    display.run_until(clock.now());
    display.did_swap_buffers_complete();

    for _ in 0..4 {
        clock.advance(DEFAULT_INTERVAL);
        assert!(!display.run_until(clock.now()));
    }

    assert!(!display.is_observing_clock());
    assert_eq!(display.clock().observer_count(), 0);
    assert!(display.clock().is_paused());
    assert!(display.stats().ticks >= 2);
}

#[test]
fn nothing_is_swapped_without_a_root_surface_or_a_size() {
    let (mut display, clock, log) = new_display(DisplaySettings::default());
    display.resize(SIZE);
    display.surface_damaged(SurfaceId(9));
    assert!(!display.run_until(clock.now()));

    let (mut unsized_display, unsized_clock, unsized_log) = new_display(DisplaySettings::default());
    unsized_display.set_new_root_surface(ROOT);
    assert!(!unsized_display.run_until(unsized_clock.now()));

    assert!(log.borrow().frames.is_empty());
    assert!(unsized_log.borrow().frames.is_empty());
    assert!(unsized_display.needs_draw());
}

#[test]
fn swap_backpressure_defers_until_the_ack() {
    let settings = DisplaySettings {
        max_pending_swaps: 1,
        ..DisplaySettings::default()
    };
    let (mut display, clock, log) = ready_display(settings);
    assert!(display.run_until(clock.now()));

    display.surface_damaged(ROOT);
    for _ in 0..2 {
        clock.advance(DEFAULT_INTERVAL);
        assert!(!display.run_until(clock.now()));
    }
    assert_eq!(display.stats().draws_deferred, 1);
    assert_eq!(log.borrow().frames.len(), 1);

    display.did_swap_buffers_complete();
    assert_eq!(log.borrow().frames.len(), 2);
    assert_eq!(display.stats().pending_swaps, 1);
}

#[test]
fn unthrottled_display_ticks_when_the_last_frame_finished() {
    let settings = DisplaySettings {
        clock_mode: ClockMode::Unthrottled,
        ..DisplaySettings::default()
    };
    let (mut display, clock, log) = ready_display(settings);
    assert_eq!(display.next_wakeup(), Some(clock.now()));
    assert!(display.run_until(clock.now()));

    display.did_swap_buffers_complete();
    display.surface_damaged(ROOT);
    assert!(display.run_until(clock.now()));
    assert_eq!(log.borrow().frames.len(), 2);
    assert_eq!(display.clock().interval(), None);
}

#[test]
fn external_display_draws_on_forwarded_vsync() {
    let settings = DisplaySettings {
        clock_mode: ClockMode::External,
        ..DisplaySettings::default()
    };
    let (mut display, clock, log) = ready_display(settings);
    let mut sender = display.take_vsync_sender().expect("external clock sender");
    assert!(display.take_vsync_sender().is_none());
    assert!(sender.needs_vsync());

    assert!(!display.run_until(clock.now()));
    assert_eq!(display.next_wakeup(), None);

    sender
        .send(VSyncSignal::VSync {
            timestamp: clock.now(),
            interval: Duration::from_millis(8),
        })
        .expect("signal slot available");
    assert!(display.run_until(clock.now()));
    assert_eq!(log.borrow().frames.len(), 1);
}

#[test]
fn vsync_parameters_retune_only_the_synthetic_clock() {
    let (mut throttled, clock, _log) = new_display(DisplaySettings::default());
    throttled.on_update_vsync_parameters(clock.now(), Duration::from_millis(8));
    assert_eq!(throttled.clock().interval(), Some(Duration::from_millis(8)));

    let (mut unthrottled, clock, _log) = new_display(DisplaySettings {
        clock_mode: ClockMode::Unthrottled,
        ..DisplaySettings::default()
    });
    unthrottled.on_update_vsync_parameters(clock.now(), Duration::from_millis(8));
    assert_eq!(unthrottled.clock().interval(), None);
}

#[test]
fn lost_surface_pauses_draws_until_replaced() {
    let (mut display, clock, old_log) = ready_display(DisplaySettings::default());
    let policy = MemoryPolicy {
        bytes_limit_when_visible: 1024,
        priority_cutoff_when_visible: MemoryCutoff::AllowRequiredOnly,
        num_resources_limit: 4,
    };
    display.set_memory_policy(policy);
    assert!(display.run_until(clock.now()));

    display.did_lose_output_surface();
    assert!(!display.is_observing_clock());
    display.surface_damaged(ROOT);
    clock.advance(DEFAULT_INTERVAL);
    assert!(!display.run_until(clock.now()));

    let (replacement, new_log) = RecordingSurface::new();
    display.set_output_surface(replacement);
    assert_eq!(new_log.borrow().policies, vec![policy]);
    assert_eq!(display.stats().pending_swaps, 0);
    assert!(display.run_until(clock.now()));

    assert_eq!(old_log.borrow().frames.len(), 1);
    assert_eq!(old_log.borrow().policies, vec![policy]);
    assert_eq!(new_log.borrow().frames.len(), 1);
    assert_eq!(new_log.borrow().frames[0].sequence_number, 2);
}

#[test]
fn forced_swap_skips_the_deadline() {
    let (mut display, _clock, log) = ready_display(DisplaySettings::default());
    assert!(display.force_immediate_swap());
    assert_eq!(log.borrow().frames.len(), 1);
    assert!(!display.force_immediate_swap());
}

#[test]
fn resizing_to_the_same_size_is_ignored() {
    let (mut display, clock, _log) = ready_display(DisplaySettings::default());
    display.run_until(clock.now());
    display.resize(SIZE);
    assert!(!display.needs_draw());
    assert_eq!(display.with_draw_client(|client| client.size()), SIZE);
    assert_eq!(display.with_draw_client(|client| client.root_surface()), Some(ROOT));
}

#[test]
fn invalid_settings_are_rejected() {
    let (surface, _log) = RecordingSurface::new();
    let tick_clock: Rc<dyn TickClock> = Rc::new(ManualTickClock::default());
    let settings = DisplaySettings {
        max_pending_swaps: 0,
        ..DisplaySettings::default()
    };
    assert!(matches!(
        DisplayClient::new(settings, surface, tick_clock),
        Err(SettingsError::InvalidValue {
            field: "max_pending_swaps",
            ..
        })
    ));
}

#[test]
fn dropping_an_observing_display_is_clean() {
    let (display, _clock, _log) = ready_display(DisplaySettings::default());
    assert!(display.is_observing_clock());
    drop(display);
}
