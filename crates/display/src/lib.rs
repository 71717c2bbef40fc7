//! The display end of the frame pipeline: a clock, a frame scheduler and an
//! output surface, configured from [`DisplaySettings`].

pub mod client;
pub mod clock;
pub mod output;
pub mod settings;

pub use client::{DisplayClient, DisplayDrawClient, DisplayStats};
pub use clock::DisplayClock;
pub use output::{MemoryCutoff, MemoryPolicy, OutputSurface, PresentedFrame};
pub use settings::{ClockMode, DisplaySettings, SettingsError};
