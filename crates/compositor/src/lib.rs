//! Drives one frame at a time: tile completions in, surface damage out, and
//! the display decides when to draw.

pub mod frame_loop;

pub use frame_loop::{FrameLoop, FrameResult, FrameStats, RasterWork, TileDrainStats};
