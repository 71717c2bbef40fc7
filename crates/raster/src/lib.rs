//! Tile raster work: image decodes and raster tasks scheduled on a task graph
//! runner, with buffers handed out by a zero-copy or one-copy provider.

pub mod buffer;
pub mod decode;
pub mod format;
pub mod one_copy;
pub mod resource;
pub mod scheduler;
pub mod settings;
pub mod source;
pub mod tasks;
pub mod tile_task;
pub mod zero_copy;

pub use buffer::{RasterBuffer, RasterBufferError, RasterTaskClient};
pub use decode::{DecodeError, DecodedImage, DecodedImageCache, ImageId, decode_image};
pub use format::{ResourceFormat, resource_format_requires_swizzle};
pub use one_copy::OneCopyBufferProvider;
pub use resource::ResourceProvider;
pub use scheduler::TileTaskScheduler;
pub use settings::{BufferProviderKind, RasterSettings, create_raster_task_client};
pub use source::{PlacedImage, RasterSource, RecordedRasterSource};
pub use tasks::{ImageDecodeTask, RasterTask, RasterTaskParams};
pub use tile_task::{
    RasterOutcome, TileTask, TileTaskCompletion, TileTaskDependencies, TileTaskError,
    TileTaskKind, TileTaskLifecycle,
};
pub use zero_copy::ZeroCopyBufferProvider;
