use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use frame_protocol::{ContentId, PixelRect, ResourceId};
use smallvec::smallvec;
use task_graph::{TaskCategory, TaskId, TaskOutcome};

use crate::buffer::{RasterBuffer, RasterBufferError, RasterTaskClient};
use crate::decode::{DecodeError, DecodedImageCache, ImageId, decode_image};
use crate::source::RasterSource;
use crate::tile_task::{
    RasterOutcome, TileTask, TileTaskDependencies, TileTaskError, TileTaskKind, TileTaskLifecycle,
};

static NEXT_TILE_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_tile_task_id() -> TaskId {
    TaskId(NEXT_TILE_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

fn settle_outcome(outcome: TaskOutcome, failure: Option<TileTaskError>) -> RasterOutcome {
    match (outcome, failure) {
        (_, Some(error)) => RasterOutcome::Failed(error),
        (TaskOutcome::Finished, None) => RasterOutcome::Completed,
        (TaskOutcome::Cancelled, None) => RasterOutcome::Cancelled,
        (TaskOutcome::Failed, None) => RasterOutcome::Failed(TileTaskError::Panicked),
    }
}

/// Decodes one encoded image into the shared cache.
pub struct ImageDecodeTask {
    id: TaskId,
    image: ImageId,
    encoded: Arc<[u8]>,
    cache: Arc<DecodedImageCache>,
    dependency: Option<Arc<ImageDecodeTask>>,
    supports_concurrent_execution: bool,
    lifecycle: TileTaskLifecycle,
    error: Mutex<Option<DecodeError>>,
}

impl ImageDecodeTask {
    pub fn new(image: ImageId, encoded: impl Into<Arc<[u8]>>, cache: Arc<DecodedImageCache>) -> Self {
        Self {
            id: next_tile_task_id(),
            image,
            encoded: encoded.into(),
            cache,
            dependency: None,
            supports_concurrent_execution: true,
            lifecycle: TileTaskLifecycle::default(),
            error: Mutex::new(None),
        }
    }

    /// Decoding starts only after `dependency` finished.
    pub fn with_dependency(mut self, dependency: Arc<ImageDecodeTask>) -> Self {
        self.dependency = Some(dependency);
        self
    }

    /// Decoders that are not thread-safe run as non-concurrent foreground work.
    pub fn non_concurrent(mut self) -> Self {
        self.supports_concurrent_execution = false;
        self
    }

    pub fn image(&self) -> ImageId {
        self.image
    }

    pub fn dependency(&self) -> Option<&Arc<ImageDecodeTask>> {
        self.dependency.as_ref()
    }

    pub fn supports_concurrent_execution(&self) -> bool {
        self.supports_concurrent_execution
    }

    fn lock_error(&self) -> MutexGuard<'_, Option<DecodeError>> {
        self.error.lock().expect("image decode error lock poisoned")
    }
}

impl TileTask for ImageDecodeTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn kind(&self) -> TileTaskKind {
        TileTaskKind::ImageDecode
    }

    fn category(&self) -> TaskCategory {
        if self.supports_concurrent_execution {
            TaskCategory::Concurrent
        } else {
            TaskCategory::NonConcurrentForeground
        }
    }

    fn dependencies(&self) -> TileTaskDependencies {
        match &self.dependency {
            Some(dependency) => smallvec![dependency.clone() as Arc<dyn TileTask>],
            None => TileTaskDependencies::new(),
        }
    }

    fn lifecycle(&self) -> &TileTaskLifecycle {
        &self.lifecycle
    }

    fn schedule_on_origin_thread(&self, _client: &mut dyn RasterTaskClient) {}

    fn run_on_worker_thread(&self) {
        if self.cache.contains(self.image) {
            return;
        }
        match decode_image(self.image, &self.encoded) {
            Ok(decoded) => {
                self.cache.insert(self.image, decoded);
            }
            Err(error) => {
                log::warn!("decode of {:?} failed: {error}", self.image);
                *self.lock_error() = Some(error);
            }
        }
    }

    fn complete_on_origin_thread(
        &self,
        _client: &mut dyn RasterTaskClient,
        outcome: TaskOutcome,
    ) -> RasterOutcome {
        let failure = self.lock_error().take().map(TileTaskError::from);
        settle_outcome(outcome, failure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterTaskParams {
    pub resource: ResourceId,
    pub content_id: ContentId,
    /// Contents the resource is expected to hold already; `NONE` forces a full raster.
    pub previous_content_id: ContentId,
    pub full_rect: PixelRect,
    pub dirty_rect: PixelRect,
}

/// Rasters one tile into a buffer acquired on the origin thread.
pub struct RasterTask {
    id: TaskId,
    params: RasterTaskParams,
    source: Arc<dyn RasterSource>,
    decode_dependencies: Vec<Arc<ImageDecodeTask>>,
    lifecycle: TileTaskLifecycle,
    buffer: Mutex<Option<Box<dyn RasterBuffer>>>,
    acquire_error: Mutex<Option<RasterBufferError>>,
}

impl RasterTask {
    pub fn new(
        params: RasterTaskParams,
        source: Arc<dyn RasterSource>,
        decode_dependencies: Vec<Arc<ImageDecodeTask>>,
    ) -> Self {
        Self {
            id: next_tile_task_id(),
            params,
            source,
            decode_dependencies,
            lifecycle: TileTaskLifecycle::default(),
            buffer: Mutex::new(None),
            acquire_error: Mutex::new(None),
        }
    }

    pub fn params(&self) -> RasterTaskParams {
        self.params
    }

    pub fn decode_dependencies(&self) -> &[Arc<ImageDecodeTask>] {
        &self.decode_dependencies
    }

    fn lock_buffer(&self) -> MutexGuard<'_, Option<Box<dyn RasterBuffer>>> {
        self.buffer.lock().expect("raster task buffer lock poisoned")
    }

    fn lock_acquire_error(&self) -> MutexGuard<'_, Option<RasterBufferError>> {
        self.acquire_error
            .lock()
            .expect("raster task error lock poisoned")
    }
}

impl TileTask for RasterTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn kind(&self) -> TileTaskKind {
        TileTaskKind::Raster
    }

    fn dependencies(&self) -> TileTaskDependencies {
        self.decode_dependencies
            .iter()
            .map(|decode| decode.clone() as Arc<dyn TileTask>)
            .collect()
    }

    fn lifecycle(&self) -> &TileTaskLifecycle {
        &self.lifecycle
    }

    fn schedule_on_origin_thread(&self, client: &mut dyn RasterTaskClient) {
        let params = self.params;
        match client.acquire_buffer_for_raster(
            params.resource,
            params.content_id,
            params.previous_content_id,
        ) {
            Ok(buffer) => *self.lock_buffer() = Some(buffer),
            Err(error) => {
                log::warn!("no raster buffer for {:?}: {error}", params.resource);
                *self.lock_acquire_error() = Some(error);
            }
        }
    }

    fn run_on_worker_thread(&self) {
        let params = self.params;
        let mut buffer = self.lock_buffer();
        // Without a buffer the failure was recorded at schedule time.
        let Some(buffer) = buffer.as_mut() else {
            return;
        };
        buffer.playback(
            self.source.as_ref(),
            params.full_rect,
            params.dirty_rect,
            params.content_id,
        );
    }

    fn complete_on_origin_thread(
        &self,
        client: &mut dyn RasterTaskClient,
        outcome: TaskOutcome,
    ) -> RasterOutcome {
        let mut failure = self.lock_acquire_error().take().map(TileTaskError::from);
        let buffer = self.lock_buffer().take();
        if let Some(buffer) = buffer {
            if let Err(error) = client.release_buffer_for_raster(buffer) {
                log::warn!("releasing raster buffer failed: {error}");
                failure.get_or_insert(TileTaskError::Buffer(error));
            }
        }
        settle_outcome(outcome, failure)
    }
}
