use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use frame_protocol::{ContentId, PixelSize, ResourceId};

use crate::format::ResourceFormat;

#[derive(Debug)]
struct Resource {
    size: PixelSize,
    format: ResourceFormat,
    pixels: Vec<u8>,
    content_id: ContentId,
}

/// Owns the pixel memory of every raster resource.
///
/// Shared between the origin thread and workers; zero-copy buffers write into
/// resource memory from worker threads.
#[derive(Debug)]
pub struct ResourceProvider {
    resources: Mutex<HashMap<ResourceId, Resource>>,
    next_resource_id: AtomicU64,
}

impl Default for ResourceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProvider {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            next_resource_id: AtomicU64::new(1),
        }
    }

    pub fn create_resource(&self, size: PixelSize, format: ResourceFormat) -> ResourceId {
        assert!(!size.is_empty(), "raster resources must not be empty");
        let id = ResourceId(self.next_resource_id.fetch_add(1, Ordering::Relaxed));
        let byte_len = size.area() * format.bytes_per_pixel();
        self.lock_resources().insert(
            id,
            Resource {
                size,
                format,
                pixels: vec![0; byte_len],
                content_id: ContentId::NONE,
            },
        );
        id
    }

    pub fn delete_resource(&self, id: ResourceId) -> bool {
        self.lock_resources().remove(&id).is_some()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.lock_resources().contains_key(&id)
    }

    pub fn size(&self, id: ResourceId) -> Option<PixelSize> {
        self.lock_resources().get(&id).map(|resource| resource.size)
    }

    pub fn format(&self, id: ResourceId) -> Option<ResourceFormat> {
        self.lock_resources().get(&id).map(|resource| resource.format)
    }

    pub fn content_id(&self, id: ResourceId) -> Option<ContentId> {
        self.lock_resources()
            .get(&id)
            .map(|resource| resource.content_id)
    }

    pub fn set_content_id(&self, id: ResourceId, content_id: ContentId) -> bool {
        match self.lock_resources().get_mut(&id) {
            Some(resource) => {
                resource.content_id = content_id;
                true
            }
            None => false,
        }
    }

    /// Copy of the resource's pixels, in its own format.
    pub fn read_pixels(&self, id: ResourceId) -> Option<Vec<u8>> {
        self.lock_resources()
            .get(&id)
            .map(|resource| resource.pixels.clone())
    }

    /// Runs `write` on the resource's pixel memory. `None` when the resource is gone.
    pub fn with_pixels_mut<R>(
        &self,
        id: ResourceId,
        write: impl FnOnce(&mut [u8], PixelSize, ResourceFormat) -> R,
    ) -> Option<R> {
        let mut resources = self.lock_resources();
        let resource = resources.get_mut(&id)?;
        Some(write(&mut resource.pixels, resource.size, resource.format))
    }

    pub fn resource_count(&self) -> usize {
        self.lock_resources().len()
    }

    fn lock_resources(&self) -> MutexGuard<'_, HashMap<ResourceId, Resource>> {
        self.resources
            .lock()
            .expect("resource provider lock poisoned")
    }
}
