use std::sync::Arc;

use crate::buffer::RasterTaskClient;
use crate::format::{ResourceFormat, resource_format_requires_swizzle};
use crate::one_copy::OneCopyBufferProvider;
use crate::resource::ResourceProvider;
use crate::zero_copy::ZeroCopyBufferProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferProviderKind {
    ZeroCopy,
    OneCopy,
    /// One-copy when the resource format needs a swizzle, zero-copy otherwise.
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterSettings {
    pub provider: BufferProviderKind,
    pub max_staging_buffers: usize,
    pub preferred_format: ResourceFormat,
    pub supports_bgra: bool,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            provider: BufferProviderKind::Automatic,
            max_staging_buffers: 32,
            preferred_format: ResourceFormat::Rgba8888,
            supports_bgra: false,
        }
    }
}

impl RasterSettings {
    pub fn resource_format(&self) -> ResourceFormat {
        if self.preferred_format == ResourceFormat::Bgra8888 && !self.supports_bgra {
            ResourceFormat::Rgba8888
        } else {
            self.preferred_format
        }
    }

    pub fn resolved_provider(&self) -> BufferProviderKind {
        match self.provider {
            BufferProviderKind::Automatic => {
                if resource_format_requires_swizzle(self.resource_format()) {
                    BufferProviderKind::OneCopy
                } else {
                    BufferProviderKind::ZeroCopy
                }
            }
            explicit => explicit,
        }
    }
}

pub fn create_raster_task_client(
    settings: &RasterSettings,
    resources: Arc<ResourceProvider>,
) -> Box<dyn RasterTaskClient> {
    let format = settings.resource_format();
    let provider = settings.resolved_provider();
    log::debug!("raster buffers: {provider:?} in {format:?}");
    match provider {
        BufferProviderKind::OneCopy => Box::new(OneCopyBufferProvider::new(
            resources,
            format,
            settings.max_staging_buffers,
        )),
        BufferProviderKind::ZeroCopy | BufferProviderKind::Automatic => {
            Box::new(ZeroCopyBufferProvider::new(resources, format))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_without_support_falls_back_to_rgba() {
        let settings = RasterSettings {
            preferred_format: ResourceFormat::Bgra8888,
            ..RasterSettings::default()
        };
        assert_eq!(settings.resource_format(), ResourceFormat::Rgba8888);
        assert_eq!(settings.resolved_provider(), BufferProviderKind::ZeroCopy);
    }

    #[test]
    fn automatic_picks_one_copy_for_swizzled_formats() {
        let settings = RasterSettings {
            preferred_format: ResourceFormat::Bgra8888,
            supports_bgra: true,
            ..RasterSettings::default()
        };
        assert_eq!(settings.resolved_provider(), BufferProviderKind::OneCopy);

        let client = create_raster_task_client(&settings, Arc::new(ResourceProvider::new()));
        assert_eq!(client.resource_format(true), ResourceFormat::Bgra8888);
        assert!(client.resource_requires_swizzle(true));
    }

    #[test]
    fn explicit_choice_wins() {
        let settings = RasterSettings {
            provider: BufferProviderKind::OneCopy,
            ..RasterSettings::default()
        };
        assert_eq!(settings.resolved_provider(), BufferProviderKind::OneCopy);
    }
}
