use frame_protocol::{PixelSize, SurfaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryCutoff {
    AllowNothing,
    AllowRequiredOnly,
    AllowNiceToHave,
    AllowEverything,
}

/// How much memory the output surface's producer may keep around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPolicy {
    pub bytes_limit_when_visible: usize,
    pub priority_cutoff_when_visible: MemoryCutoff,
    pub num_resources_limit: usize,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            bytes_limit_when_visible: 128 * 1024 * 1024,
            priority_cutoff_when_visible: MemoryCutoff::AllowNiceToHave,
            num_resources_limit: 1024,
        }
    }
}

/// What a draw hands to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentedFrame {
    pub sequence_number: u64,
    pub root_surface: SurfaceId,
    pub size: PixelSize,
}

/// Where frames end up. Swap completion and surface loss are reported back
/// to the display by the embedder.
pub trait OutputSurface {
    fn swap_buffers(&mut self, frame: PresentedFrame);

    fn set_memory_policy(&mut self, policy: MemoryPolicy);
}
