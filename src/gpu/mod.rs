//! The seam between the engine and a graphics driver.
//!
//! A [`GpuDevice`] is probed once for its [`DeviceCaps`] and asked for one context per
//! [`ProtectionMode`]. Contexts never share objects: an [`ImageHandle`] issued by one context must
//! only ever be passed back to that same context.

use crate::cache::binder::ImportRequest;
use crate::engine::settings::{DisplaySettings, LayerSettings};
use crate::foundation::core::{ImageHandle, ProtectionMode};
use crate::foundation::error::{BindError, EngineResult};

pub(crate) mod fence;
pub(crate) mod headless;

use fence::FenceHandle;

/// Capabilities probed once when the engine is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct DeviceCaps {
    /// The driver can export native sync fences from a flush.
    pub native_fences: bool,
    /// A protected context can be created.
    pub protected_content: bool,
    /// Largest texture edge the driver accepts.
    pub max_texture_size: u32,
    /// Largest viewport `[width, height]`.
    pub max_viewport_dims: [u32; 2],
}

/// Factory for GPU execution contexts.
pub trait GpuDevice: Send + Sync {
    /// Driver capabilities.
    fn caps(&self) -> DeviceCaps;

    /// Create the context for `mode`.
    fn create_context(&self, mode: ProtectionMode) -> EngineResult<Box<dyn GpuContext>>;
}

/// One GPU execution context.
///
/// All calls happen with the engine's rendering lock held, so implementations do not need their
/// own synchronization for command recording.
pub trait GpuContext: Send {
    /// Mode this context was created for.
    fn mode(&self) -> ProtectionMode;

    /// Return `true` once the context can no longer execute work.
    fn is_lost(&self) -> bool;

    /// Import an external buffer as a sampleable image.
    fn import_buffer(&mut self, request: &ImportRequest) -> Result<ImageHandle, BindError>;

    /// Create a render target backed by the destination buffer.
    fn create_output_image(&mut self, request: &ImportRequest) -> EngineResult<ImageHandle>;

    /// Release an image issued by this context.
    fn destroy_image(&mut self, image: ImageHandle);

    /// Bind `target` and set viewport/projection for `display`.
    fn begin_frame(&mut self, target: ImageHandle, display: &DisplaySettings) -> EngineResult<()>;

    /// Record the draw of one layer into `target`. `source` is `None` for solid layers.
    fn draw_layer(
        &mut self,
        target: ImageHandle,
        source: Option<ImageHandle>,
        layer: &LayerSettings,
    ) -> EngineResult<()>;

    /// Submit recorded commands. Returns `None` when no native fence could be produced.
    fn flush(&mut self) -> Option<FenceHandle>;

    /// Block until every submitted command has completed. `false` means the context is unusable.
    fn finish(&mut self) -> bool;
}
