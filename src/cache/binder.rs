use crate::foundation::core::{BufferId, ExternalBuffer, FrameSeq, ImageHandle, ProtectionMode};
use crate::foundation::error::{BindError, EngineError, EngineResult};
use crate::gpu::GpuContext;

/// Validated description of one buffer import, handed to [`GpuContext::import_buffer`] and
/// [`GpuContext::create_output_image`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportRequest {
    /// Buffer being imported.
    pub buffer: ExternalBuffer,
    /// Context the image will live in.
    pub mode: ProtectionMode,
    /// Ask the driver for a protected image.
    pub protected_content: bool,
}

/// Which cache owns a [`GpuImage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    /// Sampled layer image, owned by the external texture cache.
    Texture,
    /// Render target, owned by the output image cache.
    Output,
}

/// A GPU-resident image created from one `(BufferId, ProtectionMode)` pair.
///
/// Owned by exactly one cache (or by the retire queue once evicted). Destruction is explicit,
/// through the context that created it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuImage {
    pub(crate) handle: ImageHandle,
    pub(crate) buffer: BufferId,
    pub(crate) mode: ProtectionMode,
    pub(crate) kind: ImageKind,
    // Most recent submission that referenced the image.
    pub(crate) last_used: Option<FrameSeq>,
}

impl GpuImage {
    pub(crate) fn new(
        handle: ImageHandle,
        buffer: BufferId,
        mode: ProtectionMode,
        kind: ImageKind,
    ) -> Self {
        Self {
            handle,
            buffer,
            mode,
            kind,
            last_used: None,
        }
    }

    /// Backend handle.
    pub fn handle(&self) -> ImageHandle {
        self.handle
    }

    /// Buffer the image was created from.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Context the image belongs to.
    pub fn mode(&self) -> ProtectionMode {
        self.mode
    }

    /// Owning cache.
    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Most recent submission that referenced the image.
    pub fn last_used(&self) -> Option<FrameSeq> {
        self.last_used
    }

    pub(crate) fn mark_used(&mut self, frame: FrameSeq) {
        self.last_used = Some(self.last_used.map_or(frame, |prev| prev.max(frame)));
    }
}

/// Validate `buffer` for import into a `mode` context.
///
/// Pure: the same inputs always give the same request or the same error.
pub(crate) fn import_request(
    buffer: &ExternalBuffer,
    mode: ProtectionMode,
    max_texture_size: u32,
) -> Result<ImportRequest, BindError> {
    if buffer.width == 0 || buffer.height == 0 {
        return Err(BindError::import_failed(buffer.id, "buffer has zero extent"));
    }
    if buffer.width > max_texture_size || buffer.height > max_texture_size {
        return Err(BindError::import_failed(
            buffer.id,
            format!(
                "{}x{} exceeds max texture size {max_texture_size}",
                buffer.width, buffer.height
            ),
        ));
    }
    if buffer.protected && !mode.is_protected() {
        return Err(BindError::import_failed(
            buffer.id,
            "protected buffer cannot be imported into the normal context",
        ));
    }
    Ok(ImportRequest {
        buffer: buffer.clone(),
        mode,
        protected_content: buffer.protected,
    })
}

/// Import `buffer` into `ctx` as a sampleable [`GpuImage`].
pub(crate) fn bind_image(
    ctx: &mut dyn GpuContext,
    buffer: &ExternalBuffer,
    max_texture_size: u32,
) -> Result<GpuImage, BindError> {
    if ctx.is_lost() {
        return Err(BindError::ContextLost);
    }
    let request = import_request(buffer, ctx.mode(), max_texture_size)?;
    let handle = ctx.import_buffer(&request)?;
    Ok(GpuImage::new(
        handle,
        buffer.id,
        request.mode,
        ImageKind::Texture,
    ))
}

/// Create the render target for `buffer` in `ctx`.
///
/// Unlike layer imports, a protected context may render into an unprotected destination.
pub(crate) fn create_output_image(
    ctx: &mut dyn GpuContext,
    buffer: &ExternalBuffer,
    max_texture_size: u32,
) -> EngineResult<GpuImage> {
    if ctx.is_lost() {
        return Err(EngineError::ContextLost);
    }
    let mode = ctx.mode();
    let request = import_request(buffer, mode, max_texture_size)?;
    let request = ImportRequest {
        protected_content: mode.is_protected(),
        ..request
    };
    let handle = ctx.create_output_image(&request)?;
    Ok(GpuImage::new(handle, buffer.id, mode, ImageKind::Output))
}

#[cfg(test)]
#[path = "../../tests/unit/cache/binder.rs"]
mod tests;
