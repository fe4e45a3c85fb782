use kurbo::Rect;

use crate::foundation::core::{BufferId, ExternalBuffer};
use crate::gpu::fence::FenceHandle;

/// Per-frame display parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplaySettings {
    /// Destination rectangle in physical display pixels.
    pub physical_display: Rect,
    /// Rectangle of layer space visible on the display.
    pub clip: Rect,
    /// Maximum luminance in nits, forwarded to the shading backend.
    pub max_luminance: f32,
    /// The output itself must be protected (secure display path).
    pub protected_output: bool,
    /// Optional clear color applied before any layer is drawn.
    pub clear_color: Option<[f32; 4]>,
}

impl DisplaySettings {
    /// Full-surface display of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        let r = Rect::new(0.0, 0.0, f64::from(width), f64::from(height));
        Self {
            physical_display: r,
            clip: r,
            max_luminance: 500.0,
            protected_output: false,
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
        }
    }
}

/// What a layer samples from.
#[derive(Clone, Debug)]
pub enum LayerSource {
    /// An external buffer, optionally guarded by an acquire fence.
    Buffer {
        /// Buffer descriptor.
        buffer: ExternalBuffer,
        /// Signals when the producer has finished writing `buffer`.
        acquire_fence: Option<FenceHandle>,
    },
    /// Flat premultiplied RGBA fill.
    Solid([f32; 4]),
}

/// One visual layer of a frame.
#[derive(Clone, Debug)]
pub struct LayerSettings {
    /// Layer bounds in layer space.
    pub bounds: Rect,
    /// Plane alpha in `[0, 1]`.
    pub alpha: f32,
    /// Pixel source.
    pub source: LayerSource,
}

impl LayerSettings {
    /// Layer sampling `buffer` over `bounds`, without an acquire fence.
    pub fn buffer(buffer: ExternalBuffer, bounds: Rect) -> Self {
        Self {
            bounds,
            alpha: 1.0,
            source: LayerSource::Buffer {
                buffer,
                acquire_fence: None,
            },
        }
    }

    /// Solid color layer.
    pub fn solid(color: [f32; 4], bounds: Rect) -> Self {
        Self {
            bounds,
            alpha: 1.0,
            source: LayerSource::Solid(color),
        }
    }

    /// Attach an acquire fence to a buffer layer. No-op for solid layers.
    pub fn with_acquire_fence(mut self, fence: FenceHandle) -> Self {
        if let LayerSource::Buffer { acquire_fence, .. } = &mut self.source {
            *acquire_fence = Some(fence);
        }
        self
    }

    /// Buffer sampled by this layer, if any.
    pub fn external_buffer(&self) -> Option<&ExternalBuffer> {
        match &self.source {
            LayerSource::Buffer { buffer, .. } => Some(buffer),
            LayerSource::Solid(_) => None,
        }
    }

    /// Identity of the buffer sampled by this layer, if any.
    pub fn buffer_id(&self) -> Option<BufferId> {
        self.external_buffer().map(|b| b.id)
    }

    /// Return `true` when the layer samples protected content.
    pub fn is_protected(&self) -> bool {
        self.external_buffer().is_some_and(|b| b.protected)
    }
}

/// Per-call switches for [`crate::RenderEngine::draw_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawOptions {
    /// Keep the destination's output image in the output cache for later frames.
    pub use_output_cache: bool,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            use_output_cache: true,
        }
    }
}
