use std::fmt;

/// Caller-assigned identity of an external graphics buffer.
///
/// Unique per distinct buffer object and stable for that buffer's lifetime. The engine never
/// invalidates or reassigns these.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Monotonic submission sequence number.
///
/// Every flush (and therefore every drawn frame) consumes one. `FrameSeq(0)` means "nothing
/// submitted yet", so the first submission is `FrameSeq(1)`.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct FrameSeq(pub u64);

impl FrameSeq {
    /// The sequence number following `self`.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for FrameSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle of a GPU-resident image issued by a [`crate::GpuContext`].
///
/// Handles are only meaningful to the context that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct ImageHandle(pub u64);

/// Which of the two GPU execution contexts a resource or operation belongs to.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionMode {
    /// Regular context; cannot sample or render protected content.
    #[default]
    Normal,
    /// Protected (secure) context used for DRM content.
    Protected,
}

impl ProtectionMode {
    /// Map a "protected?" flag to a mode.
    pub fn from_protected(protected: bool) -> Self {
        if protected {
            Self::Protected
        } else {
            Self::Normal
        }
    }

    /// Return `true` for [`ProtectionMode::Protected`].
    pub fn is_protected(self) -> bool {
        matches!(self, Self::Protected)
    }
}

impl fmt::Display for ProtectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Protected => f.write_str("protected"),
        }
    }
}

/// Pixel layout of an external buffer.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit RGBA.
    #[default]
    Rgba8888,
    /// 8-bit RGB with an ignored alpha byte.
    Rgbx8888,
    /// 16-bit packed RGB.
    Rgb565,
    /// 10-bit RGB with 2-bit alpha.
    Rgba1010102,
    /// Half-float RGBA.
    RgbaFp16,
}

impl PixelFormat {
    /// Storage size of one pixel.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgb565 => 2,
            Self::Rgba8888 | Self::Rgbx8888 | Self::Rgba1010102 => 4,
            Self::RgbaFp16 => 8,
        }
    }
}

/// An externally owned graphics buffer handed to the engine for sampling or as a render target.
///
/// The engine only reads the descriptor; the pixel storage behind `native_handle` stays owned by
/// the caller.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExternalBuffer {
    /// Caller-assigned identity.
    pub id: BufferId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    #[serde(default)]
    pub format: PixelFormat,
    /// Whether the buffer was allocated for protected content.
    #[serde(default)]
    pub protected: bool,
    /// Opaque platform handle forwarded to the GPU backend on import.
    #[serde(default)]
    pub native_handle: u64,
}

impl ExternalBuffer {
    /// Describe an unprotected RGBA8888 buffer.
    pub fn new(id: BufferId, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            format: PixelFormat::Rgba8888,
            protected: false,
            native_handle: id.0,
        }
    }

    /// Same buffer, flagged as protected content.
    pub fn into_protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Same buffer, with a different pixel layout.
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Backing storage size in bytes.
    pub fn byte_len(&self) -> u64 {
        u64::from(self.width)
            .saturating_mul(u64::from(self.height))
            .saturating_mul(u64::from(self.format.bytes_per_pixel()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
