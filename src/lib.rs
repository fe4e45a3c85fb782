//! Resource caching and GPU synchronization core of a layer compositor.
//!
//! A [`RenderEngine`] composites ordered layers into an externally allocated destination buffer:
//!
//! - External buffers are imported once and kept in a texture cache keyed by [`BufferId`]
//! - Render targets are kept in a small FIFO output cache
//! - Work is fenced; GPU objects are destroyed only after the GPU is done with them
//! - Normal and protected content render in separate contexts
//!
//! The GPU itself sits behind [`GpuDevice`] / [`GpuContext`]. [`HeadlessDevice`] is an
//! instrumented in-process implementation used by the CLI and the test suite.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cache;
mod engine;
mod foundation;
mod gpu;
mod sync;

/// Serializable scene description driving the `simulate` command.
pub mod scene;

pub use crate::cache::binder::{GpuImage, ImageKind, ImportRequest};
pub use crate::engine::dump::EngineDump;
pub use crate::engine::image_manager::Barrier;
pub use crate::engine::render_engine::{
    FrameOutput, FrameStatus, RenderEngine, RenderEngineOpts, SkipReason, SkippedLayer,
};
pub use crate::engine::settings::{DisplaySettings, DrawOptions, LayerSettings, LayerSource};
pub use crate::foundation::core::{
    BufferId, ExternalBuffer, FrameSeq, ImageHandle, PixelFormat, ProtectionMode,
};
pub use crate::foundation::error::{BindError, EngineError, EngineResult};
pub use crate::gpu::fence::{FenceHandle, FenceStatus, GpuFence, ManualFence};
pub use crate::gpu::headless::{DrawRecord, HeadlessDevice, HeadlessImageKind, HeadlessOpts};
pub use crate::gpu::{DeviceCaps, GpuContext, GpuDevice};
pub use crate::scene::Scene;
pub use crate::sync::tracer::{GPU_COMPLETION_TARGET, TracerStats};
