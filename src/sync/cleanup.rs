//! Deferred destruction of GPU images.
//!
//! An image may still be sampled by submitted work after it leaves its cache (unbind, eviction,
//! rebind, context switch). Every image a cache lets go of goes through [`RetireQueue::retire`],
//! which destroys it at once if its last submission has completed and parks it otherwise.
//! [`CleanupStrategy`] decides how completion is learned: by polling native fences, or by draining
//! the GPU on devices that have none.

use crate::cache::binder::GpuImage;
use crate::engine::context::ContextManager;
use crate::foundation::core::FrameSeq;
use crate::foundation::error::{EngineError, EngineResult};
use crate::gpu::fence::FenceHandle;
use crate::gpu::{DeviceCaps, GpuContext};
use crate::sync::flush::GpuProgress;

/// How submissions are fenced and how prior resources get released.
///
/// Chosen once from [`DeviceCaps`] when the engine is created.
pub(crate) trait CleanupStrategy: Send {
    fn name(&self) -> &'static str;

    /// Flush the commands recorded for `frame` and return the fence the caller should wait on.
    fn submit(
        &mut self,
        ctx: &mut dyn GpuContext,
        progress: &mut GpuProgress,
        frame: FrameSeq,
    ) -> EngineResult<FenceHandle>;

    /// Learn about completed work. Returns `true` when the previous frame's resources became
    /// releasable by this call.
    fn cleanup(
        &mut self,
        ctx: &mut dyn GpuContext,
        progress: &mut GpuProgress,
    ) -> EngineResult<bool>;
}

pub(crate) fn select_strategy(caps: &DeviceCaps) -> Box<dyn CleanupStrategy> {
    if caps.native_fences {
        Box::new(FenceGated)
    } else {
        Box::new(BlockingFinish)
    }
}

fn drain_gpu(ctx: &mut dyn GpuContext, progress: &mut GpuProgress) -> EngineResult<()> {
    if !ctx.finish() {
        return Err(EngineError::ContextLost);
    }
    progress.mark_idle();
    Ok(())
}

/// Native fences: never blocks, completion is observed by polling fence status.
#[derive(Debug)]
pub(crate) struct FenceGated;

impl CleanupStrategy for FenceGated {
    fn name(&self) -> &'static str {
        "fence_gated"
    }

    fn submit(
        &mut self,
        ctx: &mut dyn GpuContext,
        progress: &mut GpuProgress,
        frame: FrameSeq,
    ) -> EngineResult<FenceHandle> {
        match ctx.flush() {
            Some(fence) => {
                progress.submitted(frame, Some(fence.clone()));
                Ok(fence)
            }
            None => {
                if ctx.is_lost() {
                    return Err(EngineError::ContextLost);
                }
                tracing::warn!(frame = %frame, "flush produced no fence, draining GPU instead");
                drain_gpu(ctx, progress)?;
                progress.submitted(frame, None);
                Ok(FenceHandle::signaled())
            }
        }
    }

    fn cleanup(
        &mut self,
        _ctx: &mut dyn GpuContext,
        progress: &mut GpuProgress,
    ) -> EngineResult<bool> {
        progress.poll();
        // Amortized: if the last frame is still running, try again after a later frame.
        if progress.prior_resources_cleaned() || progress.last_fence().is_some() {
            return Ok(false);
        }
        progress.set_prior_resources_cleaned();
        Ok(true)
    }
}

/// No native fences: every submission is followed by exactly one full `finish()`.
#[derive(Debug)]
pub(crate) struct BlockingFinish;

impl CleanupStrategy for BlockingFinish {
    fn name(&self) -> &'static str {
        "blocking_finish"
    }

    fn submit(
        &mut self,
        ctx: &mut dyn GpuContext,
        progress: &mut GpuProgress,
        frame: FrameSeq,
    ) -> EngineResult<FenceHandle> {
        // Any fence returned here is not a native one; the drain below is what marks completion.
        drop(ctx.flush());
        drain_gpu(ctx, progress)?;
        progress.submitted(frame, None);
        Ok(FenceHandle::signaled())
    }

    fn cleanup(
        &mut self,
        ctx: &mut dyn GpuContext,
        progress: &mut GpuProgress,
    ) -> EngineResult<bool> {
        if progress.prior_resources_cleaned() {
            return Ok(false);
        }
        // `submit` already drained; only block for work flushed some other way since.
        if !progress.is_idle() {
            drain_gpu(ctx, progress)?;
        }
        progress.set_prior_resources_cleaned();
        Ok(true)
    }
}

/// Images waiting for the GPU to finish with them.
#[derive(Debug, Default)]
pub(crate) struct RetireQueue {
    pending: Vec<GpuImage>,
}

impl RetireQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Destroy `image` now if its last use has completed, otherwise park it.
    pub(crate) fn retire(
        &mut self,
        image: GpuImage,
        progress: &GpuProgress,
        contexts: &mut ContextManager,
    ) {
        if progress.is_complete(image.last_used) {
            destroy(contexts, image);
        } else {
            tracing::debug!(
                buffer = %image.buffer,
                last_used = ?image.last_used,
                "deferring image destruction until its fence signals"
            );
            self.pending.push(image);
        }
    }

    /// Destroy every parked image whose last use has completed. Returns how many were destroyed.
    pub(crate) fn collect(&mut self, progress: &GpuProgress, contexts: &mut ContextManager) -> usize {
        let (done, keep): (Vec<GpuImage>, Vec<GpuImage>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|image| progress.is_complete(image.last_used));
        self.pending = keep;
        let n = done.len();
        for image in done {
            destroy(contexts, image);
        }
        n
    }

    /// Destroy everything. Only valid once the GPU is idle.
    pub(crate) fn destroy_all(&mut self, contexts: &mut ContextManager) {
        for image in self.pending.drain(..) {
            destroy(contexts, image);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

fn destroy(contexts: &mut ContextManager, image: GpuImage) {
    match contexts.get_mut(image.mode) {
        Some(ctx) => ctx.destroy_image(image.handle),
        None => tracing::warn!(
            buffer = %image.buffer,
            mode = %image.mode,
            "owning context is gone, dropping image handle"
        ),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sync/cleanup.rs"]
mod tests;
