use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::cache::binder::{GpuImage, create_output_image};
use crate::cache::output::{OutputImageCache, OutputSlot};
use crate::cache::texture::ExternalTextureCache;
use crate::engine::context::ContextManager;
use crate::engine::dump::EngineDump;
use crate::engine::image_manager::{Barrier, ImageManager};
use crate::engine::settings::{DisplaySettings, DrawOptions, LayerSettings, LayerSource};
use crate::foundation::core::{BufferId, ExternalBuffer, FrameSeq, ImageHandle, ProtectionMode};
use crate::foundation::error::{BindError, EngineError, EngineResult};
use crate::gpu::fence::FenceHandle;
use crate::gpu::{DeviceCaps, GpuContext, GpuDevice};
use crate::sync::cleanup::{CleanupStrategy, RetireQueue, select_strategy};
use crate::sync::flush::{GpuProgress, wait_fence};
use crate::sync::tracer::{CompletionTracer, TracerStats};

/// Construction-time engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderEngineOpts {
    /// Maximum number of cached output images. `0` disables output caching.
    pub output_cache_size: usize,
    /// Run the background completion tracer (only on devices with native fences).
    pub trace_gpu_completion: bool,
    /// Try to create the protected context. It may still be unavailable.
    pub enable_protected_context: bool,
    /// Bound for input and acquire fence waits, in milliseconds.
    pub fence_timeout_ms: u64,
    /// Bound for each fence wait on the tracer thread, in milliseconds.
    pub tracer_wait_timeout_ms: u64,
}

impl Default for RenderEngineOpts {
    fn default() -> Self {
        Self {
            output_cache_size: 0,
            trace_gpu_completion: false,
            enable_protected_context: false,
            fence_timeout_ms: 3000,
            tracer_wait_timeout_ms: 3000,
        }
    }
}

impl RenderEngineOpts {
    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> EngineResult<Self> {
        let opts: Self = serde_json::from_str(s)
            .map_err(|e| EngineError::validation(format!("invalid engine options: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    /// Read and parse an options file.
    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Other(anyhow::Error::new(e).context(format!("reading {}", path.display())))
        })?;
        Self::from_json_str(&s)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.fence_timeout_ms == 0 {
            return Err(EngineError::validation("fence_timeout_ms must be > 0"));
        }
        if self.tracer_wait_timeout_ms == 0 {
            return Err(EngineError::validation("tracer_wait_timeout_ms must be > 0"));
        }
        Ok(())
    }

    /// [`RenderEngineOpts::fence_timeout_ms`] as a duration.
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }
}

/// Why a layer was left out of a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The layer's buffer could not be imported.
    Import(BindError),
    /// The layer's acquire fence did not signal in time.
    AcquireFenceTimeout,
    /// The backend rejected the draw.
    Draw(String),
}

/// A layer that did not make it into the composite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedLayer {
    /// Position in the frame's layer list.
    pub index: usize,
    /// Buffer the layer sampled, if any.
    pub buffer: Option<BufferId>,
    /// Cause.
    pub reason: SkipReason,
}

/// Outcome of one successfully submitted frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameStatus {
    /// Submission sequence number of the frame.
    pub frame: FrameSeq,
    /// Context the frame was rendered in.
    pub mode: ProtectionMode,
    /// Layers that were drawn.
    pub layers_drawn: usize,
    /// Layers that were skipped, in layer order.
    pub skipped: SmallVec<[SkippedLayer; 2]>,
    /// The output image came from (or was put in) the output cache.
    pub output_cached: bool,
}

impl FrameStatus {
    /// Return `true` when every layer was drawn.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Result of [`RenderEngine::draw_frame`].
#[derive(Clone, Debug)]
pub struct FrameOutput {
    /// Per-layer outcome.
    pub status: FrameStatus,
    /// Signals once the GPU has finished writing the destination buffer.
    pub fence: FenceHandle,
}

pub(crate) struct RenderState {
    contexts: ContextManager,
    textures: ExternalTextureCache,
    retired: RetireQueue,
    progress: GpuProgress,
    strategy: Box<dyn CleanupStrategy>,
    tracer: Option<CompletionTracer>,
    lost: bool,
    frames_drawn: u64,
}

impl RenderState {
    fn retire(&mut self, images: impl IntoIterator<Item = GpuImage>) {
        for image in images {
            self.retired
                .retire(image, &self.progress, &mut self.contexts);
        }
    }

    fn mark_lost(&mut self, during: &'static str) {
        if !self.lost {
            tracing::error!(during, "GPU context lost, engine must be recreated");
        }
        self.lost = true;
    }

    fn ensure_alive(&self) -> EngineResult<()> {
        if self.lost {
            Err(EngineError::ContextLost)
        } else {
            Ok(())
        }
    }

    fn queue_trace(&self, caps: &DeviceCaps, fence: &FenceHandle, frame: FrameSeq) {
        if let Some(tracer) = self.tracer.as_ref()
            && caps.native_fences
        {
            tracer.queue(fence.clone(), frame);
        }
    }
}

/// State shared between the public engine handle and its image manager thread.
///
/// Lock order is `rendering` then `outputs`; nothing takes them the other way around, so output
/// cache inspection can never deadlock against a frame in progress.
pub(crate) struct EngineInner {
    opts: RenderEngineOpts,
    caps: DeviceCaps,
    rendering: Mutex<RenderState>,
    outputs: Mutex<OutputImageCache>,
}

impl EngineInner {
    pub(crate) fn bind_external_buffer(&self, buffer: &ExternalBuffer) -> EngineResult<()> {
        let mut guard = self.rendering.lock();
        let st = &mut *guard;
        st.ensure_alive()?;
        st.progress.poll();

        let outcome = st
            .textures
            .bind(st.contexts.active(), buffer, self.caps.max_texture_size);
        st.retire(outcome.displaced);
        match outcome.result {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.is_fatal() {
                    st.mark_lost("bind");
                }
                Err(EngineError::from(e))
            }
        }
    }

    pub(crate) fn unbind_external_buffer(&self, id: BufferId) {
        let mut guard = self.rendering.lock();
        let st = &mut *guard;
        st.progress.poll();
        if let Some(image) = st.textures.unbind(id) {
            st.retire(Some(image));
        }
    }

    fn switch_context(&self, st: &mut RenderState, wanted: ProtectionMode) -> ProtectionMode {
        let current = st.contexts.active_mode();
        if wanted == current || st.lost {
            return current;
        }
        if wanted.is_protected() && !st.contexts.supports_protected() {
            tracing::warn!("protected context requested but not available");
            return current;
        }

        // Objects are not shared across contexts: nothing from the old one may stay in flight
        // or stay cached.
        if !st.contexts.active().finish() {
            st.mark_lost("context switch");
            return current;
        }
        st.progress.mark_idle();
        let textures = st.textures.drain();
        let outputs = self.outputs.lock().drain();
        let dropped = textures.len() + outputs.len();
        st.retire(textures.into_iter().chain(outputs));
        st.retired.collect(&st.progress, &mut st.contexts);

        let now = st.contexts.activate(wanted);
        tracing::info!(from = %current, to = %now, dropped, "switched GPU context");
        now
    }

    fn set_protected(&self, enable: bool) -> bool {
        let mut guard = self.rendering.lock();
        self.switch_context(&mut guard, ProtectionMode::from_protected(enable))
            .is_protected()
    }

    fn draw_frame(
        &self,
        display: &DisplaySettings,
        layers: &[LayerSettings],
        target: &ExternalBuffer,
        opts: DrawOptions,
        input_fence: Option<&FenceHandle>,
    ) -> EngineResult<FrameOutput> {
        let mut guard = self.rendering.lock();
        let st = &mut *guard;
        st.ensure_alive()?;

        let timeout = self.opts.fence_timeout();
        if let Some(fence) = input_fence
            && !wait_fence(fence, timeout)
        {
            return Err(EngineError::FenceTimeout { waited: timeout });
        }

        let required = ProtectionMode::from_protected(
            display.protected_output
                || target.protected
                || layers.iter().any(LayerSettings::is_protected),
        );
        let mode = self.switch_context(st, required);
        st.ensure_alive()?;
        if mode != required {
            return Err(EngineError::ProtectedUnavailable);
        }

        st.progress.poll();
        let frame = st.progress.begin();
        let max_texture_size = self.caps.max_texture_size;
        let mut skipped = SmallVec::<[SkippedLayer; 2]>::new();
        let mut plan = SmallVec::<[(usize, Option<ImageHandle>); 8]>::new();
        let mut active = HashSet::with_capacity(layers.len());

        for (index, layer) in layers.iter().enumerate() {
            let LayerSource::Buffer {
                buffer,
                acquire_fence,
            } = &layer.source
            else {
                plan.push((index, None));
                continue;
            };

            let handle = match st.textures.mark_used(buffer.id, frame) {
                Some(h) => h,
                None => {
                    let outcome = st
                        .textures
                        .bind(st.contexts.active(), buffer, max_texture_size);
                    st.retire(outcome.displaced);
                    match outcome.result {
                        Ok(h) => {
                            st.textures.mark_used(buffer.id, frame);
                            h
                        }
                        Err(e) if e.is_fatal() => {
                            st.progress.abandon();
                            st.mark_lost("layer import");
                            return Err(EngineError::ContextLost);
                        }
                        Err(e) => {
                            tracing::warn!(layer = index, buffer = %buffer.id, error = %e, "skipping layer");
                            skipped.push(SkippedLayer {
                                index,
                                buffer: Some(buffer.id),
                                reason: SkipReason::Import(e),
                            });
                            continue;
                        }
                    }
                }
            };
            active.insert(buffer.id);

            if let Some(fence) = acquire_fence
                && !wait_fence(fence, timeout)
            {
                tracing::warn!(layer = index, buffer = %buffer.id, "acquire fence timed out, skipping layer");
                skipped.push(SkippedLayer {
                    index,
                    buffer: Some(buffer.id),
                    reason: SkipReason::AcquireFenceTimeout,
                });
                continue;
            }
            plan.push((index, Some(handle)));
        }

        let stale = st.textures.evict_stale(&active);
        st.retire(stale);

        let mut evicted = Vec::new();
        let slot = {
            let mut outputs = self.outputs.lock();
            let ctx = st.contexts.active();
            let slot = if opts.use_output_cache {
                outputs.get_or_create(
                    target.id,
                    mode,
                    || create_output_image(ctx, target, max_texture_size),
                    &mut evicted,
                )
            } else {
                create_output_image(ctx, target, max_texture_size).map(OutputSlot::Transient)
            };
            if let Ok(OutputSlot::Cached(_)) = &slot {
                outputs.mark_used(target.id, frame);
            }
            slot
        };
        st.retire(evicted);
        let mut slot = match slot {
            Ok(slot) => slot,
            Err(e) => {
                st.progress.abandon();
                if e.is_fatal() {
                    st.mark_lost("output image creation");
                }
                return Err(e);
            }
        };
        if let OutputSlot::Transient(image) = &mut slot {
            image.mark_used(frame);
        }

        let drawn = match record_draws(
            st.contexts.active(),
            slot.handle(),
            display,
            layers,
            &plan,
            &mut skipped,
        ) {
            Ok(n) => n,
            Err(e) => {
                st.progress.abandon();
                if e.is_fatal() {
                    st.mark_lost("draw");
                }
                if let OutputSlot::Transient(image) = slot {
                    st.retire(Some(image));
                }
                return Err(e);
            }
        };

        // A transient target is last used by this frame, so retiring it now only parks it.
        let output_cached = matches!(slot, OutputSlot::Cached(_));
        if let OutputSlot::Transient(image) = slot {
            st.retire(Some(image));
        }

        let fence = match st
            .strategy
            .submit(st.contexts.active(), &mut st.progress, frame)
        {
            Ok(f) => f,
            Err(e) => {
                st.mark_lost("flush");
                return Err(e);
            }
        };
        st.queue_trace(&self.caps, &fence, frame);
        st.frames_drawn += 1;
        tracing::debug!(
            frame = %frame,
            drawn,
            skipped = skipped.len(),
            cached_textures = st.textures.len(),
            "frame submitted"
        );

        Ok(FrameOutput {
            status: FrameStatus {
                frame,
                mode,
                layers_drawn: drawn,
                skipped,
                output_cached,
            },
            fence,
        })
    }

    fn flush(&self) -> EngineResult<FenceHandle> {
        let mut guard = self.rendering.lock();
        let st = &mut *guard;
        st.ensure_alive()?;
        let frame = st.progress.begin();
        match st
            .strategy
            .submit(st.contexts.active(), &mut st.progress, frame)
        {
            Ok(fence) => {
                st.queue_trace(&self.caps, &fence, frame);
                Ok(fence)
            }
            Err(e) => {
                st.mark_lost("flush");
                Err(e)
            }
        }
    }

    fn finish(&self) -> bool {
        let mut guard = self.rendering.lock();
        let st = &mut *guard;
        if st.lost {
            return false;
        }
        if !st.contexts.active().finish() {
            st.mark_lost("finish");
            return false;
        }
        st.progress.mark_idle();
        true
    }

    fn cleanup_post_render(&self) -> bool {
        let mut guard = self.rendering.lock();
        let st = &mut *guard;
        let released = match st
            .strategy
            .cleanup(st.contexts.active(), &mut st.progress)
        {
            Ok(released) => released,
            Err(_) => {
                st.mark_lost("cleanup");
                false
            }
        };
        let destroyed = st.retired.collect(&st.progress, &mut st.contexts);
        if destroyed > 0 {
            tracing::debug!(destroyed, pending = st.retired.len(), "released deferred images");
        }
        released
    }

    fn invalidate_output(&self, id: BufferId) {
        let mut guard = self.rendering.lock();
        let st = &mut *guard;
        st.progress.poll();
        let removed = self.outputs.lock().invalidate(id);
        st.retire(removed);
    }

    fn dump(&self) -> EngineDump {
        let st = self.rendering.lock();
        let outputs = self.outputs.lock();
        EngineDump {
            active_mode: st.contexts.active_mode(),
            protected_supported: st.contexts.supports_protected(),
            lost: st.lost,
            cleanup_strategy: st.strategy.name().to_string(),
            frames_drawn: st.frames_drawn,
            last_issued: st.progress.last_issued(),
            last_completed: st.progress.completed(),
            in_flight: st.progress.in_flight(),
            cached_textures: st.textures.ids(),
            output_cache_capacity: outputs.capacity(),
            cached_outputs: outputs.ids(),
            pending_destructions: st.retired.len(),
            tracer: st.tracer.as_ref().map(CompletionTracer::stats),
            caps: self.caps,
        }
    }

    fn teardown(&self) {
        let mut guard = self.rendering.lock();
        let st = &mut *guard;
        // Drain first: the tracer may be blocked on one of our fences.
        if !st.contexts.finish_all() {
            tracing::warn!("tearing down with an unusable context");
        }
        if let Some(mut tracer) = st.tracer.take() {
            tracer.shutdown();
        }
        st.progress.mark_idle();
        let textures = st.textures.drain();
        let outputs = self.outputs.lock().drain();
        st.retire(textures.into_iter().chain(outputs));
        st.retired.destroy_all(&mut st.contexts);
    }
}

fn record_draws(
    ctx: &mut dyn GpuContext,
    target: ImageHandle,
    display: &DisplaySettings,
    layers: &[LayerSettings],
    plan: &[(usize, Option<ImageHandle>)],
    skipped: &mut SmallVec<[SkippedLayer; 2]>,
) -> EngineResult<usize> {
    ctx.begin_frame(target, display)?;
    let mut drawn = 0;
    for &(index, source) in plan {
        let layer = &layers[index];
        match ctx.draw_layer(target, source, layer) {
            Ok(()) => drawn += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(layer = index, error = %e, "layer draw failed, skipping");
                skipped.push(SkippedLayer {
                    index,
                    buffer: layer.buffer_id(),
                    reason: SkipReason::Draw(e.to_string()),
                });
            }
        }
    }
    Ok(drawn)
}

/// GPU layer compositor core.
///
/// Owns both GPU contexts, the external texture cache, the output image cache, deferred
/// destruction, and the optional completion tracer. Every method takes `&self`; the engine can be
/// shared across threads (for example, a buffer-lifecycle notifier calling
/// [`RenderEngine::unbind_external_buffer`] while the render thread draws).
pub struct RenderEngine {
    inner: Arc<EngineInner>,
    image_manager: ImageManager,
}

impl RenderEngine {
    /// Create an engine on `device`.
    pub fn new(device: &dyn GpuDevice, opts: RenderEngineOpts) -> EngineResult<Self> {
        opts.validate()?;
        let caps = device.caps();
        let contexts = ContextManager::new(device, opts.enable_protected_context)?;
        let strategy = select_strategy(&caps);
        let tracer = if opts.trace_gpu_completion && caps.native_fences {
            Some(CompletionTracer::spawn(Duration::from_millis(
                opts.tracer_wait_timeout_ms,
            ))?)
        } else {
            None
        };
        tracing::info!(
            strategy = strategy.name(),
            protected = contexts.supports_protected(),
            output_cache_size = opts.output_cache_size,
            tracing = tracer.is_some(),
            "render engine created"
        );

        let inner = Arc::new(EngineInner {
            outputs: Mutex::new(OutputImageCache::new(opts.output_cache_size)),
            rendering: Mutex::new(RenderState {
                contexts,
                textures: ExternalTextureCache::new(),
                retired: RetireQueue::new(),
                progress: GpuProgress::new(),
                strategy,
                tracer,
                lost: false,
                frames_drawn: 0,
            }),
            opts,
            caps,
        });
        let image_manager = ImageManager::spawn(inner.clone())?;
        Ok(Self {
            inner,
            image_manager,
        })
    }

    /// Options the engine was created with.
    pub fn opts(&self) -> &RenderEngineOpts {
        &self.inner.opts
    }

    /// Capabilities probed from the device at creation.
    pub fn caps(&self) -> DeviceCaps {
        self.inner.caps
    }

    /// Largest texture edge accepted for layer buffers.
    pub fn max_texture_size(&self) -> u32 {
        self.inner.caps.max_texture_size
    }

    /// Largest viewport `[width, height]`.
    pub fn max_viewport_dims(&self) -> [u32; 2] {
        self.inner.caps.max_viewport_dims
    }

    /// Import `buffer` into the active context, replacing any cached image for its identity.
    ///
    /// On failure no entry is left for the buffer.
    pub fn bind_external_buffer(&self, buffer: &ExternalBuffer) -> EngineResult<()> {
        self.inner.bind_external_buffer(buffer)
    }

    /// Drop the cached image for `id`. Destruction waits until the last frame that sampled it has
    /// completed on the GPU. No-op for unknown identities.
    pub fn unbind_external_buffer(&self, id: BufferId) {
        self.inner.unbind_external_buffer(id);
    }

    /// Queue [`RenderEngine::bind_external_buffer`] on the image manager thread.
    pub fn cache_external_buffer_async(&self, buffer: ExternalBuffer) -> Barrier {
        self.image_manager.cache(buffer)
    }

    /// Queue [`RenderEngine::unbind_external_buffer`] on the image manager thread.
    pub fn unbind_external_buffer_async(&self, id: BufferId) -> Barrier {
        self.image_manager.unbind(id)
    }

    /// Drop the cached output image for destination `id`, e.g. when the caller frees it.
    pub fn invalidate_output(&self, id: BufferId) {
        self.inner.invalidate_output(id);
    }

    /// Make the protected (or normal) context current.
    ///
    /// Returns whether the resulting active context is protected, which may differ from the
    /// request. A real switch drains the GPU and empties both caches.
    #[tracing::instrument(skip(self))]
    pub fn set_protected(&self, enable: bool) -> bool {
        self.inner.set_protected(enable)
    }

    /// Return `true` while the protected context is active.
    pub fn is_protected(&self) -> bool {
        self.inner.rendering.lock().contexts.active_mode().is_protected()
    }

    /// Return `true` when a protected context exists.
    pub fn supports_protected_content(&self) -> bool {
        self.inner.rendering.lock().contexts.supports_protected()
    }

    /// Composite `layers` into `target`.
    ///
    /// Waits (bounded) on `input_fence` first; a timeout fails the frame. Switches context when the
    /// frame needs a different [`ProtectionMode`]. Layers whose buffer cannot be imported, whose
    /// acquire fence times out, or whose draw is rejected are skipped and reported in
    /// [`FrameStatus::skipped`]. Only context loss, a missing protected context, or an unusable
    /// destination fail the frame.
    ///
    /// Call [`RenderEngine::cleanup_post_render`] afterwards to release deferred resources.
    #[tracing::instrument(skip_all, fields(target = %target.id, layers = layers.len()))]
    pub fn draw_frame(
        &self,
        display: &DisplaySettings,
        layers: &[LayerSettings],
        target: &ExternalBuffer,
        opts: DrawOptions,
        input_fence: Option<&FenceHandle>,
    ) -> EngineResult<FrameOutput> {
        self.inner
            .draw_frame(display, layers, target, opts, input_fence)
    }

    /// Submit everything recorded so far and return its completion fence.
    pub fn flush(&self) -> EngineResult<FenceHandle> {
        self.inner.flush()
    }

    /// Block until the GPU has completed all submitted work. `false` means the context is lost.
    pub fn finish(&self) -> bool {
        self.inner.finish()
    }

    /// Block up to `timeout` for an external fence. A timeout is logged and returned as `false`.
    pub fn wait_fence(&self, fence: &FenceHandle, timeout: Duration) -> bool {
        wait_fence(fence, timeout)
    }

    /// Release resources whose last use has completed.
    ///
    /// Returns `true` when the previous frame's resources were released by this call. With native
    /// fences this never blocks and returns `false` while the last frame is still running; without
    /// them the GPU was already drained at submit, so this only releases what that drain freed.
    pub fn cleanup_post_render(&self) -> bool {
        self.inner.cleanup_post_render()
    }

    /// Return `true` when `id` has a cached texture image.
    pub fn is_buffer_cached(&self, id: BufferId) -> bool {
        self.inner.rendering.lock().textures.lookup(id).is_some()
    }

    /// Return `true` when `id` has a cached output image. Takes only the output cache lock.
    pub fn is_output_cached(&self, id: BufferId) -> bool {
        self.inner.outputs.lock().contains(id)
    }

    /// Destination identities in the output cache, next to be evicted first. Takes only the output
    /// cache lock.
    pub fn cached_output_ids(&self) -> Vec<BufferId> {
        self.inner.outputs.lock().ids()
    }

    /// Number of images waiting on the GPU before they can be destroyed.
    pub fn pending_destructions(&self) -> usize {
        self.inner.rendering.lock().retired.len()
    }

    /// Completion tracer counters, when tracing is enabled.
    pub fn tracer_stats(&self) -> Option<TracerStats> {
        self.inner
            .rendering
            .lock()
            .tracer
            .as_ref()
            .map(CompletionTracer::stats)
    }

    /// Snapshot of the engine's caches and GPU progress.
    pub fn dump(&self) -> EngineDump {
        self.inner.dump()
    }

    /// [`RenderEngine::dump`] as pretty-printed JSON.
    pub fn dump_json(&self) -> EngineResult<String> {
        self.dump().to_json()
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.image_manager.shutdown();
        self.inner.teardown();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/render_engine.rs"]
mod tests;
