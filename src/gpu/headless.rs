use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::binder::ImportRequest;
use crate::engine::settings::{DisplaySettings, LayerSettings};
use crate::foundation::core::{BufferId, ImageHandle, ProtectionMode};
use crate::foundation::error::{BindError, EngineError, EngineResult};
use crate::gpu::fence::{FenceHandle, ManualFence};
use crate::gpu::{DeviceCaps, GpuContext, GpuDevice};

/// Behavior switches for [`HeadlessDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadlessOpts {
    /// Flushes return native fences. When `false`, flush yields no fence and callers must
    /// `finish()`.
    pub native_fences: bool,
    /// A protected context can be created.
    pub protected_content: bool,
    /// Fences signal as soon as they are created. When `false` they stay pending until
    /// [`HeadlessDevice::signal_all`], [`HeadlessDevice::signal_next`] or a `finish()`.
    pub auto_signal: bool,
    /// Reported max texture size.
    pub max_texture_size: u32,
}

impl Default for HeadlessOpts {
    fn default() -> Self {
        Self {
            native_fences: true,
            protected_content: true,
            auto_signal: true,
            max_texture_size: 4096,
        }
    }
}

/// What a live headless image was created for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadlessImageKind {
    /// Imported from a layer buffer.
    Texture,
    /// Render target.
    Output,
}

#[derive(Clone, Copy, Debug)]
struct LiveImage {
    mode: ProtectionMode,
    buffer: BufferId,
    kind: HeadlessImageKind,
}

/// One recorded layer draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawRecord {
    /// Context mode the draw was recorded in.
    pub mode: ProtectionMode,
    /// Render target.
    pub target: ImageHandle,
    /// Sampled image, `None` for solid fills.
    pub source: Option<ImageHandle>,
}

#[derive(Default)]
struct HeadlessState {
    next_image: u64,
    live: HashMap<ImageHandle, LiveImage>,
    created: u64,
    destroyed: Vec<ImageHandle>,
    draws: Vec<DrawRecord>,
    // Draws or destroys that referenced a dead image or another context's image.
    violations: Vec<String>,
    pending_fences: Vec<Arc<ManualFence>>,
    flushes: u64,
    finishes: u64,
    failing_imports: HashSet<BufferId>,
    lost: bool,
}

/// In-memory [`GpuDevice`] with full instrumentation.
///
/// Clones share state, so a test can keep one handle to inspect and script the device while the
/// engine owns the contexts.
#[derive(Clone)]
pub struct HeadlessDevice {
    opts: HeadlessOpts,
    state: Arc<Mutex<HeadlessState>>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessOpts::default())
    }
}

impl HeadlessDevice {
    /// Create a device with the given behavior.
    pub fn new(opts: HeadlessOpts) -> Self {
        Self {
            opts,
            state: Arc::new(Mutex::new(HeadlessState::default())),
        }
    }

    /// Make every later import of `id` fail with [`BindError::ImportFailed`].
    pub fn fail_imports_for(&self, id: BufferId) {
        self.state.lock().failing_imports.insert(id);
    }

    /// Undo [`HeadlessDevice::fail_imports_for`].
    pub fn allow_imports_for(&self, id: BufferId) {
        self.state.lock().failing_imports.remove(&id);
    }

    /// Simulate a device reset: every context becomes unusable.
    pub fn lose_context(&self) {
        let mut st = self.state.lock();
        st.lost = true;
        for f in st.pending_fences.drain(..) {
            f.fail();
        }
    }

    /// Signal every pending submission fence.
    pub fn signal_all(&self) {
        let fences = std::mem::take(&mut self.state.lock().pending_fences);
        for f in fences {
            f.signal();
        }
    }

    /// Signal the oldest pending submission fence. Returns `false` if none was pending.
    pub fn signal_next(&self) -> bool {
        let fence = {
            let mut st = self.state.lock();
            if st.pending_fences.is_empty() {
                return false;
            }
            st.pending_fences.remove(0)
        };
        fence.signal();
        true
    }

    /// Number of submission fences still pending.
    pub fn pending_fences(&self) -> usize {
        self.state.lock().pending_fences.len()
    }

    /// Number of live images across both modes.
    pub fn live_images(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Number of live images of `kind` created in `mode`.
    pub fn live_images_of(&self, mode: ProtectionMode, kind: HeadlessImageKind) -> usize {
        self.state
            .lock()
            .live
            .values()
            .filter(|img| img.mode == mode && img.kind == kind)
            .count()
    }

    /// Live texture images imported from `id`.
    pub fn live_textures_for(&self, id: BufferId) -> Vec<ImageHandle> {
        let st = self.state.lock();
        let mut out: Vec<ImageHandle> = st
            .live
            .iter()
            .filter(|(_, img)| img.buffer == id && img.kind == HeadlessImageKind::Texture)
            .map(|(h, _)| *h)
            .collect();
        out.sort();
        out
    }

    /// Return `true` while `image` has not been destroyed.
    pub fn is_live(&self, image: ImageHandle) -> bool {
        self.state.lock().live.contains_key(&image)
    }

    /// Total images ever created.
    pub fn images_created(&self) -> u64 {
        self.state.lock().created
    }

    /// Images destroyed so far, in destruction order.
    pub fn destroyed(&self) -> Vec<ImageHandle> {
        self.state.lock().destroyed.clone()
    }

    /// Every layer draw recorded so far.
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.lock().draws.clone()
    }

    /// Misuse detected by the device (stale or cross-context handles).
    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    /// Number of `flush()` calls.
    pub fn flushes(&self) -> u64 {
        self.state.lock().flushes
    }

    /// Number of `finish()` calls.
    pub fn finishes(&self) -> u64 {
        self.state.lock().finishes
    }
}

impl GpuDevice for HeadlessDevice {
    fn caps(&self) -> DeviceCaps {
        DeviceCaps {
            native_fences: self.opts.native_fences,
            protected_content: self.opts.protected_content,
            max_texture_size: self.opts.max_texture_size,
            max_viewport_dims: [self.opts.max_texture_size; 2],
        }
    }

    fn create_context(&self, mode: ProtectionMode) -> EngineResult<Box<dyn GpuContext>> {
        if mode.is_protected() && !self.opts.protected_content {
            return Err(EngineError::ProtectedUnavailable);
        }
        if self.state.lock().lost {
            return Err(EngineError::ContextLost);
        }
        Ok(Box::new(HeadlessContext {
            mode,
            opts: self.opts,
            state: self.state.clone(),
        }))
    }
}

struct HeadlessContext {
    mode: ProtectionMode,
    opts: HeadlessOpts,
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessContext {
    fn create_image(
        &self,
        st: &mut HeadlessState,
        buffer: BufferId,
        kind: HeadlessImageKind,
    ) -> ImageHandle {
        st.next_image += 1;
        st.created += 1;
        let handle = ImageHandle(st.next_image);
        st.live.insert(
            handle,
            LiveImage {
                mode: self.mode,
                buffer,
                kind,
            },
        );
        handle
    }

    fn check_image(&self, st: &mut HeadlessState, image: ImageHandle, what: &str) -> bool {
        match st.live.get(&image) {
            None => {
                st.violations.push(format!("{what}: image {image:?} is not live"));
                false
            }
            Some(img) if img.mode != self.mode => {
                st.violations.push(format!(
                    "{what}: image {image:?} belongs to the {} context, used from {}",
                    img.mode, self.mode
                ));
                false
            }
            Some(_) => true,
        }
    }
}

impl GpuContext for HeadlessContext {
    fn mode(&self) -> ProtectionMode {
        self.mode
    }

    fn is_lost(&self) -> bool {
        self.state.lock().lost
    }

    fn import_buffer(&mut self, request: &ImportRequest) -> Result<ImageHandle, BindError> {
        let mut st = self.state.lock();
        if st.lost {
            return Err(BindError::ContextLost);
        }
        if st.failing_imports.contains(&request.buffer.id) {
            return Err(BindError::import_failed(
                request.buffer.id,
                "driver rejected buffer",
            ));
        }
        Ok(self.create_image(&mut st, request.buffer.id, HeadlessImageKind::Texture))
    }

    fn create_output_image(&mut self, request: &ImportRequest) -> EngineResult<ImageHandle> {
        let mut st = self.state.lock();
        if st.lost {
            return Err(EngineError::ContextLost);
        }
        if st.failing_imports.contains(&request.buffer.id) {
            return Err(BindError::import_failed(
                request.buffer.id,
                "driver rejected render target",
            )
            .into());
        }
        Ok(self.create_image(&mut st, request.buffer.id, HeadlessImageKind::Output))
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        let mut st = self.state.lock();
        if self.check_image(&mut st, image, "destroy") {
            st.live.remove(&image);
            st.destroyed.push(image);
        }
    }

    fn begin_frame(&mut self, target: ImageHandle, _display: &DisplaySettings) -> EngineResult<()> {
        let mut st = self.state.lock();
        if st.lost {
            return Err(EngineError::ContextLost);
        }
        if !self.check_image(&mut st, target, "begin_frame") {
            return Err(EngineError::validation("render target is not a live image"));
        }
        Ok(())
    }

    fn draw_layer(
        &mut self,
        target: ImageHandle,
        source: Option<ImageHandle>,
        _layer: &LayerSettings,
    ) -> EngineResult<()> {
        let mut st = self.state.lock();
        if st.lost {
            return Err(EngineError::ContextLost);
        }
        if let Some(src) = source
            && !self.check_image(&mut st, src, "draw")
        {
            return Err(EngineError::validation("layer source is not a live image"));
        }
        st.draws.push(DrawRecord {
            mode: self.mode,
            target,
            source,
        });
        Ok(())
    }

    fn flush(&mut self) -> Option<FenceHandle> {
        let mut st = self.state.lock();
        st.flushes += 1;
        if st.lost || !self.opts.native_fences {
            return None;
        }
        let fence = ManualFence::new();
        if self.opts.auto_signal {
            fence.signal();
        } else {
            st.pending_fences.push(fence.clone());
        }
        Some(fence.handle())
    }

    fn finish(&mut self) -> bool {
        let fences = {
            let mut st = self.state.lock();
            st.finishes += 1;
            if st.lost {
                return false;
            }
            std::mem::take(&mut st.pending_fences)
        };
        for f in fences {
            f.signal();
        }
        true
    }
}
