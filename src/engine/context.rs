use crate::foundation::core::ProtectionMode;
use crate::foundation::error::EngineResult;
use crate::gpu::{GpuContext, GpuDevice};

/// The normal and (optional) protected contexts, plus which one is current.
///
/// Only selection lives here; draining the GPU and clearing caches around a switch is the
/// engine's job because it owns the caches.
pub(crate) struct ContextManager {
    normal: Box<dyn GpuContext>,
    protected: Option<Box<dyn GpuContext>>,
    active: ProtectionMode,
}

impl ContextManager {
    /// Create the normal context, and the protected one when requested and supported.
    ///
    /// A protected context that fails to initialize is not an error: the engine runs normal-only
    /// and [`ContextManager::activate`] reports that protected mode was not honored.
    pub(crate) fn new(device: &dyn GpuDevice, enable_protected: bool) -> EngineResult<Self> {
        let normal = device.create_context(ProtectionMode::Normal)?;
        let protected = if enable_protected && device.caps().protected_content {
            match device.create_context(ProtectionMode::Protected) {
                Ok(ctx) => Some(ctx),
                Err(e) => {
                    tracing::warn!(error = %e, "protected context unavailable, continuing without");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            normal,
            protected,
            active: ProtectionMode::Normal,
        })
    }

    pub(crate) fn active_mode(&self) -> ProtectionMode {
        self.active
    }

    pub(crate) fn supports_protected(&self) -> bool {
        self.protected.is_some()
    }

    pub(crate) fn active(&mut self) -> &mut dyn GpuContext {
        match (self.active, self.protected.as_deref_mut()) {
            (ProtectionMode::Protected, Some(ctx)) => ctx,
            _ => self.normal.as_mut(),
        }
    }

    pub(crate) fn get_mut(&mut self, mode: ProtectionMode) -> Option<&mut dyn GpuContext> {
        match mode {
            ProtectionMode::Normal => Some(self.normal.as_mut()),
            ProtectionMode::Protected => self.protected.as_deref_mut().map(|ctx| ctx as &mut dyn GpuContext),
        }
    }

    /// Make `mode` current if possible and return the mode that is now active.
    pub(crate) fn activate(&mut self, mode: ProtectionMode) -> ProtectionMode {
        if mode.is_protected() && self.protected.is_none() {
            return self.active;
        }
        self.active = mode;
        self.active
    }

    /// Drain every context. Returns `false` if any of them is unusable.
    pub(crate) fn finish_all(&mut self) -> bool {
        let mut ok = self.normal.finish();
        if let Some(ctx) = self.protected.as_deref_mut() {
            ok &= ctx.finish();
        }
        ok
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/context.rs"]
mod tests;
