use std::collections::{HashMap, HashSet};

use crate::cache::binder::{GpuImage, bind_image};
use crate::foundation::core::{BufferId, ExternalBuffer, FrameSeq, ImageHandle};
use crate::foundation::error::BindError;
use crate::gpu::GpuContext;

/// Result of [`ExternalTextureCache::bind`].
#[derive(Debug)]
pub(crate) struct BindOutcome {
    pub(crate) result: Result<ImageHandle, BindError>,
    /// Previous image for the same identity; the caller must retire it.
    pub(crate) displaced: Option<GpuImage>,
}

/// Mapping from buffer identity to its imported image.
///
/// No fixed capacity: memory is bounded by [`ExternalTextureCache::evict_stale`], which runs once
/// per frame with the identities that frame referenced. The cache never destroys GPU objects
/// itself; every image it lets go of is handed back to the caller for deferred destruction.
#[derive(Debug, Default)]
pub(crate) struct ExternalTextureCache {
    entries: HashMap<BufferId, GpuImage>,
}

impl ExternalTextureCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Import `buffer` into `ctx`, replacing any existing entry for its identity.
    ///
    /// On failure the identity is left without an entry.
    pub(crate) fn bind(
        &mut self,
        ctx: &mut dyn GpuContext,
        buffer: &ExternalBuffer,
        max_texture_size: u32,
    ) -> BindOutcome {
        let displaced = self.entries.remove(&buffer.id);
        let result = bind_image(ctx, buffer, max_texture_size).map(|image| {
            let handle = image.handle;
            self.entries.insert(buffer.id, image);
            handle
        });
        if displaced.is_some() {
            tracing::debug!(buffer = %buffer.id, "rebinding cached buffer");
        }
        BindOutcome { result, displaced }
    }

    pub(crate) fn unbind(&mut self, id: BufferId) -> Option<GpuImage> {
        self.entries.remove(&id)
    }

    /// Drop every entry whose identity is not in `active`.
    pub(crate) fn evict_stale(&mut self, active: &HashSet<BufferId>) -> Vec<GpuImage> {
        let stale: Vec<BufferId> = self
            .entries
            .keys()
            .filter(|id| !active.contains(id))
            .copied()
            .collect();
        let mut out = Vec::with_capacity(stale.len());
        for id in stale {
            if let Some(image) = self.entries.remove(&id) {
                out.push(image);
            }
        }
        if !out.is_empty() {
            tracing::debug!(evicted = out.len(), kept = self.entries.len(), "evicted stale textures");
        }
        out
    }

    pub(crate) fn lookup(&self, id: BufferId) -> Option<&GpuImage> {
        self.entries.get(&id)
    }

    /// Record that the entry for `id` is referenced by submission `frame`.
    pub(crate) fn mark_used(&mut self, id: BufferId, frame: FrameSeq) -> Option<ImageHandle> {
        let image = self.entries.get_mut(&id)?;
        image.mark_used(frame);
        Some(image.handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Cached identities in ascending order.
    pub(crate) fn ids(&self) -> Vec<BufferId> {
        let mut ids: Vec<BufferId> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Remove every entry, e.g. before a context switch.
    pub(crate) fn drain(&mut self) -> Vec<GpuImage> {
        self.entries.drain().map(|(_, image)| image).collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/texture.rs"]
mod tests;
