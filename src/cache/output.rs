use std::collections::VecDeque;

use crate::cache::binder::GpuImage;
use crate::foundation::core::{BufferId, FrameSeq, ImageHandle, ProtectionMode};
use crate::foundation::error::EngineResult;

/// Where the output image for a frame lives.
#[derive(Debug)]
pub(crate) enum OutputSlot {
    /// Owned by the cache; reused by later frames.
    Cached(ImageHandle),
    /// Owned by the frame; must be retired once the frame is submitted.
    Transient(GpuImage),
}

impl OutputSlot {
    pub(crate) fn handle(&self) -> ImageHandle {
        match self {
            Self::Cached(h) => *h,
            Self::Transient(image) => image.handle,
        }
    }
}

/// Capacity-bounded cache of render targets keyed by destination buffer identity.
///
/// Eviction is strict insertion order: a hit does not move an entry, so a destination that is
/// reused every frame is still evicted once `capacity` newer destinations have been inserted.
#[derive(Debug)]
pub(crate) struct OutputImageCache {
    capacity: usize,
    entries: VecDeque<GpuImage>,
}

impl OutputImageCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the cached target for `buffer`, creating it on a miss.
    ///
    /// Entries created under another [`ProtectionMode`] never match; they are pushed to `evicted`
    /// and replaced. With a capacity of zero nothing is cached and the new image comes back as
    /// [`OutputSlot::Transient`]. Evicted images are appended to `evicted` for the caller to
    /// retire.
    pub(crate) fn get_or_create<F>(
        &mut self,
        buffer: BufferId,
        mode: ProtectionMode,
        create: F,
        evicted: &mut Vec<GpuImage>,
    ) -> EngineResult<OutputSlot>
    where
        F: FnOnce() -> EngineResult<GpuImage>,
    {
        if let Some(pos) = self.position(buffer) {
            if self.entries[pos].mode == mode {
                return Ok(OutputSlot::Cached(self.entries[pos].handle));
            }
            if let Some(stale) = self.entries.remove(pos) {
                evicted.push(stale);
            }
        }

        let image = create()?;
        if self.capacity == 0 {
            return Ok(OutputSlot::Transient(image));
        }

        let handle = image.handle;
        self.entries.push_back(image);
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                tracing::debug!(buffer = %oldest.buffer, "output cache full, evicting oldest");
                evicted.push(oldest);
            }
        }
        Ok(OutputSlot::Cached(handle))
    }

    pub(crate) fn invalidate(&mut self, buffer: BufferId) -> Option<GpuImage> {
        let pos = self.position(buffer)?;
        self.entries.remove(pos)
    }

    pub(crate) fn mark_used(&mut self, buffer: BufferId, frame: FrameSeq) {
        if let Some(pos) = self.position(buffer) {
            self.entries[pos].mark_used(frame);
        }
    }

    pub(crate) fn contains(&self, buffer: BufferId) -> bool {
        self.position(buffer).is_some()
    }

    /// Cached identities, oldest (next to be evicted) first.
    pub(crate) fn ids(&self) -> Vec<BufferId> {
        self.entries.iter().map(|e| e.buffer).collect()
    }

    pub(crate) fn drain(&mut self) -> Vec<GpuImage> {
        self.entries.drain(..).collect()
    }

    fn position(&self, buffer: BufferId) -> Option<usize> {
        self.entries.iter().position(|e| e.buffer == buffer)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/output.rs"]
mod tests;
