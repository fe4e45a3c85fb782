use std::collections::VecDeque;
use std::time::Duration;

use crate::foundation::core::FrameSeq;
use crate::gpu::fence::{FenceHandle, FenceStatus};

/// Book-keeping of what has been submitted to the GPU and what is known to have completed.
///
/// Submissions complete in order, so "completed" is a single watermark: every submission with a
/// sequence number `<= completed` is done.
#[derive(Debug)]
pub(crate) struct GpuProgress {
    last_issued: FrameSeq,
    completed: FrameSeq,
    // Issued but not yet flushed; nothing recorded for it has reached the GPU.
    recording: Option<FrameSeq>,
    in_flight: VecDeque<(FrameSeq, FenceHandle)>,
    prior_resources_cleaned: bool,
}

impl Default for GpuProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuProgress {
    pub(crate) fn new() -> Self {
        Self {
            last_issued: FrameSeq::default(),
            completed: FrameSeq::default(),
            recording: None,
            in_flight: VecDeque::new(),
            prior_resources_cleaned: true,
        }
    }

    /// Allocate the sequence number for the submission about to be recorded.
    pub(crate) fn begin(&mut self) -> FrameSeq {
        self.last_issued = self.last_issued.next();
        self.recording = Some(self.last_issued);
        self.last_issued
    }

    /// The submission `frame` was flushed. `fence` is `None` when the GPU was drained instead.
    pub(crate) fn submitted(&mut self, frame: FrameSeq, fence: Option<FenceHandle>) {
        if self.recording == Some(frame) {
            self.recording = None;
        }
        match fence {
            Some(f) => self.in_flight.push_back((frame, f)),
            None => self.mark_idle(),
        }
        self.prior_resources_cleaned = false;
    }

    /// The submission being recorded was dropped without reaching the GPU.
    pub(crate) fn abandon(&mut self) {
        self.recording = None;
    }

    /// Everything flushed so far has completed (after a `finish()`).
    pub(crate) fn mark_idle(&mut self) {
        self.in_flight.clear();
        self.refresh_completed();
    }

    /// Retire signaled fences from the front of the in-flight queue without blocking.
    pub(crate) fn poll(&mut self) {
        while let Some((frame, fence)) = self.in_flight.front() {
            match fence.status() {
                FenceStatus::Signaled => {}
                FenceStatus::Pending => break,
                FenceStatus::Error => {
                    tracing::error!(frame = %frame, "submission fence reported an error");
                }
            }
            self.in_flight.pop_front();
        }
        self.refresh_completed();
    }

    fn refresh_completed(&mut self) {
        let watermark = match (self.in_flight.front(), self.recording) {
            (Some((oldest, _)), _) => FrameSeq(oldest.0.saturating_sub(1)),
            (None, Some(rec)) => FrameSeq(rec.0.saturating_sub(1)),
            (None, None) => self.last_issued,
        };
        self.completed = self.completed.max(watermark);
    }

    /// Return `true` when the GPU is done with anything last referenced by `frame`.
    pub(crate) fn is_complete(&self, frame: Option<FrameSeq>) -> bool {
        frame.is_none_or(|f| f <= self.completed)
    }

    pub(crate) fn completed(&self) -> FrameSeq {
        self.completed
    }

    pub(crate) fn last_issued(&self) -> FrameSeq {
        self.last_issued
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Nothing is being recorded and nothing submitted is outstanding.
    pub(crate) fn is_idle(&self) -> bool {
        self.recording.is_none() && self.in_flight.is_empty()
    }

    /// Fence of the most recent flush, if it is still tracked.
    pub(crate) fn last_fence(&self) -> Option<&FenceHandle> {
        self.in_flight.back().map(|(_, f)| f)
    }

    pub(crate) fn prior_resources_cleaned(&self) -> bool {
        self.prior_resources_cleaned
    }

    pub(crate) fn set_prior_resources_cleaned(&mut self) {
        self.prior_resources_cleaned = true;
    }
}

/// Block up to `timeout` for `fence`.
///
/// A timeout is reported as a driver anomaly and returned as `false`; it is never retried here.
pub(crate) fn wait_fence(fence: &FenceHandle, timeout: Duration) -> bool {
    match fence.wait(Some(timeout)) {
        FenceStatus::Signaled => true,
        FenceStatus::Pending => {
            tracing::error!(?timeout, "fence did not signal in time, GPU may be hung");
            false
        }
        FenceStatus::Error => {
            tracing::error!("fence reported an error while waiting");
            false
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sync/flush.rs"]
mod tests;
