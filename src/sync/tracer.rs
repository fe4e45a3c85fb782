use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::foundation::core::FrameSeq;
use crate::foundation::error::{EngineError, EngineResult};
use crate::gpu::fence::{FenceHandle, FenceStatus};

/// Tracing target of the per-submission completion events.
pub const GPU_COMPLETION_TARGET: &str = "renderengine::gpu_completion";

/// Counters maintained by the completion tracer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct TracerStats {
    /// Submissions handed to the tracer.
    pub frames_queued: u64,
    /// Submissions whose fence was observed signaled.
    pub frames_completed: u64,
    /// Most recent submission observed complete.
    pub last_completed: Option<FrameSeq>,
    /// Fences that did not signal within the tracer's wait bound, or errored.
    pub timeouts: u64,
    /// Entries dropped unobserved at shutdown.
    pub abandoned: u64,
}

#[derive(Debug)]
struct TracedSubmission {
    fence: FenceHandle,
    frame: FrameSeq,
    queued_at: Instant,
}

/// Background observer of GPU completion order.
///
/// The render thread queues one entry per flush; a dedicated thread waits on each fence in
/// submission order and emits a `tracing` event with the observed latency. Latency attribution
/// assumes the driver completes work in submission order; out-of-order completion is reported
/// late, not corrected.
pub(crate) struct CompletionTracer {
    tx: Option<mpsc::Sender<TracedSubmission>>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<TracerStats>>,
    thread: Option<JoinHandle<()>>,
}

impl CompletionTracer {
    pub(crate) fn spawn(wait_timeout: Duration) -> EngineResult<Self> {
        let (tx, rx) = mpsc::channel::<TracedSubmission>();
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(Mutex::new(TracerStats::default()));

        let thread = {
            let running = running.clone();
            let stats = stats.clone();
            std::thread::Builder::new()
                .name("gpu-completion-tracer".to_string())
                .spawn(move || run(rx, &running, &stats, wait_timeout))
                .map_err(|e| {
                    EngineError::Other(
                        anyhow::Error::new(e).context("failed to spawn completion tracer"),
                    )
                })?
        };

        Ok(Self {
            tx: Some(tx),
            running,
            stats,
            thread: Some(thread),
        })
    }

    /// Queue a flushed submission. Never blocks on the consumer.
    pub(crate) fn queue(&self, fence: FenceHandle, frame: FrameSeq) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        self.stats.lock().frames_queued += 1;
        let entry = TracedSubmission {
            fence,
            frame,
            queued_at: Instant::now(),
        };
        if tx.send(entry).is_err() {
            tracing::warn!(frame = %frame, "completion tracer has exited, dropping entry");
        }
    }

    pub(crate) fn stats(&self) -> TracerStats {
        *self.stats.lock()
    }

    /// Stop the consumer and join it. Queued entries not yet observed are abandoned.
    ///
    /// Must run before any context is destroyed.
    pub(crate) fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        self.tx = None;
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("completion tracer thread panicked");
        }
    }
}

impl Drop for CompletionTracer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    rx: mpsc::Receiver<TracedSubmission>,
    running: &AtomicBool,
    stats: &Mutex<TracerStats>,
    wait_timeout: Duration,
) {
    while let Ok(entry) = rx.recv() {
        if !running.load(Ordering::Acquire) {
            let dropped = 1 + rx.try_iter().count() as u64;
            stats.lock().abandoned += dropped;
            break;
        }

        match entry.fence.wait(Some(wait_timeout)) {
            FenceStatus::Signaled => {
                let latency = entry.queued_at.elapsed();
                tracing::trace!(
                    target: GPU_COMPLETION_TARGET,
                    frame = entry.frame.0,
                    latency_us = latency.as_micros() as u64,
                    "gpu work completed"
                );
                let mut st = stats.lock();
                st.frames_completed += 1;
                st.last_completed = Some(entry.frame);
            }
            status => {
                tracing::warn!(
                    frame = %entry.frame,
                    ?status,
                    "completion tracer gave up waiting on fence"
                );
                stats.lock().timeouts += 1;
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sync/tracer.rs"]
mod tests;
