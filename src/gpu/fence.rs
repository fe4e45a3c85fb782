use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Observed state of a fence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FenceStatus {
    /// All work guarded by the fence has completed.
    Signaled,
    /// Work is still in flight.
    Pending,
    /// The fence can no longer signal (device fault or foreign fence error).
    Error,
}

/// Backend synchronization primitive behind a [`FenceHandle`].
pub trait GpuFence: Send + Sync + fmt::Debug {
    /// Non-blocking status query.
    fn status(&self) -> FenceStatus;

    /// Block until the fence leaves `Pending` or `timeout` elapses. `None` waits forever.
    fn wait(&self, timeout: Option<Duration>) -> FenceStatus;
}

/// Opaque token meaning "GPU work up to this point has completed".
///
/// Cloning duplicates the handle (like `dup` on a sync fd); the backend fence is released exactly
/// once, when the last clone is dropped.
#[derive(Clone, Debug)]
pub struct FenceHandle(Arc<dyn GpuFence>);

impl FenceHandle {
    /// Wrap a backend fence.
    pub fn new(fence: impl GpuFence + 'static) -> Self {
        Self(Arc::new(fence))
    }

    /// Wrap a shared backend fence, e.g. one the caller also keeps to signal it.
    pub fn from_arc(fence: Arc<dyn GpuFence>) -> Self {
        Self(fence)
    }

    /// A fence that is already signaled.
    ///
    /// Returned by flushes on devices without native fences, after the engine has blocked until
    /// the GPU was idle.
    pub fn signaled() -> Self {
        Self::new(SignaledFence)
    }

    /// Non-blocking status query.
    pub fn status(&self) -> FenceStatus {
        self.0.status()
    }

    /// Return `true` once the fence has signaled.
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Block up to `timeout` (forever when `None`).
    pub fn wait(&self, timeout: Option<Duration>) -> FenceStatus {
        self.0.wait(timeout)
    }

    /// Return `true` when both handles refer to the same backend fence.
    pub fn same_fence(&self, other: &FenceHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug)]
struct SignaledFence;

impl GpuFence for SignaledFence {
    fn status(&self) -> FenceStatus {
        FenceStatus::Signaled
    }

    fn wait(&self, _timeout: Option<Duration>) -> FenceStatus {
        FenceStatus::Signaled
    }
}

/// CPU-signaled fence.
///
/// Used by the headless backend for its submissions and by callers that need to hand the engine an
/// input or acquire fence they control.
#[derive(Debug)]
pub struct ManualFence {
    state: Mutex<FenceStatus>,
    cv: Condvar,
}

impl ManualFence {
    /// Create an unsignaled fence.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FenceStatus::Pending),
            cv: Condvar::new(),
        })
    }

    /// Mark the fence signaled and wake all waiters.
    pub fn signal(&self) {
        self.set(FenceStatus::Signaled);
    }

    /// Mark the fence as broken and wake all waiters.
    pub fn fail(&self) {
        self.set(FenceStatus::Error);
    }

    /// A [`FenceHandle`] sharing this fence.
    pub fn handle(self: &Arc<Self>) -> FenceHandle {
        FenceHandle::from_arc(self.clone())
    }

    fn set(&self, status: FenceStatus) {
        let mut state = self.state.lock();
        if *state == FenceStatus::Pending {
            *state = status;
        }
        self.cv.notify_all();
    }
}

impl GpuFence for ManualFence {
    fn status(&self) -> FenceStatus {
        *self.state.lock()
    }

    fn wait(&self, timeout: Option<Duration>) -> FenceStatus {
        let mut state = self.state.lock();
        match timeout {
            None => {
                while *state == FenceStatus::Pending {
                    self.cv.wait(&mut state);
                }
            }
            Some(t) => {
                let deadline = Instant::now() + t;
                while *state == FenceStatus::Pending {
                    if self.cv.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        *state
    }
}

#[cfg(test)]
#[path = "../../tests/unit/gpu/fence.rs"]
mod tests;
