use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::engine::render_engine::EngineInner;
use crate::foundation::core::{BufferId, ExternalBuffer};
use crate::foundation::error::{EngineError, EngineResult};

/// Completion handle for a request queued on the image manager.
///
/// Dropping it without waiting is fine; the request still runs.
#[derive(Debug)]
pub struct Barrier {
    rx: mpsc::Receiver<EngineResult<()>>,
}

impl Barrier {
    fn ready(result: EngineResult<()>) -> Self {
        let (tx, rx) = mpsc::sync_channel(1);
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block until the request has been applied and return its result.
    pub fn wait(self) -> EngineResult<()> {
        self.rx
            .recv()
            .unwrap_or_else(|_| Err(EngineError::validation("image manager dropped the request")))
    }

    /// Like [`Barrier::wait`] but gives up after `timeout`, returning `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<EngineResult<()>> {
        match self.rx.recv_timeout(timeout) {
            Ok(res) => Some(res),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(Err(EngineError::validation(
                "image manager dropped the request",
            ))),
        }
    }
}

#[derive(Debug)]
enum ImageOp {
    Cache(ExternalBuffer),
    Unbind(BufferId),
}

struct Request {
    op: ImageOp,
    done: mpsc::SyncSender<EngineResult<()>>,
}

/// Worker that applies cache/uncache requests off the caller's thread.
///
/// Holds a reference to the engine internals; the engine owns the worker handle and shuts it down
/// before tearing down its contexts.
pub(crate) struct ImageManager {
    tx: Option<mpsc::Sender<Request>>,
    thread: Option<JoinHandle<()>>,
}

impl ImageManager {
    pub(crate) fn spawn(engine: Arc<EngineInner>) -> EngineResult<Self> {
        let (tx, rx) = mpsc::channel::<Request>();
        let thread = std::thread::Builder::new()
            .name("image-manager".to_string())
            .spawn(move || run(rx, &engine))
            .map_err(|e| {
                EngineError::Other(anyhow::Error::new(e).context("failed to spawn image manager"))
            })?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    pub(crate) fn cache(&self, buffer: ExternalBuffer) -> Barrier {
        self.submit(ImageOp::Cache(buffer))
    }

    pub(crate) fn unbind(&self, id: BufferId) -> Barrier {
        self.submit(ImageOp::Unbind(id))
    }

    fn submit(&self, op: ImageOp) -> Barrier {
        let Some(tx) = self.tx.as_ref() else {
            return Barrier::ready(Err(EngineError::validation("image manager is shut down")));
        };
        let (done, rx) = mpsc::sync_channel(1);
        if tx.send(Request { op, done }).is_err() {
            return Barrier::ready(Err(EngineError::validation("image manager has exited")));
        }
        Barrier { rx }
    }

    /// Apply every queued request, then stop the worker.
    pub(crate) fn shutdown(&mut self) {
        self.tx = None;
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("image manager thread panicked");
        }
    }
}

impl Drop for ImageManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(rx: mpsc::Receiver<Request>, engine: &EngineInner) {
    while let Ok(req) = rx.recv() {
        let res = match &req.op {
            ImageOp::Cache(buffer) => engine.bind_external_buffer(buffer),
            ImageOp::Unbind(id) => {
                engine.unbind_external_buffer(*id);
                Ok(())
            }
        };
        if let Err(e) = &res {
            tracing::warn!(op = ?req.op, error = %e, "image manager request failed");
        }
        let _ = req.done.send(res);
    }
}
