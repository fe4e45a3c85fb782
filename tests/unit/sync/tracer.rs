use super::*;
use crate::gpu::fence::ManualFence;

fn wait_for(tracer: &CompletionTracer, pred: impl Fn(&TracerStats) -> bool) -> TracerStats {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let stats = tracer.stats();
        if pred(&stats) || Instant::now() > deadline {
            return stats;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn observes_completion_in_order() {
    let tracer = CompletionTracer::spawn(Duration::from_secs(5)).unwrap();
    tracer.queue(FenceHandle::signaled(), FrameSeq(1));
    let f2 = ManualFence::new();
    tracer.queue(f2.handle(), FrameSeq(2));

    let stats = wait_for(&tracer, |s| s.frames_completed >= 1);
    assert_eq!(stats.frames_queued, 2);
    assert_eq!(stats.last_completed, Some(FrameSeq(1)));

    f2.signal();
    let stats = wait_for(&tracer, |s| s.frames_completed >= 2);
    assert_eq!(stats.frames_completed, 2);
    assert_eq!(stats.last_completed, Some(FrameSeq(2)));
}

#[test]
fn bounded_wait_counts_timeouts() {
    let tracer = CompletionTracer::spawn(Duration::from_millis(5)).unwrap();
    let never = ManualFence::new();
    tracer.queue(never.handle(), FrameSeq(1));
    let stats = wait_for(&tracer, |s| s.timeouts >= 1);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.frames_completed, 0);
}

#[test]
fn shutdown_joins_and_ignores_later_entries() {
    let mut tracer = CompletionTracer::spawn(Duration::from_millis(50)).unwrap();
    tracer.queue(FenceHandle::signaled(), FrameSeq(1));
    tracer.shutdown();
    let before = tracer.stats();
    tracer.queue(FenceHandle::signaled(), FrameSeq(2));
    assert_eq!(tracer.stats(), before);
    assert_eq!(before.frames_queued, 1);
    assert_eq!(before.frames_completed + before.abandoned, 1);
}
