use super::*;

#[test]
fn signaled_fence_never_blocks() {
    let f = FenceHandle::signaled();
    assert!(f.is_signaled());
    assert_eq!(f.wait(None), FenceStatus::Signaled);
}

#[test]
fn manual_fence_times_out_then_signals() {
    let fence = ManualFence::new();
    let h = fence.handle();
    assert_eq!(h.status(), FenceStatus::Pending);
    assert_eq!(
        h.wait(Some(Duration::from_millis(5))),
        FenceStatus::Pending
    );

    fence.signal();
    assert!(h.is_signaled());
    assert_eq!(h.wait(Some(Duration::from_millis(5))), FenceStatus::Signaled);
}

#[test]
fn manual_fence_wakes_waiter_on_other_thread() {
    let fence = ManualFence::new();
    let h = fence.handle();
    let waiter = std::thread::spawn(move || h.wait(None));
    std::thread::sleep(Duration::from_millis(10));
    fence.signal();
    assert_eq!(waiter.join().unwrap(), FenceStatus::Signaled);
}

#[test]
fn signal_after_failure_keeps_error() {
    let fence = ManualFence::new();
    fence.fail();
    fence.signal();
    assert_eq!(fence.handle().status(), FenceStatus::Error);
}

#[test]
fn clones_share_the_backend_fence() {
    let fence = ManualFence::new();
    let a = fence.handle();
    let b = a.clone();
    assert!(a.same_fence(&b));
    assert!(!a.same_fence(&FenceHandle::signaled()));
    drop(a);
    drop(b);
    assert_eq!(std::sync::Arc::strong_count(&fence), 1);
}
