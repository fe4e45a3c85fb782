use super::*;
use crate::gpu::fence::ManualFence;

#[test]
fn nothing_submitted_is_complete() {
    let p = GpuProgress::new();
    assert!(p.is_complete(None));
    assert!(p.is_complete(Some(FrameSeq(0))));
    assert!(!p.is_complete(Some(FrameSeq(1))));
}

#[test]
fn watermark_stops_at_oldest_pending_fence() {
    let mut p = GpuProgress::new();
    let f1 = ManualFence::new();
    let f2 = ManualFence::new();

    let s1 = p.begin();
    p.submitted(s1, Some(f1.handle()));
    let s2 = p.begin();
    p.submitted(s2, Some(f2.handle()));
    assert_eq!((s1, s2), (FrameSeq(1), FrameSeq(2)));

    p.poll();
    assert_eq!(p.completed(), FrameSeq(0));
    assert_eq!(p.in_flight(), 2);

    // Out-of-order signal does not advance past the pending head.
    f2.signal();
    p.poll();
    assert_eq!(p.completed(), FrameSeq(0));

    f1.signal();
    p.poll();
    assert_eq!(p.completed(), FrameSeq(2));
    assert_eq!(p.in_flight(), 0);
    assert!(p.last_fence().is_none());
}

#[test]
fn frame_being_recorded_is_never_complete() {
    let mut p = GpuProgress::new();
    let s1 = p.begin();
    p.submitted(s1, None);
    let s2 = p.begin();
    p.poll();
    assert!(p.is_complete(Some(s1)));
    assert!(!p.is_complete(Some(s2)));

    p.abandon();
    p.poll();
    assert!(p.is_complete(Some(s2)));
}

#[test]
fn errored_fence_counts_as_completed() {
    let mut p = GpuProgress::new();
    let f = ManualFence::new();
    let s = p.begin();
    p.submitted(s, Some(f.handle()));
    f.fail();
    p.poll();
    assert!(p.is_complete(Some(s)));
}

#[test]
fn mark_idle_clears_in_flight() {
    let mut p = GpuProgress::new();
    let f = ManualFence::new();
    let s = p.begin();
    p.submitted(s, Some(f.handle()));
    p.mark_idle();
    assert_eq!(p.in_flight(), 0);
    assert!(p.is_complete(Some(s)));
}

#[test]
fn submission_resets_prior_cleaned() {
    let mut p = GpuProgress::new();
    assert!(p.prior_resources_cleaned());
    let s = p.begin();
    p.submitted(s, None);
    assert!(!p.prior_resources_cleaned());
    p.set_prior_resources_cleaned();
    assert!(p.prior_resources_cleaned());
}

#[test]
fn wait_fence_reports_timeout() {
    let f = ManualFence::new();
    assert!(!wait_fence(&f.handle(), Duration::from_millis(5)));
    f.signal();
    assert!(wait_fence(&f.handle(), Duration::from_millis(5)));

    let bad = ManualFence::new();
    bad.fail();
    assert!(!wait_fence(&bad.handle(), Duration::from_millis(5)));
}
