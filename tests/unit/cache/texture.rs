use super::*;
use crate::foundation::core::ProtectionMode;
use crate::gpu::GpuDevice;
use crate::gpu::headless::HeadlessDevice;

fn buf(id: u64) -> ExternalBuffer {
    ExternalBuffer::new(BufferId(id), 16, 16)
}

fn setup() -> (HeadlessDevice, Box<dyn GpuContext>, ExternalTextureCache) {
    let dev = HeadlessDevice::default();
    let ctx = dev.create_context(ProtectionMode::Normal).unwrap();
    (dev, ctx, ExternalTextureCache::new())
}

#[test]
fn bind_then_unbind_tracks_membership() {
    let (_dev, mut ctx, mut cache) = setup();
    let out = cache.bind(ctx.as_mut(), &buf(1), 4096);
    assert!(out.result.is_ok());
    assert!(out.displaced.is_none());
    assert!(cache.lookup(BufferId(1)).is_some());

    let removed = cache.unbind(BufferId(1)).unwrap();
    assert_eq!(removed.buffer(), BufferId(1));
    assert!(cache.lookup(BufferId(1)).is_none());
    assert!(cache.unbind(BufferId(1)).is_none());
}

#[test]
fn rebind_displaces_exactly_one_image() {
    let (dev, mut ctx, mut cache) = setup();
    let first = cache.bind(ctx.as_mut(), &buf(1), 4096).result.unwrap();
    let out = cache.bind(ctx.as_mut(), &buf(1), 4096);
    let second = out.result.unwrap();

    assert_ne!(first, second);
    assert_eq!(out.displaced.map(|d| d.handle()), Some(first));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.lookup(BufferId(1)).map(|i| i.handle()), Some(second));
    // The cache hands the old image back instead of destroying it.
    assert!(dev.is_live(first));
}

#[test]
fn failed_rebind_leaves_no_entry() {
    let (dev, mut ctx, mut cache) = setup();
    let first = cache.bind(ctx.as_mut(), &buf(1), 4096).result.unwrap();
    dev.fail_imports_for(BufferId(1));

    let out = cache.bind(ctx.as_mut(), &buf(1), 4096);
    assert!(matches!(out.result, Err(BindError::ImportFailed { .. })));
    assert_eq!(out.displaced.map(|d| d.handle()), Some(first));
    assert!(cache.lookup(BufferId(1)).is_none());
}

#[test]
fn evict_stale_keeps_only_active_identities() {
    let (_dev, mut ctx, mut cache) = setup();
    for id in 1..=4 {
        cache.bind(ctx.as_mut(), &buf(id), 4096).result.unwrap();
    }
    let active: HashSet<BufferId> = [BufferId(2), BufferId(4), BufferId(99)].into();
    let mut evicted: Vec<BufferId> = cache
        .evict_stale(&active)
        .into_iter()
        .map(|i| i.buffer())
        .collect();
    evicted.sort();

    assert_eq!(evicted, vec![BufferId(1), BufferId(3)]);
    assert_eq!(cache.ids(), vec![BufferId(2), BufferId(4)]);
    assert!(cache.ids().iter().all(|id| active.contains(id)));
}

#[test]
fn mark_used_records_latest_frame() {
    let (_dev, mut ctx, mut cache) = setup();
    let h = cache.bind(ctx.as_mut(), &buf(1), 4096).result.unwrap();
    assert_eq!(cache.mark_used(BufferId(1), FrameSeq(3)), Some(h));
    assert_eq!(
        cache.lookup(BufferId(1)).and_then(|i| i.last_used()),
        Some(FrameSeq(3))
    );
    assert_eq!(cache.mark_used(BufferId(2), FrameSeq(3)), None);
}

#[test]
fn drain_empties_cache() {
    let (_dev, mut ctx, mut cache) = setup();
    cache.bind(ctx.as_mut(), &buf(1), 4096).result.unwrap();
    cache.bind(ctx.as_mut(), &buf(2), 4096).result.unwrap();
    assert_eq!(cache.drain().len(), 2);
    assert_eq!(cache.len(), 0);
}
