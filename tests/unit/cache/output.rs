use super::*;
use crate::cache::binder::ImageKind;

fn image(id: u64, mode: ProtectionMode) -> GpuImage {
    GpuImage::new(ImageHandle(id * 100), BufferId(id), mode, ImageKind::Output)
}

fn insert(cache: &mut OutputImageCache, id: u64) -> Vec<BufferId> {
    let mut evicted = Vec::new();
    cache
        .get_or_create(
            BufferId(id),
            ProtectionMode::Normal,
            || Ok(image(id, ProtectionMode::Normal)),
            &mut evicted,
        )
        .unwrap();
    evicted.iter().map(|e| e.buffer()).collect()
}

#[test]
fn capacity_two_evicts_in_insertion_order() {
    let mut cache = OutputImageCache::new(2);
    assert!(insert(&mut cache, 0xA).is_empty());
    assert!(insert(&mut cache, 0xB).is_empty());
    assert_eq!(insert(&mut cache, 0xC), vec![BufferId(0xA)]);
    assert_eq!(cache.ids(), vec![BufferId(0xB), BufferId(0xC)]);

    assert_eq!(insert(&mut cache, 0xD), vec![BufferId(0xB)]);
    assert_eq!(cache.ids(), vec![BufferId(0xC), BufferId(0xD)]);
}

#[test]
fn hits_do_not_refresh_position() {
    let mut cache = OutputImageCache::new(2);
    insert(&mut cache, 1);
    insert(&mut cache, 2);

    // Reusing 1 must not protect it: strict FIFO.
    let mut evicted = Vec::new();
    let slot = cache
        .get_or_create(
            BufferId(1),
            ProtectionMode::Normal,
            || panic!("hit must not create"),
            &mut evicted,
        )
        .unwrap();
    assert!(matches!(slot, OutputSlot::Cached(ImageHandle(100))));

    assert_eq!(insert(&mut cache, 3), vec![BufferId(1)]);
}

#[test]
fn size_never_exceeds_capacity() {
    let mut cache = OutputImageCache::new(3);
    for id in [1, 2, 1, 3, 4, 2, 5, 6, 6, 7] {
        insert(&mut cache, id);
        assert!(cache.ids().len() <= cache.capacity());
    }
}

#[test]
fn zero_capacity_disables_caching() {
    let mut cache = OutputImageCache::new(0);
    let mut evicted = Vec::new();
    let slot = cache
        .get_or_create(
            BufferId(1),
            ProtectionMode::Normal,
            || Ok(image(1, ProtectionMode::Normal)),
            &mut evicted,
        )
        .unwrap();
    assert!(matches!(slot, OutputSlot::Transient(_)));
    assert_eq!(cache.ids().len(), 0);
    assert!(!cache.contains(BufferId(1)));
    assert!(evicted.is_empty());
}

#[test]
fn entries_from_another_mode_are_replaced() {
    let mut cache = OutputImageCache::new(2);
    insert(&mut cache, 1);

    let mut evicted = Vec::new();
    let slot = cache
        .get_or_create(
            BufferId(1),
            ProtectionMode::Protected,
            || Ok(GpuImage::new(ImageHandle(7), BufferId(1), ProtectionMode::Protected, ImageKind::Output)),
            &mut evicted,
        )
        .unwrap();
    assert_eq!(slot.handle(), ImageHandle(7));
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].mode(), ProtectionMode::Normal);
    assert_eq!(cache.ids().len(), 1);
}

#[test]
fn invalidate_removes_entry() {
    let mut cache = OutputImageCache::new(4);
    insert(&mut cache, 1);
    insert(&mut cache, 2);
    assert_eq!(cache.invalidate(BufferId(1)).map(|i| i.buffer()), Some(BufferId(1)));
    assert!(cache.invalidate(BufferId(1)).is_none());
    assert_eq!(cache.ids(), vec![BufferId(2)]);
}

#[test]
fn failed_creation_leaves_cache_untouched() {
    let mut cache = OutputImageCache::new(1);
    insert(&mut cache, 1);
    let mut evicted = Vec::new();
    let res = cache.get_or_create(
        BufferId(2),
        ProtectionMode::Normal,
        || Err(crate::foundation::error::EngineError::ContextLost),
        &mut evicted,
    );
    assert!(res.is_err());
    assert!(evicted.is_empty());
    assert_eq!(cache.ids(), vec![BufferId(1)]);
}
