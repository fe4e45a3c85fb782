use super::*;
use crate::cache::binder::{ImageKind, bind_image};
use crate::foundation::core::{BufferId, ExternalBuffer, ProtectionMode};
use crate::gpu::headless::{HeadlessDevice, HeadlessOpts};

fn manual_device() -> HeadlessDevice {
    HeadlessDevice::new(HeadlessOpts {
        auto_signal: false,
        ..HeadlessOpts::default()
    })
}

fn import(contexts: &mut ContextManager, id: u64) -> GpuImage {
    let buf = ExternalBuffer::new(BufferId(id), 8, 8);
    bind_image(contexts.active(), &buf, 4096).unwrap()
}

#[test]
fn strategy_follows_native_fence_support() {
    let caps = DeviceCaps {
        native_fences: true,
        protected_content: false,
        max_texture_size: 1,
        max_viewport_dims: [1, 1],
    };
    assert_eq!(select_strategy(&caps).name(), "fence_gated");
    let caps = DeviceCaps {
        native_fences: false,
        ..caps
    };
    assert_eq!(select_strategy(&caps).name(), "blocking_finish");
}

#[test]
fn retire_waits_for_last_use() {
    let dev = manual_device();
    let mut contexts = ContextManager::new(&dev, false).unwrap();
    let mut progress = GpuProgress::new();
    let mut strategy = FenceGated;
    let mut retired = RetireQueue::new();

    let mut image = import(&mut contexts, 1);
    assert_eq!(image.kind(), ImageKind::Texture);
    let frame = progress.begin();
    image.mark_used(frame);
    strategy
        .submit(contexts.active(), &mut progress, frame)
        .unwrap();

    let handle = image.handle();
    retired.retire(image, &progress, &mut contexts);
    assert_eq!(retired.len(), 1);
    assert!(dev.is_live(handle));

    // Still running: no release.
    assert!(!strategy.cleanup(contexts.active(), &mut progress).unwrap());
    assert_eq!(retired.collect(&progress, &mut contexts), 0);

    assert!(dev.signal_next());
    assert!(strategy.cleanup(contexts.active(), &mut progress).unwrap());
    assert_eq!(retired.collect(&progress, &mut contexts), 1);
    assert!(!dev.is_live(handle));

    // Already released for this frame.
    assert!(!strategy.cleanup(contexts.active(), &mut progress).unwrap());
}

#[test]
fn unused_image_is_destroyed_at_once() {
    let dev = manual_device();
    let mut contexts = ContextManager::new(&dev, false).unwrap();
    let progress = GpuProgress::new();
    let mut retired = RetireQueue::new();

    let image = import(&mut contexts, 2);
    let handle = image.handle();
    retired.retire(image, &progress, &mut contexts);
    assert_eq!(retired.len(), 0);
    assert!(!dev.is_live(handle));
}

#[test]
fn blocking_finish_drains_on_submit() {
    let dev = HeadlessDevice::new(HeadlessOpts {
        native_fences: false,
        ..HeadlessOpts::default()
    });
    let mut contexts = ContextManager::new(&dev, false).unwrap();
    let mut progress = GpuProgress::new();
    let mut strategy = BlockingFinish;

    let frame = progress.begin();
    let fence = strategy
        .submit(contexts.active(), &mut progress, frame)
        .unwrap();
    assert!(fence.is_signaled());
    assert!(progress.is_complete(Some(frame)));
    assert_eq!(dev.finishes(), 1);

    assert!(strategy.cleanup(contexts.active(), &mut progress).unwrap());
    assert!(!strategy.cleanup(contexts.active(), &mut progress).unwrap());
    assert_eq!(dev.finishes(), 1);
}

#[test]
fn fence_gated_falls_back_to_finish_without_fence() {
    let dev = HeadlessDevice::new(HeadlessOpts {
        native_fences: false,
        ..HeadlessOpts::default()
    });
    let mut contexts = ContextManager::new(&dev, false).unwrap();
    let mut progress = GpuProgress::new();
    let frame = progress.begin();
    let fence = FenceGated
        .submit(contexts.active(), &mut progress, frame)
        .unwrap();
    assert!(fence.is_signaled());
    assert_eq!(dev.finishes(), 1);
}

#[test]
fn lost_context_fails_submit() {
    let dev = HeadlessDevice::default();
    let mut contexts = ContextManager::new(&dev, false).unwrap();
    let mut progress = GpuProgress::new();
    dev.lose_context();
    let frame = progress.begin();
    let err = FenceGated
        .submit(contexts.active(), &mut progress, frame)
        .unwrap_err();
    assert!(err.is_fatal());
    let err = BlockingFinish
        .submit(contexts.active(), &mut progress, frame)
        .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn destroy_all_empties_queue() {
    let dev = manual_device();
    let mut contexts = ContextManager::new(&dev, false).unwrap();
    let mut progress = GpuProgress::new();
    let mut retired = RetireQueue::new();

    let mut image = import(&mut contexts, 3);
    let frame = progress.begin();
    image.mark_used(frame);
    retired.retire(image, &progress, &mut contexts);
    assert_eq!(retired.len(), 1);

    assert!(contexts.finish_all());
    retired.destroy_all(&mut contexts);
    assert_eq!(retired.len(), 0);
    assert_eq!(dev.live_images(), 0);
    assert!(dev.violations().is_empty());
}

#[test]
fn protected_images_go_back_to_their_context() {
    let dev = HeadlessDevice::default();
    let mut contexts = ContextManager::new(&dev, true).unwrap();
    contexts.activate(ProtectionMode::Protected);
    let image = import(&mut contexts, 4);
    assert_eq!(image.mode(), ProtectionMode::Protected);
    contexts.activate(ProtectionMode::Normal);

    let mut retired = RetireQueue::new();
    retired.retire(image, &GpuProgress::new(), &mut contexts);
    assert_eq!(dev.live_images(), 0);
    assert!(dev.violations().is_empty());
}
