use super::*;
use crate::gpu::headless::{HeadlessDevice, HeadlessOpts};

#[test]
fn protected_context_is_opt_in() {
    let dev = HeadlessDevice::default();
    let mgr = ContextManager::new(&dev, false).unwrap();
    assert!(!mgr.supports_protected());

    let mgr = ContextManager::new(&dev, true).unwrap();
    assert!(mgr.supports_protected());
}

#[test]
fn activation_without_protected_support_stays_normal() {
    let dev = HeadlessDevice::new(HeadlessOpts {
        protected_content: false,
        ..HeadlessOpts::default()
    });
    let mut mgr = ContextManager::new(&dev, true).unwrap();
    assert!(!mgr.supports_protected());
    assert_eq!(mgr.activate(ProtectionMode::Protected), ProtectionMode::Normal);
    assert_eq!(mgr.active().mode(), ProtectionMode::Normal);
    assert!(mgr.get_mut(ProtectionMode::Protected).is_none());
}

#[test]
fn activation_selects_matching_context() {
    let dev = HeadlessDevice::default();
    let mut mgr = ContextManager::new(&dev, true).unwrap();
    assert_eq!(mgr.activate(ProtectionMode::Protected), ProtectionMode::Protected);
    assert_eq!(mgr.active().mode(), ProtectionMode::Protected);
    assert_eq!(mgr.activate(ProtectionMode::Normal), ProtectionMode::Normal);
    assert_eq!(mgr.active().mode(), ProtectionMode::Normal);
}

#[test]
fn finish_all_reports_lost_device() {
    let dev = HeadlessDevice::default();
    let mut mgr = ContextManager::new(&dev, true).unwrap();
    assert!(mgr.finish_all());
    dev.lose_context();
    assert!(!mgr.finish_all());
}
