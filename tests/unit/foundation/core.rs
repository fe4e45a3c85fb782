use super::*;

#[test]
fn frame_seq_starts_at_zero_and_saturates() {
    assert_eq!(FrameSeq::default(), FrameSeq(0));
    assert_eq!(FrameSeq(0).next(), FrameSeq(1));
    assert_eq!(FrameSeq(u64::MAX).next(), FrameSeq(u64::MAX));
}

#[test]
fn protection_mode_round_trips_flag() {
    assert_eq!(ProtectionMode::from_protected(true), ProtectionMode::Protected);
    assert_eq!(ProtectionMode::from_protected(false), ProtectionMode::Normal);
    assert!(ProtectionMode::Protected.is_protected());
    assert!(!ProtectionMode::default().is_protected());
}

#[test]
fn buffer_byte_len_uses_format() {
    let b = ExternalBuffer::new(BufferId(1), 16, 8);
    assert_eq!(b.byte_len(), 16 * 8 * 4);
    let b = b.with_format(PixelFormat::RgbaFp16);
    assert_eq!(b.byte_len(), 16 * 8 * 8);
    assert!(ExternalBuffer::new(BufferId(2), 1, 1).into_protected().protected);
}

#[test]
fn buffer_descriptor_defaults_when_parsed() {
    let b: ExternalBuffer =
        serde_json::from_str(r#"{ "id": 42, "width": 4, "height": 2 }"#).unwrap();
    assert_eq!(b.id, BufferId(42));
    assert_eq!(b.format, PixelFormat::Rgba8888);
    assert!(!b.protected);
}
