use super::*;
use crate::engine::settings::LayerSource;
use crate::foundation::core::BufferId;

const SCENE: &str = r#"{
  "display": { "width": 64, "height": 32 },
  "targets": [
    { "id": 100, "width": 64, "height": 32 },
    { "id": 101, "width": 64, "height": 32 }
  ],
  "frames": [
    { "layers": [
      { "color": [0.0, 0.0, 1.0, 1.0] },
      { "buffer": { "id": 1, "width": 16, "height": 16 },
        "bounds": { "x0": 0.0, "y0": 0.0, "x1": 16.0, "y1": 16.0 },
        "alpha": 0.5 }
    ] }
  ]
}"#;

#[test]
fn parses_and_cycles_targets() {
    let scene = Scene::from_json_str(SCENE).unwrap();
    assert_eq!(scene.target(0).unwrap().id, BufferId(100));
    assert_eq!(scene.target(1).unwrap().id, BufferId(101));
    assert_eq!(scene.target(2).unwrap().id, BufferId(100));

    let layers = scene.layers(5).unwrap();
    assert_eq!(layers.len(), 2);
    assert!(matches!(layers[0].source, LayerSource::Solid(_)));
    assert_eq!(layers[0].bounds, Rect::new(0.0, 0.0, 64.0, 32.0));
    assert_eq!(layers[1].buffer_id(), Some(BufferId(1)));
    assert_eq!(layers[1].alpha, 0.5);
}

#[test]
fn display_settings_follow_protection_flag() {
    let mut scene = Scene::from_json_str(SCENE).unwrap();
    assert!(!scene.display_settings().protected_output);
    scene.display.protected = true;
    let display = scene.display_settings();
    assert!(display.protected_output);
    assert_eq!(display.physical_display, Rect::new(0.0, 0.0, 64.0, 32.0));
}

#[test]
fn layer_needs_exactly_one_source() {
    let both = SCENE.replace(
        r#"{ "color": [0.0, 0.0, 1.0, 1.0] }"#,
        r#"{ "color": [0.0, 0.0, 1.0, 1.0], "buffer": { "id": 2, "width": 1, "height": 1 } }"#,
    );
    assert!(Scene::from_json_str(&both).is_err());

    let none = SCENE.replace(r#"{ "color": [0.0, 0.0, 1.0, 1.0] }"#, "{}");
    assert!(Scene::from_json_str(&none).is_err());
}

#[test]
fn rejects_empty_targets_and_unknown_fields() {
    let no_targets = r#"{ "display": { "width": 1, "height": 1 }, "targets": [], "frames": [{}] }"#;
    assert!(Scene::from_json_str(no_targets).is_err());

    let extra = r#"{ "display": { "width": 1, "height": 1, "hdr": true },
        "targets": [{ "id": 1, "width": 1, "height": 1 }], "frames": [{}] }"#;
    assert!(Scene::from_json_str(extra).is_err());
}

#[test]
fn from_path_reports_missing_file() {
    let err = Scene::from_path("/nonexistent/scene.json").unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn unvalidated_empty_scene_has_no_frames() {
    let mut scene = Scene::from_json_str(SCENE).unwrap();
    scene.targets.clear();
    scene.frames.clear();
    assert!(scene.target(3).is_none());
    assert!(scene.layers(3).is_none());
}
