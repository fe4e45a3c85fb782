use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use kurbo::Rect;

use crate::engine::settings::{DisplaySettings, LayerSettings};
use crate::foundation::core::ExternalBuffer;
use crate::foundation::error::{EngineError, EngineResult};

/// A scripted sequence of frames: destination buffers plus per-frame layer stacks.
///
/// Frames and targets are both used round-robin, so a two-frame scene can drive any number of
/// simulated frames.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scene {
    /// Display the frames are composed for.
    pub display: SceneDisplay,
    /// Destination buffers, cycled one per frame.
    pub targets: Vec<ExternalBuffer>,
    /// Layer stacks, cycled one per frame.
    pub frames: Vec<SceneFrame>,
}

/// Display size and output protection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneDisplay {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Compose on the secure display path.
    #[serde(default)]
    pub protected: bool,
}

/// Layers of one frame, bottom to top.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneFrame {
    /// Layer stack.
    #[serde(default)]
    pub layers: Vec<SceneLayer>,
}

/// One layer: either a buffer or a solid color.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneLayer {
    /// Buffer to sample.
    #[serde(default)]
    pub buffer: Option<ExternalBuffer>,
    /// Solid fill color (premultiplied RGBA).
    #[serde(default)]
    pub color: Option<[f32; 4]>,
    /// Layer bounds; the whole display when absent.
    #[serde(default)]
    pub bounds: Option<Rect>,
    /// Plane alpha.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

fn default_alpha() -> f32 {
    1.0
}

impl Scene {
    /// Parse and validate a scene from JSON.
    pub fn from_json_str(s: &str) -> EngineResult<Self> {
        let scene: Self = serde_json::from_str(s)
            .map_err(|e| EngineError::validation(format!("invalid scene JSON: {e}")))?;
        scene.validate()?;
        Ok(scene)
    }

    /// Parse and validate a scene from a reader.
    pub fn from_reader(r: impl Read) -> EngineResult<Self> {
        let scene: Self = serde_json::from_reader(r)
            .map_err(|e| EngineError::validation(format!("invalid scene JSON: {e}")))?;
        scene.validate()?;
        Ok(scene)
    }

    /// Read a scene file.
    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            EngineError::validation(format!("open scene JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Check structural constraints serde cannot express.
    pub fn validate(&self) -> EngineResult<()> {
        if self.display.width == 0 || self.display.height == 0 {
            return Err(EngineError::validation("display size must be non-zero"));
        }
        if self.targets.is_empty() {
            return Err(EngineError::validation("scene needs at least one target"));
        }
        if self.frames.is_empty() {
            return Err(EngineError::validation("scene needs at least one frame"));
        }
        for (fi, frame) in self.frames.iter().enumerate() {
            for (li, layer) in frame.layers.iter().enumerate() {
                if layer.buffer.is_some() == layer.color.is_some() {
                    return Err(EngineError::validation(format!(
                        "frame {fi} layer {li}: exactly one of 'buffer' or 'color' is required"
                    )));
                }
                if !(0.0..=1.0).contains(&layer.alpha) {
                    return Err(EngineError::validation(format!(
                        "frame {fi} layer {li}: alpha must be in [0, 1]"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Display settings shared by every frame.
    pub fn display_settings(&self) -> DisplaySettings {
        let mut display = DisplaySettings::new(self.display.width, self.display.height);
        display.protected_output = self.display.protected;
        display
    }

    /// Destination buffer for simulated frame `index`, or `None` when there are no targets.
    pub fn target(&self, index: usize) -> Option<&ExternalBuffer> {
        self.targets.get(index.checked_rem(self.targets.len())?)
    }

    /// Layer stack for simulated frame `index`, or `None` when there are no frames.
    pub fn layers(&self, index: usize) -> Option<Vec<LayerSettings>> {
        let frame = self.frames.get(index.checked_rem(self.frames.len())?)?;
        let full = Rect::new(
            0.0,
            0.0,
            f64::from(self.display.width),
            f64::from(self.display.height),
        );
        let layers = frame
            .layers
            .iter()
            .map(|l| {
                let bounds = l.bounds.unwrap_or(full);
                let mut layer = match (&l.buffer, l.color) {
                    (Some(buffer), _) => LayerSettings::buffer(buffer.clone(), bounds),
                    (None, color) => LayerSettings::solid(color.unwrap_or_default(), bounds),
                };
                layer.alpha = l.alpha;
                layer
            })
            .collect();
        Some(layers)
    }
}

#[cfg(test)]
#[path = "../tests/unit/scene.rs"]
mod tests;
