use std::fmt;

use crate::foundation::core::{BufferId, FrameSeq, ProtectionMode};
use crate::foundation::error::{EngineError, EngineResult};
use crate::gpu::DeviceCaps;
use crate::sync::tracer::TracerStats;

/// Point-in-time snapshot of engine state, for debugging and the CLI's `--json` output.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct EngineDump {
    /// Currently active context.
    pub active_mode: ProtectionMode,
    /// Whether a protected context exists.
    pub protected_supported: bool,
    /// Whether the engine has been poisoned by context loss.
    pub lost: bool,
    /// Name of the selected cleanup strategy.
    pub cleanup_strategy: String,
    /// Frames successfully submitted.
    pub frames_drawn: u64,
    /// Most recent submission sequence number.
    pub last_issued: FrameSeq,
    /// Completion watermark.
    pub last_completed: FrameSeq,
    /// Submissions with an unsignaled fence.
    pub in_flight: usize,
    /// Buffer identities with a cached texture, sorted.
    pub cached_textures: Vec<BufferId>,
    /// Output cache capacity.
    pub output_cache_capacity: usize,
    /// Output cache contents, oldest first.
    pub cached_outputs: Vec<BufferId>,
    /// Images awaiting deferred destruction.
    pub pending_destructions: usize,
    /// Completion tracer counters, when tracing is enabled.
    pub tracer: Option<TracerStats>,
    /// Device capabilities.
    pub caps: DeviceCaps,
}

impl EngineDump {
    /// Pretty-printed JSON form.
    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Other(anyhow::Error::new(e).context("serializing engine dump")))
    }
}

fn id_list(ids: &[BufferId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for EngineDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "RenderEngine ({} context, protected {}, {})",
            self.active_mode,
            if self.protected_supported {
                "available"
            } else {
                "unavailable"
            },
            self.cleanup_strategy,
        )?;
        if self.lost {
            writeln!(f, "  CONTEXT LOST")?;
        }
        writeln!(
            f,
            "  frames: {} drawn, last issued {}, completed {}, {} in flight",
            self.frames_drawn, self.last_issued, self.last_completed, self.in_flight
        )?;
        writeln!(
            f,
            "  texture cache: {} [{}]",
            self.cached_textures.len(),
            id_list(&self.cached_textures)
        )?;
        writeln!(
            f,
            "  output cache: {}/{} [{}]",
            self.cached_outputs.len(),
            self.output_cache_capacity,
            id_list(&self.cached_outputs)
        )?;
        writeln!(f, "  pending destructions: {}", self.pending_destructions)?;
        if let Some(t) = &self.tracer {
            writeln!(
                f,
                "  tracer: {} queued, {} completed, {} timeouts, {} abandoned",
                t.frames_queued, t.frames_completed, t.timeouts, t.abandoned
            )?;
        }
        write!(
            f,
            "  limits: max texture {}, max viewport {}x{}",
            self.caps.max_texture_size, self.caps.max_viewport_dims[0], self.caps.max_viewport_dims[1]
        )
    }
}
