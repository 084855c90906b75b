//! Runtime tunables, loadable from JSON.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of simultaneous color attachments per pass.
pub const MAX_RENDER_TARGETS: usize = 8;

/// Parameters of the depth-source heuristic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthHeuristicConfig {
    /// Frames skipped between two selections.
    pub cooldown_frames: u32,
    /// Active frames within one cooldown window that force a reset to the
    /// default depth source.
    pub traffic_threshold: u32,
    /// Relative tolerance when matching a candidate against the surface size.
    pub size_tolerance: f32,
    /// Base weight of the `vertices * (weight - draw_calls / total)` score.
    pub draw_call_weight: f32,
}

impl Default for DepthHeuristicConfig {
    fn default() -> Self {
        Self {
            cooldown_frames: 30,
            traffic_threshold: 10,
            size_tolerance: 0.05,
            draw_call_weight: 1.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub depth: DepthHeuristicConfig,
    pub max_render_targets: usize,
    /// Run every generated stage through naga's GLSL front-end when the
    /// headless device links a program.
    pub validate_glsl: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            depth: DepthHeuristicConfig::default(),
            max_render_targets: MAX_RENDER_TARGETS,
            validate_glsl: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("invalid runtime config json")?;
        if config.max_render_targets == 0 || config.max_render_targets > MAX_RENDER_TARGETS {
            anyhow::bail!(
                "max_render_targets must be within 1..={MAX_RENDER_TARGETS}, got {}",
                config.max_render_targets
            );
        }
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("while loading {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_yields_defaults() {
        let config = RuntimeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.depth.cooldown_frames, 30);
        assert_eq!(config.depth.traffic_threshold, 10);
    }

    #[test]
    fn test_partial_override() {
        let config =
            RuntimeConfig::from_json_str(r#"{ "depth": { "cooldown_frames": 5 } }"#).unwrap();
        assert_eq!(config.depth.cooldown_frames, 5);
        assert!((config.depth.draw_call_weight - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_out_of_range_target_count() {
        let err = RuntimeConfig::from_json_str(r#"{ "max_render_targets": 9 }"#).unwrap_err();
        assert!(err.to_string().contains("max_render_targets"));
    }
}
