// THEORY:
// Every tunable in the pipeline lives here and is injected into `process`
// on every tick. The pipeline modules hold no configuration of their own;
// the owner (GUI, config file, remote control surface) mutates one
// `PipelineConfig` value and the next frame picks it up. Serde derives make
// the whole structure round-trippable through JSON for persistence.
//
// Defaults match a freshly installed sensor head: filtering off, static
// threshold at zero (everything foreground until tuned), sending disabled.

use serde::{Deserialize, Serialize};

use crate::core_modules::background::BackgroundMode;
use crate::core_modules::blob_tracker::TrackerSettings;
use crate::core_modules::compositor::SlotPlacement;
use crate::emitter::EmitterConfig;
use crate::supervisor::FilterSettings;

/// Full per-tick configuration of the detection pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Gaussian blur radius applied to the composite; 0 disables.
    pub blur_radius: u32,
    /// Contrast curve exponent; 1.0 is identity.
    pub contrast_exp: f32,
    /// Contrast curve pre-exponent offset; 0.0 is identity.
    pub contrast_phase: f32,

    /// Use the learned running background instead of a static threshold.
    pub use_background_diff: bool,
    /// Background adaptation time, in frames.
    pub learning_time: f32,
    /// Binarization cutoff (static mode) or difference cutoff (running mode).
    pub threshold: u8,

    /// Erosion passes after thresholding.
    pub erosions: u32,
    /// Dilation passes after erosion.
    pub dilations: u32,

    /// Reject whole camera frames whose histogram spread reads as noise.
    pub noise_gate_enabled: bool,
    /// Histogram-spread cutoff below which a frame counts as noise.
    pub noise_gate_threshold: f64,

    /// Minimum tracked component area, in pixels.
    pub min_area: f32,
    /// Maximum tracked component area, in pixels.
    pub max_area: f32,
    /// Frames an unseen blob keeps its label.
    pub persistence: u32,
    /// Maximum per-frame centroid travel for identity matching, in pixels.
    pub max_distance: f32,

    /// Canvas placement of each camera slot.
    pub placements: Vec<SlotPlacement>,
    /// Shift the composite so its content starts at the origin.
    pub trim_canvas: bool,

    /// Detection zone corner sets, innermost first.
    pub zones: Vec<[(f32, f32); 4]>,

    /// Run the filter pass on the supervised worker thread.
    pub use_worker: bool,

    /// Outbound message policy.
    pub emitter: EmitterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur_radius: 1,
            contrast_exp: 1.0,
            contrast_phase: 0.0,
            use_background_diff: false,
            learning_time: 100.0,
            threshold: 0,
            erosions: 0,
            dilations: 0,
            noise_gate_enabled: false,
            noise_gate_threshold: 300.0,
            min_area: 0.0,
            max_area: 1000.0,
            persistence: 15,
            max_distance: 32.0,
            placements: Vec::new(),
            trim_canvas: false,
            zones: Vec::new(),
            use_worker: false,
            emitter: EmitterConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn background_mode(&self) -> BackgroundMode {
        if self.use_background_diff {
            BackgroundMode::RunningBackground
        } else {
            BackgroundMode::StaticThreshold
        }
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            min_area: self.min_area,
            max_area: self.max_area,
            persistence: self.persistence,
            max_distance: self.max_distance,
        }
    }

    pub fn filter_settings(&self) -> FilterSettings {
        FilterSettings {
            blur_radius: self.blur_radius,
            contrast_exp: self.contrast_exp,
            contrast_phase: self.contrast_phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_fresh_install() {
        let config = PipelineConfig::default();
        assert_eq!(config.blur_radius, 1);
        assert_eq!(config.threshold, 0);
        assert!(!config.use_background_diff);
        assert!(!config.noise_gate_enabled);
        assert!((config.noise_gate_threshold - 300.0).abs() < f64::EPSILON);
        assert_eq!(config.persistence, 15);
        assert!((config.max_distance - 32.0).abs() < f32::EPSILON);
        assert!(!config.emitter.send_enabled);
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = PipelineConfig::default();
        config.zones = vec![[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]];
        config.use_background_diff = true;

        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.zones.len(), 1);
        assert!(back.use_background_diff);
    }
}
