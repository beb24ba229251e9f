//! Transformation parameters supplied per request.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Boolean feature flags that decide which filters end up in a plan.
///
/// Field names serialize in camelCase (`randomCuts`, `audioMix`, ...) so a
/// request body from an HTTP front end deserializes directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeatureToggles {
    pub watermark: bool,
    pub filters: bool,
    pub aspect: bool,
    pub random_cuts: bool,
    pub audio_mix: bool,
    pub ai_detection: bool,
    pub auto_edit: bool,
    pub content_analysis: bool,
}

impl FeatureToggles {
    /// Whether any of the analysis-style toggles is set. These all trigger
    /// the same crop/hue variation (and enable random cuts).
    pub fn any_analysis(&self) -> bool {
        self.ai_detection || self.auto_edit || self.content_analysis
    }
}

/// Speed, pitch, and feature toggles for one transformation job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformParams {
    /// Playback speed multiplier. Must be finite and `> 0`.
    pub speed: f64,
    /// Pitch multiplier applied to the audio sample rate. Must be finite and `> 0`.
    pub pitch: f64,
    #[serde(flatten)]
    pub toggles: FeatureToggles,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 1.0,
            toggles: FeatureToggles::default(),
        }
    }
}

impl TransformParams {
    /// Create params with the given speed and pitch and every toggle off.
    pub fn new(speed: f64, pitch: f64) -> Self {
        Self {
            speed,
            pitch,
            toggles: FeatureToggles::default(),
        }
    }

    /// Builder-style toggle setter.
    pub fn with_toggles(mut self, toggles: FeatureToggles) -> Self {
        self.toggles = toggles;
        self
    }

    /// Reject values that would produce a division by zero or an undefined
    /// filter expression.
    pub fn validate(&self) -> Result<()> {
        check_positive("speed", self.speed)?;
        check_positive("pitch", self.pitch)?;
        // The video filter uses 1/speed; subnormal speeds overflow it.
        if !(1.0 / self.speed).is_finite() {
            return Err(Error::invalid_parameter(format!(
                "speed {} is too small; 1/speed is not a finite number",
                self.speed
            )));
        }
        Ok(())
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::invalid_parameter(format!(
            "{name} must be a finite number > 0, got {value}"
        )));
    }
    Ok(())
}
