use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::shape::Shape;
use crate::error::{LipsyncError, Result};

/// Shapes the heuristics tend to miss; a low `phoneme_bias` boosts them.
const UNDER_DETECTED: [Shape; 5] = [Shape::Aa, Shape::Uh, Shape::Oh, Shape::L, Shape::R];
/// Shapes the heuristics tend to over-select; a high `phoneme_bias` boosts them.
const OVER_DETECTED: [Shape; 3] = [Shape::S, Shape::Ee, Shape::D];

/// User-tunable weights applied on every classification call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfiguration {
    /// Per-shape multiplier; shapes not listed weigh 1.0.
    pub shapes: BTreeMap<Shape, f32>,
    /// 0.0-1.0, 0.5 is neutral.
    pub phoneme_bias: f32,
    /// Extra frames a shape is held before it may change.
    pub hold_pause: u32,
    /// Feature smoothing radius; also widens the hold window.
    pub smoothing: u32,
}

impl Default for BiasConfiguration {
    fn default() -> Self {
        Self {
            shapes: BTreeMap::new(),
            phoneme_bias: 0.5,
            hold_pause: 5,
            smoothing: 3,
        }
    }
}

impl BiasConfiguration {
    pub fn with_shape(mut self, shape: Shape, multiplier: f32) -> Self {
        self.shapes.insert(shape, multiplier);
        self
    }

    /// Sets every classifiable shape to the same multiplier.
    pub fn with_all_shapes(mut self, multiplier: f32) -> Self {
        for shape in Shape::ALL {
            self.shapes.insert(shape, multiplier);
        }
        self
    }

    pub fn multiplier(&self, shape: Shape) -> f32 {
        self.shapes.get(&shape).copied().unwrap_or(1.0)
    }

    /// Global tilt from `phoneme_bias`, 1.0 at the neutral setting.
    pub fn phoneme_factor(&self, shape: Shape) -> f32 {
        let tilt = self.phoneme_bias - 0.5;
        if UNDER_DETECTED.contains(&shape) {
            1.0 - tilt
        } else if OVER_DETECTED.contains(&shape) {
            1.0 + tilt
        } else {
            1.0
        }
    }

    /// Frames a newly chosen shape is held unconditionally.
    pub fn min_hold_frames(&self) -> u32 {
        (self.hold_pause + self.smoothing / 2).max(2)
    }

    /// Frames after which a held shape is always re-evaluated.
    pub fn max_hold_frames(&self) -> u32 {
        (self.hold_pause * 2 + self.smoothing).max(6)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.phoneme_bias) {
            return Err(LipsyncError::Input(format!(
                "phoneme_bias must be within 0.0-1.0, got {}",
                self.phoneme_bias
            )));
        }
        for (shape, value) in &self.shapes {
            if !value.is_finite() || *value < 0.0 {
                return Err(LipsyncError::Input(format!(
                    "bias for {} must be a non-negative number, got {}",
                    shape, value
                )));
            }
        }
        Ok(())
    }
}
