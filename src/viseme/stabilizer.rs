use rand::Rng;

use super::bias::BiasConfiguration;
use super::catalog::{ShapeCatalog, ShapeChoice};
use super::classifier::ShapeClassifier;
use crate::audio::{FeatureFrame, TrackStats};

/// Quiet frames that may extend a hold before the shape is re-evaluated.
const MAX_SILENCE_RUN: u32 = 4;
const QUIET_ENERGY: f32 = 0.05;
const QUIET_VOLUME: f32 = 0.06;
const STABLE_DYNAMICS: f32 = 0.04;

/// How the stabilizer arrived at a frame's shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HoldState {
    /// No previous shape yet.
    Idle,
    /// Inside the minimum hold; the previous shape is forced.
    Holding,
    /// Past the minimum hold, kept because the audio is steady.
    Stable,
    /// The classifier was asked again.
    Reclassify,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StabilizerState {
    pub previous: Option<ShapeChoice>,
    pub frames_held: u32,
    pub silence_run: u32,
    pub min_hold: u32,
    pub max_hold: u32,
}

/// Wraps a [`ShapeClassifier`] and stops shapes from flickering frame to frame.
///
/// State is per run; call [`TemporalStabilizer::reset`] before reusing it.
#[derive(Debug, Default)]
pub struct TemporalStabilizer {
    state: StabilizerState,
}

impl TemporalStabilizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.state = StabilizerState::default();
    }

    pub fn state(&self) -> &StabilizerState {
        &self.state
    }

    /// Shape for the next frame. Frames must be fed in order.
    ///
    /// The hold window is taken from `bias` on every call, so a changed
    /// configuration applies from the next frame on.
    pub fn next<R: Rng>(
        &mut self,
        classifier: &mut ShapeClassifier<R>,
        frame: &FeatureFrame,
        frame_index: usize,
        catalog: &ShapeCatalog,
        bias: &BiasConfiguration,
        stats: &TrackStats,
    ) -> (ShapeChoice, HoldState) {
        let state = &mut self.state;
        state.min_hold = bias.min_hold_frames();
        state.max_hold = bias.max_hold_frames();

        let was_idle = state.previous.is_none();
        if let Some(previous) = state.previous {
            state.frames_held += 1;
            if state.frames_held < state.max_hold {
                if state.frames_held < state.min_hold {
                    return (previous, HoldState::Holding);
                }
                if Self::is_steady(state, frame) {
                    return (previous, HoldState::Stable);
                }
            }
        }

        let choice = classifier.classify(frame, frame_index, catalog, bias, stats);
        state.frames_held = 0;
        state.previous = Some(choice);
        let how = if was_idle {
            HoldState::Idle
        } else {
            HoldState::Reclassify
        };
        (choice, how)
    }

    /// Short quiet stretches and low-dynamics frames keep the current shape.
    fn is_steady(state: &mut StabilizerState, frame: &FeatureFrame) -> bool {
        if frame.energy < QUIET_ENERGY || frame.volume < QUIET_VOLUME {
            state.silence_run += 1;
            return state.silence_run < MAX_SILENCE_RUN;
        }
        state.silence_run = 0;
        frame.dynamics < STABLE_DYNAMICS
    }
}
