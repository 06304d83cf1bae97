use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::bias::BiasConfiguration;
use super::catalog::{ShapeCatalog, ShapeChoice};
use super::classifier::{classify_by_volume, ShapeClassifier};
use super::shape::{Shape, ShapeCategory};
use super::stabilizer::TemporalStabilizer;
use crate::audio::{
    extract_features, smooth_features, ExtractorSettings, FeatureFrame, SpectrumMethod, TrackStats,
    Waveform,
};
use crate::error::{LipsyncError, Result};
use crate::run::{Progress, RunControl, Stage};

/// Padding appended past the end of the audio so the last shape is never cut short.
pub const DEFAULT_BUFFER_SECS: f64 = 0.1;
const PROGRESS_EVERY: usize = 100;
const COVERAGE_WARN: f64 = 1.10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MappingMode {
    /// Feature heuristics through the stabilizer.
    #[default]
    Natural,
    /// Catalog entry picked straight from frame volume.
    Volume,
}

/// Everything a generation run needs besides audio, catalog and bias.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub frame_rate: u32,
    pub sensitivity: f32,
    /// Seconds of forced-neutral padding after the audio ends.
    pub buffer: f64,
    pub seed: Option<u64>,
    pub mode: MappingMode,
    pub method: SpectrumMethod,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            frame_rate: 24,
            sensitivity: 1.4,
            buffer: DEFAULT_BUFFER_SECS,
            seed: None,
            mode: MappingMode::Natural,
            method: SpectrumMethod::Direct,
        }
    }
}

impl GenerationRequest {
    pub fn extractor_settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            frame_rate: self.frame_rate,
            sensitivity: self.sensitivity,
            method: self.method,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 {
            return Err(LipsyncError::Input("frame rate must be at least 1".into()));
        }
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(LipsyncError::Input(format!(
                "sensitivity must be positive, got {}",
                self.sensitivity
            )));
        }
        if !self.buffer.is_finite() {
            return Err(LipsyncError::Input("buffer must be a finite number of seconds".into()));
        }
        Ok(())
    }
}

/// One output frame of the animation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnimationFrame {
    /// Seconds from the start of the audio.
    pub time: f64,
    pub frame_index: usize,
    pub shape: Shape,
    pub category: ShapeCategory,
    /// Catalog entry whose image is shown; `None` only for an empty catalog.
    pub image_index: Option<usize>,
    /// Padding frame past the end of the audio.
    pub buffer: bool,
}

impl AnimationFrame {
    pub fn shape_name(&self) -> &'static str {
        self.shape.name()
    }
}

/// The finished frame sequence plus what it was computed from.
#[derive(Clone, Debug)]
pub struct AnimationTrack {
    pub frames: Vec<AnimationFrame>,
    pub frame_rate: u32,
    pub audio_duration: f64,
    /// Frames covering the audio itself; the rest are buffer frames.
    pub audio_frames: usize,
    /// Smoothed features the shapes were chosen from.
    pub features: Vec<FeatureFrame>,
}

impl AnimationTrack {
    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.frame_rate as f64
    }

    /// Animation duration over audio duration; 1.0 for silent-length audio.
    pub fn coverage(&self) -> f64 {
        if self.audio_duration > 0.0 {
            self.duration() / self.audio_duration
        } else {
            1.0
        }
    }

    pub fn distribution(&self) -> BTreeMap<Shape, usize> {
        let mut counts = BTreeMap::new();
        for frame in &self.frames {
            *counts.entry(frame.shape).or_insert(0) += 1;
        }
        counts
    }
}

/// Drives extraction, smoothing and stabilised classification over a whole track.
pub struct AnimationSequencer<'a> {
    catalog: &'a ShapeCatalog,
    bias: &'a BiasConfiguration,
    request: &'a GenerationRequest,
}

impl<'a> AnimationSequencer<'a> {
    pub fn new(
        catalog: &'a ShapeCatalog,
        bias: &'a BiasConfiguration,
        request: &'a GenerationRequest,
    ) -> Self {
        Self {
            catalog,
            bias,
            request,
        }
    }

    pub fn generate(
        &self,
        waveform: &Waveform,
        control: &RunControl,
        progress: &dyn Progress,
    ) -> Result<AnimationTrack> {
        self.request.validate()?;
        self.bias.validate()?;

        let mut features =
            extract_features(waveform, &self.request.extractor_settings(), control, progress)?;
        smooth_features(&mut features, self.bias.smoothing as usize);
        self.sequence(features, waveform.sample_rate, waveform.duration(), control, progress)
    }

    /// Sequence already-extracted features covering `duration` seconds of audio.
    pub fn sequence(
        &self,
        features: Vec<FeatureFrame>,
        sample_rate: u32,
        duration: f64,
        control: &RunControl,
        progress: &dyn Progress,
    ) -> Result<AnimationTrack> {
        self.request.validate()?;
        self.bias.validate()?;
        let fps = self.request.frame_rate;
        let audio_frames = features.len();
        let total = total_frames(duration, self.request.buffer, fps);

        let animation = total as f64 / fps as f64;
        if animation + 1e-9 < duration {
            return Err(LipsyncError::Coverage {
                animation,
                audio: duration,
                coverage: animation / duration,
            });
        }
        if duration > 0.0 && animation / duration > COVERAGE_WARN {
            log::warn!(
                "Animation runs {:.1}% of the audio ({:.3}s vs {:.3}s)",
                animation / duration * 100.0,
                animation,
                duration
            );
        }
        log::info!(
            "Sequencing {} frames ({} audio + {} buffer) @ {}fps, mode={:?}",
            total,
            audio_frames.min(total),
            total.saturating_sub(audio_frames),
            fps,
            self.request.mode
        );

        let stats = TrackStats::from_frames(&features, sample_rate, duration);
        let mut classifier = ShapeClassifier::seeded(self.request.seed);
        let mut stabilizer = TemporalStabilizer::new();
        let mut volume_hold: Option<(ShapeChoice, u32)> = None;
        let neutral = self.catalog.neutral_choice();

        let mut frames = Vec::with_capacity(total);
        for i in 0..total {
            control.check()?;
            let buffer = i >= audio_frames;
            let choice = if buffer {
                neutral
            } else {
                let frame = &features[i];
                match self.request.mode {
                    MappingMode::Natural => {
                        stabilizer
                            .next(&mut classifier, frame, i, self.catalog, self.bias, &stats)
                            .0
                    }
                    MappingMode::Volume => self.volume_choice(frame, &mut volume_hold),
                }
            };

            frames.push(AnimationFrame {
                time: i as f64 / fps as f64,
                frame_index: i,
                shape: choice.shape,
                category: choice.category,
                image_index: self.image_for(&choice, i),
                buffer,
            });

            if (i + 1) % PROGRESS_EVERY == 0 || i + 1 == total {
                progress.update(Stage::Sequence, i + 1, total);
            }
        }

        let track = AnimationTrack {
            frames,
            frame_rate: fps,
            audio_duration: duration,
            audio_frames,
            features,
        };
        log::info!(
            "Generated {} frames, {:.3}s ({:.1}% coverage); distribution: {}",
            track.frames.len(),
            track.duration(),
            track.coverage() * 100.0,
            format_distribution(&track.distribution())
        );
        Ok(track)
    }

    /// Volume mapping still respects the minimum hold.
    fn volume_choice(
        &self,
        frame: &FeatureFrame,
        hold: &mut Option<(ShapeChoice, u32)>,
    ) -> ShapeChoice {
        let min_hold = self.bias.min_hold_frames();
        if let Some((previous, held)) = hold.as_mut() {
            *held += 1;
            if *held < min_hold {
                return *previous;
            }
        }
        let choice = classify_by_volume(frame, self.catalog);
        *hold = Some((choice, 0));
        choice
    }

    /// Catalog image for a choice, back-filled with the first entry when the shape has none.
    fn image_for(&self, choice: &ShapeChoice, frame_index: usize) -> Option<usize> {
        if let Some(index) = self.catalog.index_of(choice.shape) {
            return Some(index);
        }
        if self.catalog.is_empty() {
            return None;
        }
        log::debug!(
            "frame {}: no image for {}, using catalog entry 0",
            frame_index,
            choice.shape
        );
        Some(0)
    }
}

/// `ceil((duration + buffer) * fps)`, never negative.
pub fn total_frames(duration: f64, buffer: f64, frame_rate: u32) -> usize {
    let frames = ((duration + buffer) * frame_rate as f64).ceil();
    if frames.is_finite() && frames > 0.0 {
        frames as usize
    } else {
        0
    }
}

pub fn format_distribution(counts: &BTreeMap<Shape, usize>) -> String {
    let total: usize = counts.values().sum();
    if total == 0 {
        return "-".to_string();
    }
    counts
        .iter()
        .map(|(shape, n)| format!("{}={:.1}%", shape, *n as f64 * 100.0 / total as f64))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::NoProgress;
    use crate::viseme::catalog::ShapeImage;

    fn catalog(shapes: &[Shape]) -> ShapeCatalog {
        let mut catalog = ShapeCatalog::new();
        for shape in shapes {
            catalog.insert(*shape, ShapeImage::new(format!("{}.png", shape), vec![0u8]));
        }
        catalog
    }

    fn loud(n: usize) -> Vec<FeatureFrame> {
        (0..n)
            .map(|i| FeatureFrame {
                volume: 0.5 + (i % 7) as f32 * 0.05,
                energy: 0.4,
                spectral_centroid: 300.0 + (i % 11) as f32 * 150.0,
                zero_crossing_rate: 0.01,
                dynamics: (i % 5) as f32 * 0.05,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn buffer_frames_are_neutral() {
        let catalog = catalog(&[Shape::Uh, Shape::Neutral]);
        let bias = BiasConfiguration::default();
        let request = GenerationRequest {
            seed: Some(1),
            ..Default::default()
        };
        let track = AnimationSequencer::new(&catalog, &bias, &request)
            .sequence(loud(48), 44100, 2.0, &RunControl::new(), &NoProgress)
            .unwrap();
        assert_eq!(track.frames.len(), 51);
        assert!(track.frames[48..]
            .iter()
            .all(|f| f.buffer && f.shape == Shape::Neutral && f.image_index == Some(1)));
        assert!(track.coverage() >= 1.0);
    }

    #[test]
    fn negative_buffer_is_a_coverage_error() {
        let catalog = catalog(&[Shape::Neutral]);
        let bias = BiasConfiguration::default();
        let request = GenerationRequest {
            buffer: -0.5,
            ..Default::default()
        };
        let err = AnimationSequencer::new(&catalog, &bias, &request)
            .sequence(loud(24), 44100, 1.0, &RunControl::new(), &NoProgress)
            .unwrap_err();
        assert!(matches!(err, LipsyncError::Coverage { .. }));
    }

    #[test]
    fn zero_duration_yields_buffer_only() {
        let catalog = ShapeCatalog::new();
        let bias = BiasConfiguration::default();
        let request = GenerationRequest::default();
        let track = AnimationSequencer::new(&catalog, &bias, &request)
            .sequence(Vec::new(), 44100, 0.0, &RunControl::new(), &NoProgress)
            .unwrap();
        assert_eq!(track.frames.len(), 3);
        assert!(track.frames.iter().all(|f| f.shape == Shape::Neutral && f.image_index.is_none()));
    }

    #[test]
    fn missing_neutral_uses_first_entry_for_buffer() {
        let catalog = catalog(&[Shape::Aa, Shape::Uh]);
        let bias = BiasConfiguration::default();
        let request = GenerationRequest::default();
        let track = AnimationSequencer::new(&catalog, &bias, &request)
            .sequence(Vec::new(), 44100, 0.0, &RunControl::new(), &NoProgress)
            .unwrap();
        assert!(track.frames.iter().all(|f| f.shape == Shape::Aa && f.image_index == Some(0)));
    }

    #[test]
    fn cancelled_run_returns_no_track() {
        let catalog = catalog(&[Shape::Neutral, Shape::Uh]);
        let bias = BiasConfiguration::default();
        let request = GenerationRequest::default();
        let control = RunControl::new();
        control.cancel();
        let result = AnimationSequencer::new(&catalog, &bias, &request)
            .sequence(loud(10), 44100, 10.0 / 24.0, &control, &NoProgress);
        assert!(matches!(result, Err(LipsyncError::Cancelled)));
    }

    #[test]
    fn volume_mode_follows_loudness() {
        let catalog = catalog(&[Shape::Neutral, Shape::Uh, Shape::Aa]);
        let bias = BiasConfiguration {
            hold_pause: 0,
            smoothing: 0,
            ..Default::default()
        };
        let request = GenerationRequest {
            mode: MappingMode::Volume,
            buffer: 0.0,
            ..Default::default()
        };
        let features: Vec<FeatureFrame> = [0.0, 0.0, 0.9, 0.9, 0.5, 0.5]
            .iter()
            .map(|v| FeatureFrame {
                volume: *v,
                ..Default::default()
            })
            .collect();
        let track = AnimationSequencer::new(&catalog, &bias, &request)
            .sequence(features, 24, 6.0 / 24.0, &RunControl::new(), &NoProgress)
            .unwrap();
        let shapes: Vec<Shape> = track.frames.iter().map(|f| f.shape).collect();
        assert_eq!(
            shapes,
            vec![Shape::Neutral, Shape::Neutral, Shape::Aa, Shape::Aa, Shape::Uh, Shape::Uh]
        );
    }

    #[test]
    fn distribution_counts_every_frame() {
        let catalog = catalog(&Shape::ALL);
        let bias = BiasConfiguration::default();
        let request = GenerationRequest {
            seed: Some(5),
            ..Default::default()
        };
        let track = AnimationSequencer::new(&catalog, &bias, &request)
            .sequence(loud(120), 44100, 5.0, &RunControl::new(), &NoProgress)
            .unwrap();
        let counted: usize = track.distribution().values().sum();
        assert_eq!(counted, track.frames.len());
        assert!(format_distribution(&track.distribution()).contains('%'));
    }

    #[test]
    fn total_frames_rounds_up() {
        assert_eq!(total_frames(3.0, 0.1, 24), 75);
        assert_eq!(total_frames(0.0, 0.0, 24), 0);
        assert_eq!(total_frames(1.0, -2.0, 24), 0);
    }
}
