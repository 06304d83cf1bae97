use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use super::decode::Waveform;
use super::features::{FeatureFrame, Formant, SCALAR_CHANNELS};
use super::spectrum::{self, SpectrumMethod};
use crate::error::Result;
use crate::run::{Progress, RunControl, Stage};

const ROLLOFF_FRACTION: f32 = 0.85;
const FORMANT_MIN_HZ: f32 = 100.0;
const FORMANT_MAX_HZ: f32 = 4000.0;
const MAX_FORMANTS: usize = 3;
const PROGRESS_EVERY: usize = 100;

#[derive(Clone, Copy, Debug)]
pub struct ExtractorSettings {
    pub frame_rate: u32,
    pub sensitivity: f32,
    pub method: SpectrumMethod,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            frame_rate: 24,
            sensitivity: 1.4,
            method: SpectrumMethod::Direct,
        }
    }
}

/// Number of analysis frames covering the waveform: `ceil(duration * frame_rate)`.
pub fn frame_count(sample_count: usize, sample_rate: u32, frame_rate: u32) -> usize {
    if sample_rate == 0 {
        return 0;
    }
    let scaled = sample_count as u64 * frame_rate as u64;
    scaled.div_ceil(sample_rate as u64) as usize
}

/// Per-frame output of the parallel pass. The power spectrum is kept for the flux pass.
struct RawFrame {
    features: FeatureFrame,
    power: Vec<f32>,
}

/// Turn a waveform into one [`FeatureFrame`] per `1/frame_rate` seconds.
///
/// Frames are time-aligned slices; the last one may be shorter than the rest.
/// Spectra are computed in parallel, then flux and dynamics are filled in a
/// sequential pass that takes the previous frame explicitly.
pub fn extract_features(
    waveform: &Waveform,
    settings: &ExtractorSettings,
    control: &RunControl,
    progress: &dyn Progress,
) -> Result<Vec<FeatureFrame>> {
    let total_frames = frame_count(waveform.samples.len(), waveform.sample_rate, settings.frame_rate);
    log::info!(
        "Extracting features: {} frames @ {}fps, sensitivity={:.2}, spectrum={:?}",
        total_frames,
        settings.frame_rate,
        settings.sensitivity,
        settings.method
    );

    let done = AtomicUsize::new(0);
    let raw: Vec<RawFrame> = (0..total_frames)
        .into_par_iter()
        .map(|frame_idx| {
            control.check()?;
            let slice = frame_slice(waveform, settings.frame_rate, frame_idx);
            let frame = analyze_frame(slice, waveform.sample_rate, settings);

            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if finished % PROGRESS_EVERY == 0 || finished == total_frames {
                progress.update(Stage::Extract, finished, total_frames);
            }
            Ok(frame)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut frames = Vec::with_capacity(raw.len());
    let mut previous: Option<&RawFrame> = None;
    for current in &raw {
        control.check()?;
        let mut features = current.features.clone();
        features.spectral_flux = spectral_flux(&current.power, previous.map(|p| p.power.as_slice()));
        features.dynamics = dynamics(features.volume, previous.map(|p| p.features.volume));
        frames.push(features);
        previous = Some(current);
    }

    Ok(frames)
}

fn frame_slice(waveform: &Waveform, frame_rate: u32, frame_idx: usize) -> &[f32] {
    let len = waveform.samples.len();
    let sr = waveform.sample_rate as u64;
    let fps = frame_rate.max(1) as u64;
    let start = ((frame_idx as u64 * sr) / fps) as usize;
    let end = (((frame_idx as u64 + 1) * sr) / fps) as usize;
    &waveform.samples[start.min(len)..end.min(len)]
}

fn analyze_frame(samples: &[f32], sample_rate: u32, settings: &ExtractorSettings) -> RawFrame {
    if samples.is_empty() {
        return RawFrame {
            features: FeatureFrame::default(),
            power: Vec::new(),
        };
    }

    let n = samples.len() as f32;
    let rms = (samples.iter().map(|s| s * s).sum::<f32>() / n).sqrt();
    let mean_abs = samples.iter().map(|s| s.abs()).sum::<f32>() / n;

    let magnitudes = spectrum::magnitude_spectrum(samples, settings.method);
    let power = spectrum::power_spectrum(samples, settings.method);

    let features = FeatureFrame {
        volume: rms * settings.sensitivity,
        energy: mean_abs * settings.sensitivity,
        spectral_centroid: spectral_centroid(&magnitudes, sample_rate),
        zero_crossing_rate: zero_crossing_rate(samples),
        dynamics: 0.0,
        spectral_rolloff: spectral_rolloff(&power, sample_rate),
        spectral_flux: 0.0,
        formants: formants(&power, sample_rate),
    };

    RawFrame { features, power }
}

pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / samples.len() as f32
}

/// Magnitude-weighted mean frequency in Hz.
pub fn spectral_centroid(magnitudes: &[f32], sample_rate: u32) -> f32 {
    let nyquist = sample_rate as f32 / 2.0;
    let bins = magnitudes.len() as f32;
    let (weighted, total) = magnitudes
        .iter()
        .enumerate()
        .fold((0.0f32, 0.0f32), |(num, den), (i, &mag)| {
            (num + i as f32 * nyquist / bins * mag, den + mag)
        });
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

pub fn spectral_rolloff(power: &[f32], sample_rate: u32) -> f32 {
    let total: f32 = power.iter().sum();
    let threshold = total * ROLLOFF_FRACTION;
    let mut cumulative = 0.0f32;
    for (i, &p) in power.iter().enumerate() {
        cumulative += p;
        if cumulative >= threshold {
            return spectrum::bin_frequency(i, power.len(), sample_rate);
        }
    }
    0.0
}

/// Sum of absolute bin differences against the previous frame's power spectrum.
pub fn spectral_flux(current: &[f32], previous: Option<&[f32]>) -> f32 {
    match previous {
        Some(prev) => current
            .iter()
            .zip(prev.iter())
            .map(|(c, p)| (c - p).abs())
            .sum(),
        None => 0.0,
    }
}

pub fn dynamics(volume: f32, previous_volume: Option<f32>) -> f32 {
    previous_volume.map_or(0.0, |prev| (volume - prev).abs())
}

pub fn formants(power: &[f32], sample_rate: u32) -> Vec<Formant> {
    let bins = power.len();
    let mut peaks: Vec<Formant> = (1..bins.saturating_sub(1))
        .filter(|&i| power[i] > power[i - 1] && power[i] > power[i + 1])
        .map(|i| Formant {
            frequency: spectrum::bin_frequency(i, bins, sample_rate),
            magnitude: power[i],
        })
        .filter(|f| f.frequency > FORMANT_MIN_HZ && f.frequency < FORMANT_MAX_HZ)
        .collect();
    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    peaks.truncate(MAX_FORMANTS);
    peaks
}

/// Moving average over `[i - radius, i + radius]`, clipped to the sequence, per scalar
/// channel. Windows read the unsmoothed values. Formant lists are left as they are.
pub fn smooth_features(frames: &mut [FeatureFrame], radius: usize) {
    if radius == 0 || frames.len() < 2 {
        return;
    }
    let n = frames.len();
    for channel in 0..SCALAR_CHANNELS {
        let original: Vec<f32> = frames.iter().map(|f| f.scalar(channel)).collect();
        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(0.0f64);
        for v in &original {
            prefix.push(prefix[prefix.len() - 1] + *v as f64);
        }
        for (i, frame) in frames.iter_mut().enumerate() {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(n - 1);
            let mean = (prefix[hi + 1] - prefix[lo]) / (hi - lo + 1) as f64;
            frame.set_scalar(channel, mean as f32);
        }
    }
}
