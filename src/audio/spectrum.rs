//! Bounded per-frame spectra.
//!
//! The direct method is a plain discrete Fourier sum over a capped number of
//! bins. The FFT method produces the same bins through `rustfft` and is meant
//! for long tracks where the direct sum dominates runtime.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

/// Upper bound on bins for the centroid magnitude spectrum.
pub const CENTROID_BINS: usize = 512;
/// Upper bound on bins for the power spectrum (rolloff, flux, formants).
pub const POWER_BINS: usize = 256;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumMethod {
    #[default]
    Direct,
    Fft,
}

/// Magnitude spectrum used for the spectral centroid.
///
/// The analysis size is `min(len, 2 * CENTROID_BINS)`. Longer frames are
/// analysed over their central `2 * CENTROID_BINS` samples, so bin `k` is always
/// `k * sample_rate / size` Hz and the sum stays bounded.
pub fn magnitude_spectrum(samples: &[f32], method: SpectrumMethod) -> Vec<f32> {
    let size = samples.len().min(CENTROID_BINS * 2);
    let bins = size / 2;
    if bins == 0 {
        return Vec::new();
    }
    let start = (samples.len() - size) / 2;
    let window = &samples[start..start + size];

    match method {
        SpectrumMethod::Direct => (0..bins)
            .map(|k| {
                let mut re = 0.0f64;
                let mut im = 0.0f64;
                for (n, &s) in window.iter().enumerate() {
                    let angle = -2.0 * std::f64::consts::PI * k as f64 * n as f64 / size as f64;
                    re += s as f64 * angle.cos();
                    im += s as f64 * angle.sin();
                }
                (re * re + im * im).sqrt() as f32
            })
            .collect(),
        SpectrumMethod::Fft => fft_bins(window, size, bins)
            .into_iter()
            .map(|c| c.norm())
            .collect(),
    }
}

/// Power spectrum over `min(len, 2 * POWER_BINS) / 2` bins using every sample.
pub fn power_spectrum(samples: &[f32], method: SpectrumMethod) -> Vec<f32> {
    let size = samples.len().min(POWER_BINS * 2);
    let bins = size / 2;
    if bins == 0 {
        return Vec::new();
    }

    match method {
        SpectrumMethod::Direct => (0..bins)
            .map(|k| {
                let mut re = 0.0f64;
                let mut im = 0.0f64;
                for (n, &s) in samples.iter().enumerate() {
                    let angle = -2.0 * std::f64::consts::PI * k as f64 * n as f64 / size as f64;
                    re += s as f64 * angle.cos();
                    im += s as f64 * angle.sin();
                }
                (re * re + im * im) as f32
            })
            .collect(),
        SpectrumMethod::Fft => fft_bins(samples, size, bins)
            .into_iter()
            .map(|c| c.norm_sqr())
            .collect(),
    }
}

/// Bins `0..bins` of the direct sum with period `size`: samples past `size`
/// are folded back onto the transform before it runs.
fn fft_bins(samples: &[f32], size: usize, bins: usize) -> Vec<Complex<f32>> {
    let mut buffer = vec![Complex::new(0.0f32, 0.0); size];
    for (j, &s) in samples.iter().enumerate() {
        buffer[j % size].re += s;
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(size);
    fft.process(&mut buffer);

    buffer.truncate(bins);
    buffer
}

/// Frequency of power-spectrum bin `i` in Hz.
pub fn bin_frequency(i: usize, bins: usize, sample_rate: u32) -> f32 {
    if bins == 0 {
        return 0.0;
    }
    i as f32 * sample_rate as f32 / (2.0 * bins as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * std::f32::consts::PI * freq * n as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn empty_and_single_sample_frames_have_no_bins() {
        assert!(power_spectrum(&[], SpectrumMethod::Direct).is_empty());
        assert!(power_spectrum(&[0.3], SpectrumMethod::Direct).is_empty());
        assert!(magnitude_spectrum(&[0.3], SpectrumMethod::Fft).is_empty());
    }

    #[test]
    fn bins_are_bounded() {
        let samples = sine(440.0, 44100, 1837);
        assert_eq!(power_spectrum(&samples, SpectrumMethod::Direct).len(), POWER_BINS);
        assert_eq!(magnitude_spectrum(&samples, SpectrumMethod::Direct).len(), CENTROID_BINS);
    }

    #[test]
    fn fft_matches_direct_power_spectrum() {
        let samples = sine(1000.0, 8000, 512);
        let direct = power_spectrum(&samples, SpectrumMethod::Direct);
        let fast = power_spectrum(&samples, SpectrumMethod::Fft);
        assert_eq!(direct.len(), fast.len());
        for (a, b) in direct.iter().zip(fast.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-2, max_relative = 1e-3);
        }
    }

    #[test]
    fn fft_matches_direct_when_frame_is_longer_than_transform() {
        let samples = sine(700.0, 16000, 900);
        let direct = power_spectrum(&samples, SpectrumMethod::Direct);
        let fast = power_spectrum(&samples, SpectrumMethod::Fft);
        for (a, b) in direct.iter().zip(fast.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-1, max_relative = 1e-3);
        }
    }

    #[test]
    fn long_frames_use_the_central_window() {
        let samples = sine(1000.0, 16000, 4096);
        let direct = magnitude_spectrum(&samples, SpectrumMethod::Direct);
        let fast = magnitude_spectrum(&samples, SpectrumMethod::Fft);
        assert_eq!(direct.len(), CENTROID_BINS);
        for (a, b) in direct.iter().zip(fast.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-1, max_relative = 1e-3);
        }
        // 1000 Hz at 16 kHz over 1024 samples is exactly bin 64; no alias at 3 kHz.
        assert!(direct[64] > 100.0);
        assert!(direct[192] < 1.0);
    }

    #[test]
    fn power_peaks_at_tone_bin() {
        let sr = 8000;
        let samples = sine(1000.0, sr, 512);
        let spectrum = power_spectrum(&samples, SpectrumMethod::Direct);
        let (peak, _) = spectrum
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &p)| if p > best.1 { (i, p) } else { best });
        assert_relative_eq!(bin_frequency(peak, spectrum.len(), sr), 1000.0, epsilon = 20.0);
    }
}
