/// A spectral peak used as a coarse formant estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Formant {
    /// Hz
    pub frequency: f32,
    /// Power at the peak bin
    pub magnitude: f32,
}

/// Acoustic features for one `1/frame_rate` slice of the waveform.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureFrame {
    /// RMS amplitude, scaled by sensitivity
    pub volume: f32,
    /// Mean absolute amplitude, scaled by sensitivity
    pub energy: f32,
    /// Magnitude-weighted mean frequency (Hz)
    pub spectral_centroid: f32,
    /// Sign changes per sample (0.0-1.0)
    pub zero_crossing_rate: f32,
    /// |volume - previous volume|
    pub dynamics: f32,
    /// Frequency below which 85% of the spectral power lies (Hz)
    pub spectral_rolloff: f32,
    /// Summed absolute change of the power spectrum from the previous frame
    pub spectral_flux: f32,
    /// Up to three spectral peaks in 100-4000 Hz, strongest first
    pub formants: Vec<Formant>,
}

impl FeatureFrame {
    /// Spectral centroid as a fraction of the Nyquist frequency.
    pub fn normalized_centroid(&self, sample_rate: u32) -> f32 {
        let nyquist = sample_rate as f32 / 2.0;
        if nyquist <= 0.0 {
            return 0.0;
        }
        (self.spectral_centroid / nyquist).clamp(0.0, 1.0)
    }
}

/// Number of scalar channels that smoothing operates on.
pub(crate) const SCALAR_CHANNELS: usize = 7;

impl FeatureFrame {
    pub(crate) fn scalar(&self, channel: usize) -> f32 {
        match channel {
            0 => self.volume,
            1 => self.energy,
            2 => self.spectral_centroid,
            3 => self.zero_crossing_rate,
            4 => self.dynamics,
            5 => self.spectral_rolloff,
            _ => self.spectral_flux,
        }
    }

    pub(crate) fn set_scalar(&mut self, channel: usize, value: f32) {
        match channel {
            0 => self.volume = value,
            1 => self.energy = value,
            2 => self.spectral_centroid = value,
            3 => self.zero_crossing_rate = value,
            4 => self.dynamics = value,
            5 => self.spectral_rolloff = value,
            _ => self.spectral_flux = value,
        }
    }
}

/// Track-wide statistics the classifier normalises against.
#[derive(Clone, Copy, Debug)]
pub struct TrackStats {
    pub peak_volume: f32,
    pub sample_rate: u32,
    pub duration: f64,
}

impl TrackStats {
    pub fn from_frames(frames: &[FeatureFrame], sample_rate: u32, duration: f64) -> Self {
        let peak_volume = frames.iter().map(|f| f.volume).fold(0.0f32, f32::max);
        Self {
            peak_volume,
            sample_rate,
            duration,
        }
    }
}

impl Default for TrackStats {
    fn default() -> Self {
        Self {
            peak_volume: 1.0,
            sample_rate: 44100,
            duration: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normalized_centroid_is_a_fraction_of_nyquist() {
        let frame = FeatureFrame {
            spectral_centroid: 1000.0,
            ..Default::default()
        };
        assert_relative_eq!(frame.normalized_centroid(16_000), 1000.0 / 8000.0);
        assert_relative_eq!(frame.normalized_centroid(8_000), 1000.0 / 4000.0);
        // Above Nyquist clamps to 1, a zero rate gives 0.
        assert_relative_eq!(frame.normalized_centroid(1_000), 1.0);
        assert_eq!(frame.normalized_centroid(0), 0.0);
    }
}
