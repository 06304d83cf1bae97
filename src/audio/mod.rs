pub mod analysis;
pub mod decode;
pub mod features;
pub mod spectrum;

pub use analysis::{extract_features, smooth_features, ExtractorSettings};
pub use decode::{decode_audio, Waveform};
pub use features::{FeatureFrame, Formant, TrackStats};
pub use spectrum::SpectrumMethod;
