use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::bias::BiasConfiguration;
use super::catalog::{ShapeCatalog, ShapeChoice};
use super::shape::Shape;
use crate::audio::{FeatureFrame, TrackStats};

pub const SILENCE_VOLUME: f32 = 0.03;
pub const SILENCE_ENERGY: f32 = 0.02;

/// A frame is silent only when both volume and energy sit under their thresholds.
pub fn is_silent(frame: &FeatureFrame) -> bool {
    frame.volume < SILENCE_VOLUME && frame.energy < SILENCE_ENERGY
}

/// The four normalised scalars the decision table is written against, each in 0.0-1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Descriptors {
    pub intensity: f32,
    pub frequency: f32,
    pub variability: f32,
    pub noise: f32,
}

impl Descriptors {
    pub fn from_frame(frame: &FeatureFrame, stats: &TrackStats) -> Self {
        let normalized_volume = if stats.peak_volume > 0.0 {
            frame.volume / stats.peak_volume
        } else {
            0.0
        };
        Self {
            intensity: ((normalized_volume + frame.energy) / 2.0).clamp(0.0, 1.0),
            frequency: (frame.spectral_centroid / 2000.0).clamp(0.0, 1.0),
            variability: (frame.dynamics * 10.0).clamp(0.0, 1.0),
            noise: (frame.zero_crossing_rate * 50.0).clamp(0.0, 1.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub shape: Shape,
    pub weight: f32,
    pub reason: &'static str,
}

/// Gated, weighted candidates before catalog filtering, in decision-table order.
///
/// The order is part of the contract: the weighted draw walks this list, so
/// a seeded run only reproduces if the order never changes.
pub fn raw_candidates(d: &Descriptors) -> Vec<Candidate> {
    let mut out = Vec::with_capacity(10);
    let mut push = |shape, weight, reason| out.push(Candidate { shape, weight, reason });

    if d.intensity > 0.1 {
        push(Shape::Uh, 0.25 * (1.0 + d.intensity * 0.5), "central vowel");
        if d.intensity > 0.3 {
            push(Shape::Aa, 0.15 * (1.0 + d.intensity), "open vowel");
        }
        if d.frequency > 0.4 {
            push(Shape::Ee, 0.12 * (1.0 + d.frequency), "high vowel");
        }
        if d.frequency < 0.4 && d.intensity > 0.2 {
            push(Shape::Oh, 0.10 * (1.0 + (1.0 - d.frequency)), "back vowel");
        }
    }

    if d.variability > 0.1 || d.noise > 0.2 {
        if d.noise > 0.3 && d.frequency > 0.5 {
            push(Shape::S, 0.08 * (1.0 + d.noise + d.frequency), "sibilant");
        }
        if d.variability > 0.2 && d.intensity > 0.2 {
            push(Shape::D, 0.06 * (1.0 + d.variability), "plosive");
        }
        if d.frequency < 0.3 && d.variability > 0.1 {
            push(
                Shape::M,
                0.08 * (1.0 + d.variability * (1.0 - d.frequency)),
                "bilabial",
            );
        }
        if d.frequency > 0.2 && d.frequency < 0.6 && d.intensity > 0.15 {
            push(Shape::L, 0.05 * (1.0 + d.intensity), "liquid");
        }
        if d.frequency < 0.4 && d.intensity > 0.2 {
            push(
                Shape::R,
                0.04 * (1.0 + d.intensity * (1.0 - d.frequency)),
                "rhotic",
            );
        }
        if d.frequency > 0.4 && d.variability > 0.15 {
            push(
                Shape::F,
                0.03 * (1.0 + d.frequency + d.variability),
                "fricative",
            );
        }
    }

    out
}

/// Candidates after bias scaling, restricted to shapes the catalog can show.
/// Anything whose weight ends up at or below zero is dropped.
pub fn candidates(
    frame: &FeatureFrame,
    catalog: &ShapeCatalog,
    bias: &BiasConfiguration,
    stats: &TrackStats,
) -> Vec<Candidate> {
    let descriptors = Descriptors::from_frame(frame, stats);
    raw_candidates(&descriptors)
        .into_iter()
        .map(|c| Candidate {
            weight: c.weight * bias.multiplier(c.shape) * bias.phoneme_factor(c.shape),
            ..c
        })
        .filter(|c| c.weight > 0.0 && catalog.contains(c.shape))
        .collect()
}

/// Heuristic feature → shape mapping with an injected random source.
///
/// All randomness comes from `rng`; two classifiers built from the same seed
/// give identical answers for identical inputs.
pub struct ShapeClassifier<R = StdRng> {
    rng: R,
}

impl ShapeClassifier<StdRng> {
    /// Seeded when `seed` is given, otherwise seeded from OS entropy.
    pub fn seeded(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(rng)
    }
}

impl<R: Rng> ShapeClassifier<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn classify(
        &mut self,
        frame: &FeatureFrame,
        frame_index: usize,
        catalog: &ShapeCatalog,
        bias: &BiasConfiguration,
        stats: &TrackStats,
    ) -> ShapeChoice {
        if is_silent(frame) {
            return catalog.silence().unwrap_or_else(|| catalog.default_choice());
        }

        let candidates = candidates(frame, catalog, bias, stats);
        if candidates.is_empty() {
            return catalog.default_choice();
        }

        let picked = self.draw(&candidates);
        if frame_index % 60 == 0 {
            log::debug!(
                "frame {}: {} ({}) weight={:.3} from {} candidate(s)",
                frame_index,
                picked.shape,
                picked.reason,
                picked.weight,
                candidates.len()
            );
        }
        catalog
            .choice(picked.shape)
            .unwrap_or_else(|| catalog.default_choice())
    }

    /// Weighted draw over `candidates`, which must be non-empty with positive weights.
    fn draw(&mut self, candidates: &[Candidate]) -> Candidate {
        let total: f32 = candidates.iter().map(|c| c.weight).sum();
        if total.is_finite() && total > 0.0 {
            let mut remaining = self.rng.gen_range(0.0..total);
            for candidate in candidates {
                remaining -= candidate.weight;
                if remaining <= 0.0 {
                    return *candidate;
                }
            }
        }
        // Rounding can leave a sliver after the walk; take the heaviest.
        candidates
            .iter()
            .copied()
            .fold(candidates[0], |best, c| if c.weight > best.weight { c } else { best })
    }
}

/// Volume mapping mode: catalog entry `floor(volume * n)`, clamped to the catalog.
pub fn classify_by_volume(frame: &FeatureFrame, catalog: &ShapeCatalog) -> ShapeChoice {
    if catalog.is_empty() {
        return ShapeChoice::FALLBACK;
    }
    let n = catalog.len();
    let index = ((frame.volume.max(0.0) * n as f32).floor() as usize).min(n - 1);
    match catalog.entry(index) {
        Some(entry) => ShapeChoice {
            index,
            shape: entry.shape,
            category: entry.category,
        },
        None => catalog.default_choice(),
    }
}
