//! Directional probability fields.
//!
//! A field is a categorical distribution over the 360 integer bearings a
//! new node can be placed at. Growth continues along the parent direction
//! through Gaussian lobes; Perlin noise sampled around a closed curve adds
//! organic irregularity where there is no direction to continue.

use std::f64::consts::TAU;

use log::warn;
use noise::{NoiseFn, Perlin};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::config::FieldParams;

/// Number of buckets, one per integer degree.
pub const BEARING_COUNT: usize = 360;

/// Sum tolerance for a valid distribution.
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Normalised weights over bearings 0..360.
#[derive(Clone, Debug, PartialEq)]
pub struct BearingDistribution {
    weights: Vec<f64>,
}

impl BearingDistribution {
    pub fn uniform() -> Self {
        Self {
            weights: vec![1.0 / BEARING_COUNT as f64; BEARING_COUNT],
        }
    }

    /// Normalise raw non-negative weights to sum to one.
    ///
    /// Returns `None` for the wrong length, negative or non-finite entries,
    /// or a zero total.
    pub fn normalize(raw: Vec<f64>) -> Option<Self> {
        if raw.len() != BEARING_COUNT || raw.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return None;
        }
        let total: f64 = raw.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            return None;
        }
        Some(Self {
            weights: raw.into_iter().map(|w| w / total).collect(),
        })
    }

    /// Like [`normalize`](Self::normalize) but falls back to uniform on degenerate input.
    pub fn normalize_or_uniform(raw: Vec<f64>, source: &str) -> Self {
        Self::normalize(raw).unwrap_or_else(|| {
            warn!("degenerate {} field, falling back to uniform bearings", source);
            Self::uniform()
        })
    }

    /// Weighted sum of distributions, renormalised. Zero-weight terms are skipped.
    pub fn mix(parts: &[(f64, &BearingDistribution)]) -> Self {
        let mut raw = vec![0.0; BEARING_COUNT];
        for (weight, dist) in parts {
            if *weight <= 0.0 {
                continue;
            }
            for (acc, p) in raw.iter_mut().zip(&dist.weights) {
                *acc += weight * p;
            }
        }
        Self::normalize_or_uniform(raw, "combined")
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.weights
    }

    pub fn probability(&self, bearing: usize) -> f64 {
        self.weights[bearing % BEARING_COUNT]
    }

    /// Bearing with the highest probability (first one on ties).
    pub fn peak(&self) -> usize {
        let mut best = 0;
        for (i, &w) in self.weights.iter().enumerate() {
            if w > self.weights[best] {
                best = i;
            }
        }
        best
    }

    /// Non-negative and summing to one within [`SUM_TOLERANCE`].
    pub fn is_valid(&self) -> bool {
        self.weights.len() == BEARING_COUNT
            && self.weights.iter().all(|w| *w >= 0.0)
            && (self.weights.iter().sum::<f64>() - 1.0).abs() < SUM_TOLERANCE
    }

    /// Draw one bearing in degrees.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        match WeightedIndex::new(&self.weights) {
            Ok(index) => index.sample(rng),
            Err(_) => rng.gen_range(0..BEARING_COUNT),
        }
    }
}

/// Gaussian lobe centred on `center_degree` with standard deviation `sigma`
/// expressed as a fraction of a full turn.
///
/// Distances wrap around the circle, so the lobe falls off symmetrically
/// on both sides of the centre, across 0°.
pub fn gaussian_lobe(center_degree: f64, sigma: f64) -> BearingDistribution {
    let center = (center_degree / BEARING_COUNT as f64).rem_euclid(1.0);
    let raw = (0..BEARING_COUNT)
        .map(|i| {
            let sample = i as f64 / BEARING_COUNT as f64;
            let d = (sample - center).abs();
            let d = d.min(1.0 - d);
            (-0.5 * (d / sigma).powi(2)).exp()
        })
        .collect();
    BearingDistribution::normalize_or_uniform(raw, "gaussian")
}

/// Noise parameters drawn for one Perlin field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerlinSample {
    pub seed: u32,
    pub scale: f64,
    pub octaves: u32,
    pub persistence: f64,
    pub lacunarity: f64,
}

/// Builds the fields used to pick new-node bearings.
pub struct DirectionalField<'a> {
    params: &'a FieldParams,
}

impl<'a> DirectionalField<'a> {
    pub fn new(params: &'a FieldParams) -> Self {
        Self { params }
    }

    pub fn gaussian_lobe(&self, center_degree: f64) -> BearingDistribution {
        gaussian_lobe(center_degree, self.params.gaussian_sigma)
    }

    /// Draw fresh noise parameters from the configured ranges.
    pub fn draw_perlin<R: Rng>(&self, rng: &mut R) -> PerlinSample {
        let ranges = &self.params.perlin;
        PerlinSample {
            seed: rng.gen(),
            scale: rng.gen_range(ranges.scale.min..=ranges.scale.max),
            octaves: rng.gen_range(ranges.octaves[0]..=ranges.octaves[1]),
            persistence: rng.gen_range(ranges.persistence.min..=ranges.persistence.max),
            lacunarity: rng.gen_range(ranges.lacunarity.min..=ranges.lacunarity.max),
        }
    }

    /// Perlin field with randomised parameters.
    pub fn perlin_field<R: Rng>(&self, rng: &mut R) -> BearingDistribution {
        let sample = self.draw_perlin(rng);
        perlin_field_with(&sample)
    }

    /// Field for a node given the bearings that led to it.
    ///
    /// * no parent bearing: Perlin noise only
    /// * parent bearing only: one Gaussian lobe
    /// * both: weighted mix of both lobes and the Perlin field
    pub fn combine<R: Rng>(
        &self,
        parent_bearing: Option<f64>,
        grandparent_bearing: Option<f64>,
        rng: &mut R,
    ) -> BearingDistribution {
        match (parent_bearing, grandparent_bearing) {
            (None, _) => self.perlin_field(rng),
            (Some(parent), None) => self.gaussian_lobe(parent),
            (Some(parent), Some(grandparent)) => {
                let weights = self.params.weights;
                let parent_lobe = self.gaussian_lobe(parent);
                let grandparent_lobe = self.gaussian_lobe(grandparent);
                let perlin = if weights.perlin > 0.0 {
                    self.perlin_field(rng)
                } else {
                    BearingDistribution::uniform()
                };
                BearingDistribution::mix(&[
                    (weights.parent, &parent_lobe),
                    (weights.grandparent, &grandparent_lobe),
                    (weights.perlin, &perlin),
                ])
            }
        }
    }
}

/// Sample fractal noise around a circle so bearing 359 meets bearing 0,
/// shift it to be non-negative and normalise.
pub fn perlin_field_with(sample: &PerlinSample) -> BearingDistribution {
    let perlin = Perlin::new(sample.seed);
    // One degree of arc spans 1/scale noise units.
    let curve_radius = BEARING_COUNT as f64 / (TAU * sample.scale);

    let values: Vec<f64> = (0..BEARING_COUNT)
        .map(|i| {
            let theta = TAU * i as f64 / BEARING_COUNT as f64;
            fbm(
                &perlin,
                curve_radius * theta.cos(),
                curve_radius * theta.sin(),
                sample.octaves,
                sample.persistence,
                sample.lacunarity,
            )
        })
        .collect();

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let raw = values.into_iter().map(|v| v - min).collect();
    BearingDistribution::normalize_or_uniform(raw, "perlin")
}

fn fbm(noise: &Perlin, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut max_value = 0.0;

    for _ in 0..octaves {
        total += amplitude * noise.get([x * frequency, y * frequency]);
        max_value += amplitude;
        amplitude *= persistence;
        frequency *= lacunarity;
    }

    if max_value > 0.0 {
        total / max_value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldWeights, PerlinRanges, Span};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_gaussian_lobe_is_valid() {
        for center in [0.0, 45.5, 90.0, 270.0, 359.0, 725.0] {
            for sigma in [0.05, 0.1, 0.5] {
                let lobe = gaussian_lobe(center, sigma);
                assert_eq!(lobe.probabilities().len(), BEARING_COUNT);
                assert!(lobe.is_valid());
            }
        }
    }

    #[test]
    fn test_gaussian_lobe_peaks_and_falls_off() {
        let lobe = gaussian_lobe(90.0, 0.1);
        assert_eq!(lobe.peak(), 90);

        for k in 1..=180 {
            let right = lobe.probability(90 + k);
            let right_prev = lobe.probability(90 + k - 1);
            assert!(right < right_prev, "not decreasing at +{}", k);

            let left = lobe.probability((90 + 360 - k) % 360);
            let left_prev = lobe.probability((90 + 360 - k + 1) % 360);
            assert!(left < left_prev, "not decreasing at -{}", k);
        }
    }

    #[test]
    fn test_gaussian_lobe_wraps_across_zero() {
        let lobe = gaussian_lobe(0.0, 0.1);
        assert_eq!(lobe.peak(), 0);
        assert!((lobe.probability(10) - lobe.probability(350)).abs() < 1e-12);
    }

    #[test]
    fn test_perlin_field_is_valid() {
        let params = FieldParams::default();
        let field = DirectionalField::new(&params);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let dist = field.perlin_field(&mut rng);
            assert_eq!(dist.probabilities().len(), BEARING_COUNT);
            assert!(dist.is_valid());
        }
    }

    #[test]
    fn test_perlin_field_degenerate_noise_falls_back_to_uniform() {
        // Zero octaves produce a flat curve, which cannot be normalised.
        let sample = PerlinSample { seed: 1, scale: 1.0, octaves: 0, persistence: 0.5, lacunarity: 2.0 };
        assert_eq!(perlin_field_with(&sample), BearingDistribution::uniform());
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(BearingDistribution::normalize(vec![0.0; BEARING_COUNT]).is_none());
        assert!(BearingDistribution::normalize(vec![1.0; 10]).is_none());
        let mut negative = vec![1.0; BEARING_COUNT];
        negative[3] = -1.0;
        assert!(BearingDistribution::normalize(negative).is_none());
        let mut nan = vec![1.0; BEARING_COUNT];
        nan[0] = f64::NAN;
        assert!(BearingDistribution::normalize(nan).is_none());
    }

    #[test]
    fn test_default_weights_average_the_two_lobes() {
        let params = FieldParams::default();
        let field = DirectionalField::new(&params);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let combined = field.combine(Some(40.0), Some(80.0), &mut rng);
        let a = gaussian_lobe(40.0, params.gaussian_sigma);
        let b = gaussian_lobe(80.0, params.gaussian_sigma);
        for bearing in 0..BEARING_COUNT {
            let expected = 0.5 * (a.probability(bearing) + b.probability(bearing));
            assert!((combined.probability(bearing) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_perlin_weight_changes_the_mix() {
        let params = FieldParams {
            gaussian_sigma: 0.1,
            weights: FieldWeights { parent: 1.0, grandparent: 1.0, perlin: 1.0 },
            perlin: PerlinRanges {
                scale: Span::new(2.0, 2.0),
                octaves: [2, 2],
                persistence: Span::new(0.5, 0.5),
                lacunarity: Span::new(2.0, 2.0),
            },
        };
        let field = DirectionalField::new(&params);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let combined = field.combine(Some(10.0), Some(10.0), &mut rng);
        assert!(combined.is_valid());
        assert_ne!(combined, gaussian_lobe(10.0, 0.1));
    }

    #[test]
    fn test_combine_without_grandparent_is_single_lobe() {
        let params = FieldParams::default();
        let field = DirectionalField::new(&params);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(field.combine(Some(200.0), None, &mut rng), field.gaussian_lobe(200.0));
    }

    #[test]
    fn test_sampling_follows_the_lobe() {
        let lobe = gaussian_lobe(180.0, 0.02);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let near = (0..1000)
            .map(|_| lobe.sample(&mut rng))
            .filter(|&b| (150..=210).contains(&b))
            .count();
        assert!(near > 950, "only {} of 1000 samples near the peak", near);
    }
}
