//! Single-slot weighted reservoir for resampled importance sampling.
//!
//! Light candidates are streamed one at a time; the reservoir keeps one of
//! them with probability proportional to its resampling weight, using O(1)
//! memory regardless of how many candidates are seen.

use kinema_math::{Color, Vec3};

use crate::light::LightLiSample;

/// A light sample offered to the reservoir.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirSample {
    /// Index into the frame's light set
    pub light_index: u32,
    pub l_i: Color,
    pub w_i: Vec3,
    pub p_l: Vec3,
    pub pdf: f32,
    /// Resampling weight, usually `p_hat / p`
    pub weight: f32,
}

impl ReservoirSample {
    /// The empty candidate: never selected, contributes nothing.
    pub const EMPTY: Self = Self {
        light_index: u32::MAX,
        l_i: Color::ZERO,
        w_i: Vec3::ZERO,
        p_l: Vec3::ZERO,
        pdf: 0.0,
        weight: 0.0,
    };

    pub fn new(light_index: u32, sample: LightLiSample, weight: f32) -> Self {
        Self {
            light_index,
            l_i: sample.l_i,
            w_i: sample.w_i,
            p_l: sample.p_l,
            pdf: sample.pdf,
            weight,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.light_index == u32::MAX
    }

    /// The light sample carried by this candidate.
    pub fn li_sample(&self) -> LightLiSample {
        LightLiSample {
            l_i: self.l_i,
            w_i: self.w_i,
            p_l: self.p_l,
            pdf: self.pdf,
        }
    }
}

impl Default for ReservoirSample {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Reservoir of size one, reset per shading point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RisReservoir {
    /// Sum of the positive weights streamed so far
    pub sum_weight: f32,
    /// Number of candidates streamed so far, including rejected ones
    pub count: u32,
    /// Currently selected candidate
    pub out: ReservoirSample,
}

impl Default for RisReservoir {
    fn default() -> Self {
        Self::new()
    }
}

impl RisReservoir {
    pub fn new() -> Self {
        Self {
            sum_weight: 0.0,
            count: 0,
            out: ReservoirSample::EMPTY,
        }
    }

    /// Stream one candidate with uniform random number `u` in `[0, 1)`.
    ///
    /// Candidates with a non-positive (or NaN) weight are counted but never kept.
    pub fn add_sample(&mut self, candidate: ReservoirSample, u: f32) -> &ReservoirSample {
        self.count += 1;
        if candidate.weight > 0.0 {
            self.sum_weight += candidate.weight;
            let p = candidate.weight / self.sum_weight;
            if u < p {
                self.out = candidate;
            }
        }
        &self.out
    }

    /// Count a candidate that could not be generated at all.
    pub fn skip(&mut self) {
        self.count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// Unbiased contribution weight `W = sum_weight / (M * p_hat)` of the
    /// selected sample, where `p_hat` is its target function value.
    pub fn contribution_weight(&self, p_hat: f32) -> f32 {
        if self.is_empty() || self.count == 0 || p_hat <= 0.0 {
            return 0.0;
        }
        self.sum_weight / (self.count as f32 * p_hat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn candidate(index: u32, weight: f32) -> ReservoirSample {
        ReservoirSample {
            light_index: index,
            weight,
            ..ReservoirSample::EMPTY
        }
    }

    #[test]
    fn test_first_positive_candidate_is_always_taken() {
        let mut r = RisReservoir::new();
        assert!(r.is_empty());
        let out = r.add_sample(candidate(3, 0.5), 0.999);
        assert_eq!(out.light_index, 3);
        assert_eq!(r.sum_weight, 0.5);
        assert_eq!(r.count, 1);
    }

    #[test]
    fn test_non_positive_weights_are_rejected() {
        let mut r = RisReservoir::new();
        r.add_sample(candidate(0, 0.0), 0.0);
        r.add_sample(candidate(1, -2.0), 0.0);
        r.add_sample(candidate(2, f32::NAN), 0.0);
        assert!(r.is_empty());
        assert_eq!(r.sum_weight, 0.0);
        assert_eq!(r.count, 3);
        assert_eq!(r.contribution_weight(1.0), 0.0);
    }

    /// Fraction of `trials` independent streams that end holding each candidate.
    fn selection_frequencies(weights: &[f32], trials: u32, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut hits = vec![0u32; weights.len()];
        for _ in 0..trials {
            let mut r = RisReservoir::new();
            for (i, &w) in weights.iter().enumerate() {
                r.add_sample(candidate(i as u32, w), rng.gen::<f32>());
            }
            hits[r.out.light_index as usize] += 1;
        }
        hits.iter().map(|&h| h as f32 / trials as f32).collect()
    }

    /// Every candidate's frequency lies within 5 standard deviations of `w / sum(w)`.
    fn assert_frequencies(weights: &[f32], trials: u32, seed: u64) {
        let total: f32 = weights.iter().sum();
        let observed = selection_frequencies(weights, trials, seed);
        for (i, (&w, &f)) in weights.iter().zip(&observed).enumerate() {
            let p = w / total;
            let tolerance = 5.0 * (p * (1.0 - p) / trials as f32).sqrt();
            assert!(
                (f - p).abs() <= tolerance,
                "candidate {} over {} trials: observed {} expected {} (tolerance {})",
                i,
                trials,
                f,
                p,
                tolerance
            );
        }
    }

    #[test]
    fn test_selection_frequency_matches_weights() {
        let weights = [1.0f32, 0.0, 3.0, 0.5, 5.5];
        for (trials, seed) in [(2_000, 7), (20_000, 8), (200_000, 9)] {
            assert_frequencies(&weights, trials, seed);
        }
        // Zero-weight candidates are never held
        assert_eq!(selection_frequencies(&weights, 20_000, 10)[1], 0.0);
    }

    #[test]
    fn test_selection_is_independent_of_stream_order() {
        let heavy_last = [0.5f32, 0.5, 1.0, 8.0];
        let heavy_first = [8.0f32, 1.0, 0.5, 0.5];
        for (trials, seed) in [(2_000, 11), (20_000, 12), (200_000, 13)] {
            assert_frequencies(&heavy_last, trials, seed);
            assert_frequencies(&heavy_first, trials, seed + 100);
        }
    }

    #[test]
    fn test_contribution_weight() {
        let mut r = RisReservoir::new();
        r.add_sample(candidate(0, 2.0), 0.0);
        r.add_sample(candidate(1, 6.0), 0.9);
        r.skip();
        assert_eq!(r.count, 3);
        assert_eq!(r.out.light_index, 0);
        // 8 / (3 * 2)
        assert!((r.contribution_weight(2.0) - 8.0 / 6.0).abs() < 1e-6);
        assert_eq!(r.contribution_weight(0.0), 0.0);
    }
}
