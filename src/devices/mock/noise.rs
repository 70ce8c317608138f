//! Seeded noise source for the simulated sensors and drivetrain
//!
//! All randomness in the rig flows through this one type so a scenario can
//! be replayed exactly from its seed, or silenced entirely by setting the
//! standard deviations to zero.

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::StandardNormal;

/// Reproducible Gaussian noise source
#[derive(Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    /// Seed 0 draws fresh entropy; any other seed replays the same sequence
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Zero-mean Gaussian sample; a zero stddev draws nothing from the rng
    /// so noiseless channels stay off the random stream
    #[inline]
    pub fn gaussian(&mut self, stddev: f32) -> f32 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// Gaussian sample around a nominal value
    #[inline]
    pub fn biased_gaussian(&mut self, bias: f32, stddev: f32) -> f32 {
        bias + self.gaussian(stddev)
    }
}
