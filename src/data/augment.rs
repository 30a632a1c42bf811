// ============================================================
// Layer 4 — Augmentation
// ============================================================
// Both IIC and IMSAT compare the network's prediction on an
// image with its prediction on a perturbed copy. The perturbed
// copy is produced here, on CHW float pixels:
//
//   1. horizontal flip      (probability flip_prob)
//   2. translation          (up to max_shift pixels, zero fill)
//   3. brightness jitter    (multiply by 1 ± brightness)
//   4. Gaussian noise       (std noise_std)
//
// and clamped back into [0, 1].

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::data::dataset::ImageSample;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentConfig {
    pub flip_prob:  f64,
    pub max_shift:  usize,
    pub brightness: f32,
    pub noise_std:  f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            flip_prob:  0.5,
            max_shift:  2,
            brightness: 0.1,
            noise_std:  0.05,
        }
    }
}

impl AugmentConfig {
    /// A configuration that returns images unchanged
    pub fn identity() -> Self {
        Self { flip_prob: 0.0, max_shift: 0, brightness: 0.0, noise_std: 0.0 }
    }
}

#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentConfig,
}

impl Augmenter {
    pub fn new(config: AugmentConfig) -> Self {
        Self { config }
    }

    /// Perturbed copy of `sample`'s pixels
    pub fn augment<R: Rng + ?Sized>(&self, sample: &ImageSample, rng: &mut R) -> Vec<f32> {
        let [c, h, w] = sample.shape;
        let cfg = &self.config;

        let flip = cfg.flip_prob > 0.0 && rng.gen_bool(cfg.flip_prob.min(1.0));
        let shift = cfg.max_shift as i64;
        let (dy, dx) = if shift > 0 {
            (rng.gen_range(-shift..=shift), rng.gen_range(-shift..=shift))
        } else {
            (0, 0)
        };
        let gain = if cfg.brightness > 0.0 {
            1.0 + rng.gen_range(-cfg.brightness..=cfg.brightness)
        } else {
            1.0
        };

        let mut out = vec![0.0f32; c * h * w];
        for ch in 0..c {
            let plane = ch * h * w;
            for y in 0..h {
                let src_y = y as i64 - dy;
                if src_y < 0 || src_y >= h as i64 {
                    continue;
                }
                for x in 0..w {
                    let mut src_x = x as i64 - dx;
                    if src_x < 0 || src_x >= w as i64 {
                        continue;
                    }
                    if flip {
                        src_x = w as i64 - 1 - src_x;
                    }
                    let src = plane + src_y as usize * w + src_x as usize;
                    out[plane + y * w + x] = sample.pixels[src] * gain;
                }
            }
        }

        if cfg.noise_std > 0.0 {
            for v in out.iter_mut() {
                let z: f32 = StandardNormal.sample(rng);
                *v += cfg.noise_std * z;
            }
        }
        for v in out.iter_mut() {
            *v = v.clamp(0.0, 1.0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn gradient_sample() -> ImageSample {
        // 1 channel, 2 rows, 3 columns: [[0, .5, 1], [0, .5, 1]]
        ImageSample {
            pixels:   vec![0.0, 0.5, 1.0, 0.0, 0.5, 1.0],
            shape:    [1, 2, 3],
            label:    0,
            filename: "g.png".to_string(),
        }
    }

    #[test]
    fn test_identity_config_is_a_copy() {
        let aug = Augmenter::new(AugmentConfig::identity());
        let s = gradient_sample();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(aug.augment(&s, &mut rng), s.pixels);
    }

    #[test]
    fn test_forced_flip_mirrors_rows() {
        let cfg = AugmentConfig { flip_prob: 1.0, ..AugmentConfig::identity() };
        let aug = Augmenter::new(cfg);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            aug.augment(&gradient_sample(), &mut rng),
            vec![1.0, 0.5, 0.0, 1.0, 0.5, 0.0]
        );
    }

    #[test]
    fn test_output_stays_in_unit_range() {
        let cfg = AugmentConfig { brightness: 0.5, noise_std: 0.5, ..AugmentConfig::default() };
        let aug = Augmenter::new(cfg);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let out = aug.augment(&gradient_sample(), &mut rng);
            assert_eq!(out.len(), 6);
            assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_noise_has_configured_spread() {
        let n = 20_000;
        let sample = ImageSample {
            pixels:   vec![0.5; n],
            shape:    [1, 1, n],
            label:    0,
            filename: "flat.png".to_string(),
        };
        let aug = Augmenter::new(AugmentConfig { noise_std: 0.1, ..AugmentConfig::identity() });
        let mut rng = StdRng::seed_from_u64(3);
        let xs = aug.augment(&sample, &mut rng);

        let mean = xs.iter().sum::<f32>() / n as f32;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n as f32;
        assert!((mean - 0.5).abs() < 0.01);
        assert!((var.sqrt() - 0.1).abs() < 0.01);
    }
}
