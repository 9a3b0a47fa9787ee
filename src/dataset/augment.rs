// Training-time augmentation over decoded drawing features
//
// Feature-space counterparts of the image transforms applied upstream:
// rotation, flips, affine jitter, color jitter and the CAD-specific set
// (line thickness, contrast, scan noise, grid overlay). Applied to training
// batches only, never to validation.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    pub enable_rotation: bool,
    pub rotation_degrees: f64,
    pub enable_flip: bool,
    pub flip_probability: f64,
    pub enable_affine: bool,
    pub affine_probability: f64,
    pub enable_color_jitter: bool,
    pub color_jitter_probability: f64,
    pub enable_cad_augmentation: bool,
    pub cad_augmentation_probability: f64,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            enable_rotation: true,
            rotation_degrees: 15.0,
            enable_flip: true,
            flip_probability: 0.5,
            enable_affine: true,
            affine_probability: 0.3,
            enable_color_jitter: true,
            color_jitter_probability: 0.3,
            enable_cad_augmentation: true,
            cad_augmentation_probability: 0.3,
        }
    }
}

impl AugmentationConfig {
    /// Everything off; validation batches use this implicitly.
    pub fn disabled() -> Self {
        Self {
            enable_rotation: false,
            enable_flip: false,
            enable_affine: false,
            enable_color_jitter: false,
            enable_cad_augmentation: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, p) in [
            ("flip_probability", self.flip_probability),
            ("affine_probability", self.affine_probability),
            ("color_jitter_probability", self.color_jitter_probability),
            ("cad_augmentation_probability", self.cad_augmentation_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("{name} must be in [0, 1], got {p}"));
            }
        }
        if self.rotation_degrees < 0.0 {
            return Err(format!(
                "rotation_degrees must be non-negative, got {}",
                self.rotation_degrees
            ));
        }
        Ok(())
    }
}

pub struct Augmentor {
    config: AugmentationConfig,
}

impl Augmentor {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn apply(&self, features: &mut [f32], rng: &mut StdRng) {
        if self.config.enable_rotation {
            let degrees = rng.gen_range(-self.config.rotation_degrees..=self.config.rotation_degrees);
            rotate_pairs(features, degrees.to_radians());
        }

        if self.config.enable_flip && rng.gen::<f64>() < self.config.flip_probability {
            features.reverse();
        }

        if self.config.enable_affine && rng.gen::<f64>() < self.config.affine_probability {
            let scale = rng.gen_range(0.9..=1.1) as f32;
            let shift = rng.gen_range(-0.1..=0.1) as f32;
            for value in features.iter_mut() {
                *value = *value * scale + shift;
            }
        }

        if self.config.enable_cad_augmentation
            && rng.gen::<f64>() < self.config.cad_augmentation_probability
        {
            self.apply_cad_variant(features, rng);
        }

        if self.config.enable_color_jitter
            && rng.gen::<f64>() < self.config.color_jitter_probability
        {
            for value in features.iter_mut() {
                *value += rng.gen_range(-0.2..=0.2) as f32;
            }
        }
    }

    fn apply_cad_variant(&self, features: &mut [f32], rng: &mut StdRng) {
        match rng.gen_range(0..4u8) {
            // Line thickness: scale stroke magnitudes up or down
            0 => {
                let factor = if rng.gen::<bool>() { 1.2 } else { 0.8 };
                for value in features.iter_mut() {
                    *value *= factor;
                }
            }
            // Contrast enhancement around the mean
            1 => {
                let mean = features.iter().sum::<f32>() / features.len().max(1) as f32;
                let factor = rng.gen_range(0.8..=1.5) as f32;
                for value in features.iter_mut() {
                    *value = mean + (*value - mean) * factor;
                }
            }
            // Scan noise: salt-and-pepper on ~2% of components
            2 => {
                for value in features.iter_mut() {
                    let roll = rng.gen::<f64>();
                    if roll < 0.01 {
                        *value = 0.0;
                    } else if roll > 0.99 {
                        *value = 1.0;
                    }
                }
            }
            // Grid overlay: damp every k-th component
            _ => {
                let spacing = rng.gen_range(2..=5usize);
                let intensity = rng.gen_range(0.1..=0.3) as f32;
                for value in features.iter_mut().step_by(spacing) {
                    *value *= 1.0 - intensity;
                }
            }
        }
    }
}

fn rotate_pairs(features: &mut [f32], angle: f64) {
    let (sin, cos) = (angle.sin() as f32, angle.cos() as f32);
    for pair in features.chunks_exact_mut(2) {
        let (x, y) = (pair[0], pair[1]);
        pair[0] = x * cos - y * sin;
        pair[1] = x * sin + y * cos;
    }
}
