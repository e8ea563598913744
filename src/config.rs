//! Configuration for a generation run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GenError;

/// Parameters of one fractal noise field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    /// Number of summed octaves.
    pub octaves: u32,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Pixels per unit of noise space at the first octave.
    pub scale: f64,
}

impl NoiseParams {
    pub const fn new(octaves: u32, persistence: f64, scale: f64) -> Self {
        Self { octaves, persistence, scale }
    }

    fn validate(&self, field: &str) -> Result<(), GenError> {
        if self.octaves == 0 {
            return Err(GenError::InvalidConfig(format!("{field}: octaves must be at least 1")));
        }
        if !(self.persistence > 0.0 && self.persistence <= 1.0) {
            return Err(GenError::InvalidConfig(format!(
                "{field}: persistence {} outside (0, 1]",
                self.persistence
            )));
        }
        if !(self.scale > 0.0) || !self.scale.is_finite() {
            return Err(GenError::InvalidConfig(format!("{field}: scale must be positive")));
        }
        Ok(())
    }
}

/// Everything a generation run can be tuned with.
///
/// Only `width`, `height` and `seed` are usually set; every other field
/// defaults to the values the pipeline was tuned against. JSON documents may
/// specify any subset of fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub width: usize,
    pub height: usize,
    pub seed: u32,

    /// Base height field.
    pub noise: NoiseParams,
    /// Multiplicative variation applied under the island mask.
    pub variation_noise: NoiseParams,
    pub climate_noise: NoiseParams,

    /// Exponent of the radial falloff. Higher keeps more land near the edges.
    pub mask_strength: f64,
    /// Pixels at or below this height are water.
    pub sea_level: u8,

    /// Map area per target city.
    pub pixels_per_city: usize,
    /// Map area per capital before the seeded variation.
    pub pixels_per_country: usize,
    /// Map area per synthetic Voronoi fill point.
    pub pixels_per_fill_point: usize,

    pub max_dimension: usize,
    pub min_dimension: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            seed: 42,
            noise: NoiseParams::new(8, 0.5, 250.0),
            variation_noise: NoiseParams::new(8, 0.5, 100.0),
            climate_noise: NoiseParams::new(6, 0.6, 125.0),
            mask_strength: 1.5,
            sea_level: 127,
            pixels_per_city: 10_000,
            pixels_per_country: 25_000,
            pixels_per_fill_point: 8_000,
            max_dimension: 2000,
            min_dimension: 16,
        }
    }
}

impl GenerationConfig {
    /// Default configuration for the given size and seed.
    pub fn new(width: usize, height: usize, seed: u32) -> Self {
        Self { width, height, seed, ..Self::default() }
    }

    /// Load a (possibly partial) JSON configuration over the defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, GenError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Check dimensions first, then every tunable.
    pub fn validate(&self) -> Result<(), GenError> {
        let (min, max) = (self.min_dimension, self.max_dimension);
        if self.width < min || self.width > max || self.height < min || self.height > max {
            return Err(GenError::DimensionOutOfRange {
                width: self.width,
                height: self.height,
                min,
                max,
            });
        }

        self.noise.validate("noise")?;
        self.variation_noise.validate("variation_noise")?;
        self.climate_noise.validate("climate_noise")?;

        if !(self.mask_strength > 0.0) || !self.mask_strength.is_finite() {
            return Err(GenError::InvalidConfig("mask_strength must be positive".into()));
        }
        if self.pixels_per_city == 0 || self.pixels_per_country == 0 || self.pixels_per_fill_point == 0 {
            return Err(GenError::InvalidConfig("density constants must be non-zero".into()));
        }
        Ok(())
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}
