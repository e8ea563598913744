//! Layered gradient noise.
//!
//! [`GradientNoise`] is classic 2D Perlin noise over a permutation table that
//! is shuffled by a 32-bit LCG, so the same seed yields the same table on every
//! platform. [`synthesize`] sums octaves of it into a quantized `u8` field; the
//! height, variation and climate fields all come from here.

use noise::{NoiseFn, Seedable};

use crate::cancel::CancelToken;
use crate::config::NoiseParams;
use crate::error::StageResult;
use crate::tilemap::Tilemap;

const LCG_MUL: u32 = 1_664_525;
const LCG_INC: u32 = 1_013_904_223;

/// Frequency multiplier between octaves.
const LACUNARITY: f64 = 2.0;

// =============================================================================
// GRADIENT NOISE
// =============================================================================

/// 2D gradient noise with a seeded permutation table.
#[derive(Clone, Debug)]
pub struct GradientNoise {
    seed: u32,
    perm: [u8; 512],
}

impl GradientNoise {
    pub fn new(seed: u32) -> Self {
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }

        // Fisher-Yates driven by the LCG.
        let mut state = seed;
        for i in (1..256usize).rev() {
            state = state.wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
            let j = (state >> 8) as usize % (i + 1);
            table.swap(i, j);
        }

        let mut perm = [0u8; 512];
        for i in 0..512 {
            perm[i] = table[i & 255];
        }
        Self { seed, perm }
    }

    #[inline]
    fn fade(t: f64) -> f64 {
        t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
    }

    #[inline]
    fn lerp(t: f64, a: f64, b: f64) -> f64 {
        a + t * (b - a)
    }

    #[inline]
    fn grad(hash: u8, x: f64, y: f64) -> f64 {
        let h = hash & 15;
        let u = if h < 8 { x } else { y };
        let v = if h < 8 { y } else { x };
        (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
    }

    /// Raw noise in roughly `[-1, 1]`.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let xfl = x.floor();
        let yfl = y.floor();
        let xi = (xfl as i64 & 255) as usize;
        let yi = (yfl as i64 & 255) as usize;
        let xf = x - xfl;
        let yf = y - yfl;

        let u = Self::fade(xf);
        let v = Self::fade(yf);

        let p = &self.perm;
        let aa = p[p[xi] as usize + yi];
        let ab = p[p[xi] as usize + yi + 1];
        let ba = p[p[xi + 1] as usize + yi];
        let bb = p[p[xi + 1] as usize + yi + 1];

        let x1 = Self::lerp(u, Self::grad(aa, xf, yf), Self::grad(ba, xf - 1.0, yf));
        let x2 = Self::lerp(u, Self::grad(ab, xf, yf - 1.0), Self::grad(bb, xf - 1.0, yf - 1.0));
        Self::lerp(v, x1, x2)
    }

    /// Noise remapped to `[0, 1]`.
    pub fn sample01(&self, x: f64, y: f64) -> f64 {
        ((self.sample(x, y) + 1.0) * 0.5).clamp(0.0, 1.0)
    }
}

impl NoiseFn<f64, 2> for GradientNoise {
    fn get(&self, point: [f64; 2]) -> f64 {
        self.sample(point[0], point[1])
    }
}

impl Seedable for GradientNoise {
    fn set_seed(self, seed: u32) -> Self {
        Self::new(seed)
    }

    fn seed(&self) -> u32 {
        self.seed
    }
}

// =============================================================================
// FIELD SYNTHESIS
// =============================================================================

/// Fractal sum of any 2D noise source, normalized back to the source's range.
///
/// `frequency` is the first-octave multiplier applied to `(x, y)`.
pub fn fbm<N: NoiseFn<f64, 2>>(
    source: &N,
    x: f64,
    y: f64,
    octaves: u32,
    persistence: f64,
    frequency: f64,
) -> f64 {
    let mut total = 0.0;
    let mut max_amplitude = 0.0;
    let mut amplitude = 1.0;
    let mut freq = frequency;
    for _ in 0..octaves {
        total += source.get([x * freq, y * freq]) * amplitude;
        max_amplitude += amplitude;
        amplitude *= persistence;
        freq *= LACUNARITY;
    }
    if max_amplitude > 0.0 {
        total / max_amplitude
    } else {
        0.0
    }
}

/// Build a `width * height` field of octave noise quantized to `[0, 255]`.
///
/// Each octave samples `(x / scale, y / scale) * 2^i` with amplitude
/// `persistence^i`; the sum is divided by the total amplitude before
/// quantization, so the result never leaves the byte range.
pub fn synthesize(
    width: usize,
    height: usize,
    seed: u32,
    octaves: u32,
    persistence: f64,
    scale: f64,
) -> Tilemap<u8> {
    let noise = GradientNoise::new(seed);
    let mut field = Tilemap::new_with(width, height, 0u8);
    for y in 0..height {
        for x in 0..width {
            field.set(x, y, quantize(sample_octaves(&noise, x, y, octaves, persistence, scale)));
        }
    }
    field
}

/// [`synthesize`] with the pipeline's cancellation checkpoints between rows.
pub fn synthesize_params(
    width: usize,
    height: usize,
    seed: u32,
    params: &NoiseParams,
    token: &CancelToken,
) -> StageResult<Tilemap<u8>> {
    let noise = GradientNoise::new(seed);
    let mut field = Tilemap::new_with(width, height, 0u8);
    for y in 0..height {
        if y % 64 == 0 {
            token.checkpoint()?;
        }
        for x in 0..width {
            let value = sample_octaves(&noise, x, y, params.octaves, params.persistence, params.scale);
            field.set(x, y, quantize(value));
        }
    }
    Ok(field)
}

fn sample_octaves(
    noise: &GradientNoise,
    x: usize,
    y: usize,
    octaves: u32,
    persistence: f64,
    scale: f64,
) -> f64 {
    let mut value = 0.0;
    let mut max_value = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    for _ in 0..octaves {
        let sx = (x as f64 / scale) * frequency;
        let sy = (y as f64 / scale) * frequency;
        value += noise.sample01(sx, sy) * amplitude;
        max_value += amplitude;
        amplitude *= persistence;
        frequency *= LACUNARITY;
    }
    if max_value > 0.0 {
        value / max_value
    } else {
        0.0
    }
}

#[inline]
pub fn quantize(value: f64) -> u8 {
    (value * 255.0).floor().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_is_a_permutation() {
        let noise = GradientNoise::new(1234);
        let mut seen = [false; 256];
        for &v in &noise.perm[..256] {
            seen[v as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(&noise.perm[..256], &noise.perm[256..]);
    }

    #[test]
    fn test_synthesize_deterministic() {
        let a = synthesize(64, 48, 42, 8, 0.5, 50.0);
        let b = synthesize(64, 48, 42, 8, 0.5, 50.0);
        assert_eq!(a, b);
        let c = synthesize(64, 48, 43, 8, 0.5, 50.0);
        assert_ne!(a, c, "different seeds should give different fields");
    }

    #[test]
    fn test_synthesize_has_variation() {
        let field = synthesize(128, 128, 7, 6, 0.6, 20.0);
        let min = field.as_slice().iter().min().copied().unwrap();
        let max = field.as_slice().iter().max().copied().unwrap();
        assert!(max - min > 30, "field is nearly flat: {}..{}", min, max);
    }

    #[test]
    fn test_lattice_points_are_midpoint() {
        let noise = GradientNoise::new(5);
        assert_eq!(noise.sample(3.0, 7.0), 0.0);
        assert_eq!(noise.sample01(3.0, 7.0), 0.5);
    }

    #[test]
    fn test_fbm_stays_in_range() {
        let perlin = noise::Perlin::new(11);
        for i in 0..100 {
            let v = fbm(&perlin, i as f64 * 3.7, i as f64 * 1.3, 6, 0.35, 0.05);
            assert!((-1.0..=1.0).contains(&v));
        }
    }
}
