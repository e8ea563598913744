//! Height field generation: base octave noise shaped into an island.

use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::GenerationConfig;
use crate::error::StageResult;
use crate::noise_field::synthesize_params;
use crate::seeds::WorldSeeds;
use crate::tilemap::Tilemap;

/// Overall gain applied together with the variation factor.
const VARIATION_GAIN: f64 = 1.2;

/// Base height field straight from the noise synthesizer.
pub fn generate_base(config: &GenerationConfig, seed: u32, token: &CancelToken) -> StageResult<Tilemap<u8>> {
    synthesize_params(config.width, config.height, seed, &config.noise, token)
}

/// Radial falloff at `(x, y)`: 1 at the centre, 0 at the corners.
pub fn island_falloff(x: usize, y: usize, width: usize, height: usize, mask_strength: f64) -> f64 {
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let max_dist = (cx * cx + cy * cy).sqrt();
    if max_dist <= 0.0 {
        return 1.0;
    }
    let dx = x as f64 - cx;
    let dy = y as f64 - cy;
    let dist = (dx * dx + dy * dy).sqrt();
    (1.0 - (dist / max_dist).powf(mask_strength)).max(0.0)
}

/// Scale every height by a local factor in `0.5..1.5` taken from `variation`,
/// then by the radial falloff, clamping to the byte range.
pub fn apply_island_mask(heights: &mut Tilemap<u8>, variation: &Tilemap<u8>, mask_strength: f64) {
    let (width, height) = (heights.width, heights.height);
    for y in 0..height {
        for x in 0..width {
            let factor = 0.5 + *variation.get(x, y) as f64 / 255.0;
            let falloff = island_falloff(x, y, width, height, mask_strength);
            let value = *heights.get(x, y) as f64 * factor * VARIATION_GAIN * falloff;
            heights.set(x, y, value.clamp(0.0, 255.0).floor() as u8);
        }
    }
}

/// Stages 2 and 3: base noise, then the variation-modulated island mask.
pub fn generate_heightmap(
    config: &GenerationConfig,
    seeds: &WorldSeeds,
    token: &CancelToken,
) -> StageResult<Tilemap<u8>> {
    let mut heights = generate_base(config, seeds.heightmap, token)?;
    token.checkpoint()?;

    let variation = synthesize_params(config.width, config.height, seeds.variation, &config.variation_noise, token)?;
    apply_island_mask(&mut heights, &variation, config.mask_strength);

    let land = heights.as_slice().iter().filter(|&&h| h > config.sea_level).count();
    debug!(
        land_pixels = land,
        land_ratio = land as f64 / heights.len().max(1) as f64,
        "height field ready"
    );
    Ok(heights)
}
