//! City placement: per-pixel desirability scoring and weighted sampling.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::biomes::Biome;
use crate::cancel::CancelToken;
use crate::climate::ClimateBand;
use crate::error::StageResult;
use crate::rng::SeededRng;
use crate::seeds::derive_seed;
use crate::tilemap::Tilemap;

use super::city::{distance, Cities};

/// Score of water and of terrain too high to settle.
pub const EXCLUDED_SCORE: f64 = -100.0;
/// Land above this altitude is never settled.
pub const MAX_SETTLE_ALTITUDE: u8 = 180;
/// Spacing of the key-pixel grid that is scored exactly.
pub const KEY_STEP: usize = 5;

const RIVER_RADIUS: u16 = 15;
const COAST_RADIUS: u16 = 25;
const WEIGHT_EXPONENT: f64 = 1.5;
const ATTEMPTS_PER_CITY: usize = 20;

/// Per-pixel desirability; negative means excluded.
pub type ScoreMap = Tilemap<f64>;

/// Manhattan distance from every pixel to the nearest source pixel, computed
/// by multi-source BFS and capped at `radius`. Pixels farther away hold
/// `u16::MAX`.
pub fn distance_field<F: Fn(usize) -> bool>(width: usize, height: usize, is_source: F, radius: u16) -> Tilemap<u16> {
    let mut dist = Tilemap::new_with(width, height, u16::MAX);
    let mut queue = VecDeque::new();
    for idx in 0..width * height {
        if is_source(idx) {
            dist.set_at(idx, 0);
            queue.push_back(idx);
        }
    }
    while let Some(idx) = queue.pop_front() {
        let d = *dist.at(idx);
        if d >= radius {
            continue;
        }
        let (x, y) = dist.coords(idx);
        for (nx, ny) in dist.neighbors(x, y) {
            let n = dist.index(nx, ny);
            if *dist.at(n) == u16::MAX {
                dist.set_at(n, d + 1);
                queue.push_back(n);
            }
        }
    }
    dist
}

fn river_bonus(dist: u16) -> f64 {
    match dist {
        0..=1 => 80.0,
        2..=3 => 60.0,
        4..=5 => 40.0,
        6..=10 => 20.0,
        11..=RIVER_RADIUS => 8.0,
        _ => 0.0,
    }
}

fn coast_bonus(dist: u16) -> f64 {
    match dist {
        0..=2 => 90.0,
        3..=4 => 70.0,
        5..=6 => 50.0,
        7..=10 => 30.0,
        11..=COAST_RADIUS => 15.0,
        _ => 0.0,
    }
}

fn climate_bonus(climate: u8) -> f64 {
    match ClimateBand::from_value(climate) {
        ClimateBand::Polar => -40.0,
        ClimateBand::CoolTemperate => 30.0,
        ClimateBand::WarmTemperate => 50.0,
        ClimateBand::Tropical => 20.0,
        ClimateBand::Arid => -30.0,
    }
}

fn altitude_bonus(altitude: u8) -> f64 {
    let mut bonus = match altitude {
        130..=160 => 40.0,
        161..=170 => 20.0,
        _ => 0.0,
    };
    if altitude > 170 {
        bonus -= (altitude as f64 - 170.0) * 0.3;
    }
    bonus
}

/// Result of the placement stage.
#[derive(Clone, Debug)]
pub struct Placement {
    pub cities: Cities,
    /// Full-resolution scores, reused for village sites.
    pub score_map: ScoreMap,
    pub min_distance: f64,
    pub candidate_count: usize,
}

/// Scores terrain for settlement and samples city sites.
pub struct CityPlacer<'a> {
    heights: &'a Tilemap<u8>,
    climate: &'a Tilemap<u8>,
    biomes: &'a Tilemap<u8>,
    sea_level: u8,
    river_dist: Tilemap<u16>,
    coast_dist: Tilemap<u16>,
}

impl<'a> CityPlacer<'a> {
    pub fn new(
        heights: &'a Tilemap<u8>,
        climate: &'a Tilemap<u8>,
        biomes: &'a Tilemap<u8>,
        river_map: &Tilemap<u8>,
        sea_level: u8,
    ) -> Self {
        let (w, h) = (heights.width, heights.height);
        let river_dist = distance_field(w, h, |i| *river_map.at(i) != 0, RIVER_RADIUS);
        let coast_dist = distance_field(w, h, |i| *heights.at(i) <= sea_level, COAST_RADIUS);
        Self { heights, climate, biomes, sea_level, river_dist, coast_dist }
    }

    fn is_excluded(&self, altitude: u8) -> bool {
        altitude <= self.sea_level || altitude > MAX_SETTLE_ALTITUDE
    }

    /// Exact desirability of one pixel.
    pub fn pixel_score(&self, x: usize, y: usize) -> f64 {
        let idx = self.heights.index(x, y);
        let altitude = *self.heights.at(idx);
        if self.is_excluded(altitude) {
            return EXCLUDED_SCORE;
        }
        let biome = Biome::from_id(*self.biomes.at(idx)).unwrap_or(Biome::Plain);

        50.0 + altitude_bonus(altitude)
            + biome.settlement_bonus()
            + climate_bonus(*self.climate.at(idx))
            + river_bonus(*self.river_dist.at(idx))
            + coast_bonus(*self.coast_dist.at(idx))
    }

    /// Score every pixel: key pixels exactly, the rest from their nearest key
    /// pixel (or exactly when that key lies off the map). Excluded terrain is
    /// always [`EXCLUDED_SCORE`].
    pub fn score_map(&self, token: &CancelToken) -> StageResult<ScoreMap> {
        let (w, h) = (self.heights.width, self.heights.height);
        let mut keys = Tilemap::new_with(w, h, EXCLUDED_SCORE);
        for y in (0..h).step_by(KEY_STEP) {
            for x in (0..w).step_by(KEY_STEP) {
                keys.set(x, y, self.pixel_score(x, y));
            }
        }
        token.checkpoint()?;

        let mut scores = Tilemap::new_with(w, h, EXCLUDED_SCORE);
        for y in 0..h {
            if y % 64 == 0 {
                token.checkpoint()?;
            }
            for x in 0..w {
                if self.is_excluded(*self.heights.get(x, y)) {
                    continue;
                }
                let kx = (x + KEY_STEP / 2) / KEY_STEP * KEY_STEP;
                let ky = (y + KEY_STEP / 2) / KEY_STEP * KEY_STEP;
                let score = if kx < w && ky < h { *keys.get(kx, ky) } else { self.pixel_score(x, y) };
                scores.set(x, y, score);
            }
        }
        Ok(scores)
    }

    /// Positive-score key pixels in row-major order.
    pub fn candidates(&self, scores: &ScoreMap) -> Vec<((usize, usize), f64)> {
        let mut result = Vec::new();
        for y in (0..scores.height).step_by(KEY_STEP) {
            for x in (0..scores.width).step_by(KEY_STEP) {
                let s = *scores.get(x, y);
                if s > 0.0 {
                    result.push(((x, y), s));
                }
            }
        }
        result
    }

    /// Place up to `num_cities` settlements.
    ///
    /// Sites are drawn with probability proportional to `score^1.5`; each
    /// accepted site removes every candidate closer than the minimum spacing.
    pub fn place(&self, num_cities: usize, seed: u32, token: &CancelToken) -> StageResult<Placement> {
        let score_map = self.score_map(token)?;
        let mut candidates = self.candidates(&score_map);
        let candidate_count = candidates.len();
        let min_distance = self.heights.width.max(self.heights.height) as f64 / 20.0;
        let mut cities = Cities::new();

        if candidates.is_empty() {
            warn!("no valid candidates for city placement");
            return Ok(Placement { cities, score_map, min_distance, candidate_count });
        }

        let mut rng = SeededRng::new(seed);
        let mut placed: Vec<(usize, usize)> = Vec::new();
        let max_attempts = num_cities * ATTEMPTS_PER_CITY;
        let mut attempts = 0;

        while placed.len() < num_cities && attempts < max_attempts && !candidates.is_empty() {
            attempts += 1;
            if attempts % 64 == 0 {
                token.checkpoint()?;
            }

            let weights: Vec<f64> = candidates
                .iter()
                .map(|&(_, s)| if s > 0.0 { s.powf(WEIGHT_EXPONENT) } else { 0.0 })
                .collect();
            let Some(pick) = rng.weighted_index(&weights) else {
                break;
            };
            let (pos, score) = candidates[pick];

            let altitude = *self.heights.get(pos.0, pos.1);
            if score <= 0.0 || altitude <= self.sea_level {
                continue;
            }
            if placed.iter().any(|&p| distance(p, pos) < min_distance) {
                continue;
            }

            placed.push(pos);
            let idx = self.heights.index(pos.0, pos.1);
            let biome = Biome::from_id(*self.biomes.at(idx)).unwrap_or(Biome::Plain);
            let city_seed = derive_seed(seed, cities.len() as u32);
            cities.spawn(pos, city_seed, altitude, *self.climate.at(idx), biome, score.floor());

            candidates.retain(|&(p, _)| distance(p, pos) >= min_distance);
        }

        debug!(
            target_cities = num_cities,
            placed = cities.len(),
            candidates = candidate_count,
            attempts,
            "cities placed"
        );
        Ok(Placement { cities, score_map, min_distance, candidate_count })
    }
}

/// Target number of cities for a map area.
pub fn target_city_count(area: usize, pixels_per_city: usize) -> usize {
    (area / pixels_per_city.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_land(w: usize, h: usize, altitude: u8) -> (Tilemap<u8>, Tilemap<u8>, Tilemap<u8>, Tilemap<u8>) {
        let heights = Tilemap::new_with(w, h, altitude);
        let climate = Tilemap::new_with(w, h, 140u8);
        let biomes = crate::biomes::classify_field(&heights, &climate, 127);
        let rivers = Tilemap::new_with(w, h, 0u8);
        (heights, climate, biomes, rivers)
    }

    #[test]
    fn test_distance_field_is_manhattan() {
        let dist = distance_field(10, 10, |i| i == 0, 5);
        assert_eq!(*dist.get(0, 0), 0);
        assert_eq!(*dist.get(2, 3), 5);
        assert_eq!(*dist.get(3, 3), u16::MAX);
    }

    #[test]
    fn test_bonus_tiers() {
        assert_eq!(river_bonus(1), 80.0);
        assert_eq!(river_bonus(15), 8.0);
        assert_eq!(river_bonus(16), 0.0);
        assert_eq!(coast_bonus(2), 90.0);
        assert_eq!(coast_bonus(25), 15.0);
        assert_eq!(coast_bonus(u16::MAX), 0.0);
    }

    #[test]
    fn test_water_and_peaks_excluded() {
        let (mut heights, climate, _, rivers) = flat_land(20, 20, 150);
        heights.set(3, 3, 100);
        heights.set(4, 4, 190);
        let biomes = crate::biomes::classify_field(&heights, &climate, 127);
        let placer = CityPlacer::new(&heights, &climate, &biomes, &rivers, 127);
        assert_eq!(placer.pixel_score(3, 3), EXCLUDED_SCORE);
        assert_eq!(placer.pixel_score(4, 4), EXCLUDED_SCORE);
        assert!(placer.pixel_score(10, 10) > 0.0);

        let scores = placer.score_map(&CancelToken::new()).unwrap();
        assert_eq!(*scores.get(3, 3), EXCLUDED_SCORE);
        assert_eq!(*scores.get(4, 4), EXCLUDED_SCORE);
    }

    #[test]
    fn test_river_raises_score() {
        let (heights, climate, biomes, mut rivers) = flat_land(40, 40, 150);
        let without = CityPlacer::new(&heights, &climate, &biomes, &rivers, 127).pixel_score(20, 20);
        rivers.set(20, 21, 1);
        let with = CityPlacer::new(&heights, &climate, &biomes, &rivers, 127).pixel_score(20, 20);
        assert_eq!(with - without, 80.0);
    }

    #[test]
    fn test_placement_respects_spacing() {
        let (heights, climate, biomes, rivers) = flat_land(200, 200, 150);
        let placer = CityPlacer::new(&heights, &climate, &biomes, &rivers, 127);
        let placement = placer.place(12, 42, &CancelToken::new()).unwrap();
        assert!(!placement.cities.is_empty());
        let cities = placement.cities.as_slice();
        for (i, a) in cities.iter().enumerate() {
            for b in &cities[i + 1..] {
                assert!(a.distance_to(b) >= placement.min_distance);
            }
        }
    }

    #[test]
    fn test_all_water_places_nothing() {
        let (heights, climate, biomes, rivers) = flat_land(60, 60, 90);
        let placer = CityPlacer::new(&heights, &climate, &biomes, &rivers, 127);
        let placement = placer.place(5, 1, &CancelToken::new()).unwrap();
        assert!(placement.cities.is_empty());
        assert_eq!(placement.candidate_count, 0);
    }

    #[test]
    fn test_cancelled_placement_halts() {
        let (heights, climate, biomes, rivers) = flat_land(60, 60, 150);
        let placer = CityPlacer::new(&heights, &climate, &biomes, &rivers, 127);
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(placer.place(5, 1, &token), Err(crate::error::Halt::Cancelled)));
    }

    #[test]
    fn test_target_city_count() {
        assert_eq!(target_city_count(200 * 200, 10_000), 4);
        assert_eq!(target_city_count(50 * 50, 10_000), 1);
    }
}
