//! Country generation: capitals, villages, Voronoi regions and pixel ownership.
//!
//! Every settlement (plus a sprinkling of synthetic fill points) seeds a
//! Voronoi region. Each land pixel then goes to the country with the highest
//! influence there. Influence falls off with distance from the capital and is
//! textured by a per-country noise field and a preferred expansion direction.

use std::collections::VecDeque;

use noise::Perlin;
use tracing::{debug, warn};

use crate::biomes::Biome;
use crate::cancel::CancelToken;
use crate::config::GenerationConfig;
use crate::error::StageResult;
use crate::ids::{CityId, CountryId};
use crate::naming::NameGenerator;
use crate::noise_field::fbm;
use crate::rng::SeededRng;
use crate::seeds::derive_seed;
use crate::settlements::city::distance;
use crate::settlements::{Cities, ScoreMap};
use crate::tilemap::Tilemap;

use super::country::Country;
use super::voronoi::{build_voronoi, VoronoiMap};

const MIN_CAPITALS: usize = 3;
const VILLAGES_MIN: i32 = 3;
const VILLAGES_MAX: i32 = 5;
/// Village search disc around a capital, in multiples of the city spacing.
const VILLAGE_RADIUS_FACTOR: f64 = 2.5;
const VILLAGE_SAMPLE_STEP: usize = 2;

const DISTANCE_WEIGHT: f64 = 100.0;
const NOISE_WEIGHT: f64 = 12.0;
const DIRECTION_WEIGHT: f64 = 6.0;
const SCORE_WEIGHT: f64 = 0.05;
const ANCHOR_BONUS: f64 = 8.0;
const NOISE_FREQUENCY: f64 = 0.01;
const NOISE_OCTAVES: u32 = 3;

/// Output of the country stage.
#[derive(Clone, Debug)]
pub struct Territories {
    pub countries: Vec<Country>,
    pub voronoi: VoronoiMap,
    /// Owning country per pixel; `None` for water and unclaimed land.
    pub owner_map: Tilemap<Option<CountryId>>,
}

/// Read-only fields the country stage works from.
pub struct TerritoryInputs<'a> {
    pub heights: &'a Tilemap<u8>,
    pub climate: &'a Tilemap<u8>,
    pub biomes: &'a Tilemap<u8>,
    pub score_map: &'a ScoreMap,
    /// Minimum spacing used by city placement.
    pub min_distance: f64,
}

/// Per-country influence parameters.
struct InfluenceField {
    capital: (usize, usize),
    capital_score: f64,
    noise: Perlin,
    direction: (f64, f64),
}

impl InfluenceField {
    fn base(&self, x: usize, y: usize, max_dim: f64) -> f64 {
        let dx = x as f64 - self.capital.0 as f64;
        let dy = y as f64 - self.capital.1 as f64;
        let d = (dx * dx + dy * dy).sqrt();

        let noise = fbm(&self.noise, x as f64, y as f64, NOISE_OCTAVES, 0.5, NOISE_FREQUENCY);
        let ramp = (d / (max_dim / 10.0)).min(1.0);
        let alignment = if d > 0.0 { (dx * self.direction.0 + dy * self.direction.1) / d } else { 0.0 };

        -DISTANCE_WEIGHT * d / max_dim
            + NOISE_WEIGHT * noise
            + DIRECTION_WEIGHT * alignment * ramp
            + SCORE_WEIGHT * self.capital_score
    }
}

/// Expansion direction: the normalized noise gradient at the capital.
fn preferred_direction(noise: &Perlin, x: usize, y: usize) -> (f64, f64) {
    const H: f64 = 4.0;
    let sample = |px: f64, py: f64| fbm(noise, px, py, NOISE_OCTAVES, 0.5, NOISE_FREQUENCY);
    let (fx, fy) = (x as f64, y as f64);
    let gx = sample(fx + H, fy) - sample(fx - H, fy);
    let gy = sample(fx, fy + H) - sample(fx, fy - H);
    let len = (gx * gx + gy * gy).sqrt();
    if len < 1e-12 {
        (1.0, 0.0)
    } else {
        (gx / len, gy / len)
    }
}

/// Number of capitals before capping at the settlement count.
pub fn capital_target(area: usize, pixels_per_country: usize, variation: f64) -> usize {
    let scaled = (area as f64 / pixels_per_country.max(1) as f64 * variation).floor() as usize;
    scaled.max(MIN_CAPITALS)
}

/// The `n` best-scoring settlements; ties go to the lower id.
pub fn select_capitals(cities: &Cities, n: usize) -> Vec<CityId> {
    let mut ids: Vec<CityId> = cities.iter().map(|c| c.id).collect();
    ids.sort_by(|a, b| {
        let sa = cities.get(*a).map_or(0.0, |c| c.score);
        let sb = cities.get(*b).map_or(0.0, |c| c.score);
        sb.total_cmp(&sa).then(a.cmp(b))
    });
    ids.truncate(n);
    ids
}

pub struct CountryGenerator<'a> {
    inputs: TerritoryInputs<'a>,
    config: &'a GenerationConfig,
    width: usize,
    height: usize,
}

impl<'a> CountryGenerator<'a> {
    pub fn new(inputs: TerritoryInputs<'a>, config: &'a GenerationConfig) -> Self {
        let (width, height) = (inputs.heights.width, inputs.heights.height);
        Self { inputs, config, width, height }
    }

    fn is_land(&self, idx: usize) -> bool {
        *self.inputs.heights.at(idx) > self.config.sea_level
    }

    pub fn generate(&self, cities: &mut Cities, seed: u32, token: &CancelToken) -> StageResult<Territories> {
        let mut rng = SeededRng::new(seed);
        let area = self.width * self.height;

        // Capitals and their villages.
        let variation = rng.range_f64(0.7, 1.3);
        let n_capitals = capital_target(area, self.config.pixels_per_country, variation).min(cities.len());
        let capitals = select_capitals(cities, n_capitals);
        for &cap in &capitals {
            if let Some(city) = cities.get_mut(cap) {
                city.is_capital = true;
            }
        }
        let mut initial_owner: Vec<Option<usize>> = vec![None; cities.len()];
        for (ci, &cap) in capitals.iter().enumerate() {
            initial_owner[cap.index()] = Some(ci);
        }
        token.checkpoint()?;

        if !capitals.is_empty() {
            let villages = self.place_villages(cities, &capitals, seed, &mut rng, token)?;
            initial_owner.resize(cities.len(), None);
            for (village, ci) in villages {
                initial_owner[village.index()] = Some(ci);
            }
        }

        // Voronoi over every settlement plus fill points.
        let fill_count = (area / self.config.pixels_per_fill_point).max(1);
        let mut points: Vec<(usize, usize)> = cities.iter().map(|c| c.position()).collect();
        let mut anchors: Vec<Option<CityId>> = cities.iter().map(|c| Some(c.id)).collect();
        for _ in 0..fill_count {
            points.push((rng.range(0, self.width), rng.range(0, self.height)));
            anchors.push(None);
        }
        let voronoi = build_voronoi(&points, &anchors, self.width, self.height, token)?;

        let mut owner_map = Tilemap::new_with(self.width, self.height, None);
        if capitals.is_empty() {
            warn!("no settlements, no countries generated");
            return Ok(Territories { countries: Vec::new(), voronoi, owner_map });
        }

        // Countries and their influence fields.
        let mut countries = Vec::with_capacity(capitals.len());
        let mut fields = Vec::with_capacity(capitals.len());
        for &cap in &capitals {
            let Some(capital) = cities.get(cap) else { continue };
            let ci = countries.len();
            let country_seed = derive_seed(seed, ci as u32 + 1);
            let noise = Perlin::new(country_seed);
            let direction = preferred_direction(&noise, capital.x, capital.y);
            let name = NameGenerator::country_name(&mut SeededRng::new(country_seed));
            countries.push(Country::new(CountryId::from_index(ci), name, country_seed, cap, direction));
            fields.push(InfluenceField {
                capital: capital.position(),
                capital_score: capital.score,
                noise,
                direction,
            });
        }
        token.checkpoint()?;

        self.assign_pixels(&fields, &voronoi, &mut owner_map, token)?;
        for (ci, field) in fields.iter().enumerate() {
            let (x, y) = field.capital;
            owner_map.set(x, y, Some(CountryId::from_index(ci)));
        }
        let pruned = prune_disconnected(&mut owner_map, &fields);
        token.checkpoint()?;

        for idx in 0..owner_map.len() {
            if let Some(c) = owner_map.at(idx) {
                countries[c.index()].pixels.push(idx);
            }
        }

        // Captured-city resolution.
        let mut captured = 0;
        for city in cities.iter_mut() {
            let owner = *owner_map.get(city.x, city.y);
            city.country = owner;
            if owner.map(|c| c.index()) != initial_owner.get(city.id.index()).copied().flatten() {
                captured += 1;
            }
            if let Some(c) = owner {
                let country = &mut countries[c.index()];
                if country.capital != city.id {
                    country.cities.push(city.id);
                }
            }
        }
        for country in countries.iter_mut() {
            country.update_profile(cities, self.inputs.biomes, self.inputs.climate);
        }

        let unclaimed_land = (0..owner_map.len())
            .filter(|&i| self.is_land(i) && owner_map.at(i).is_none())
            .count();
        debug!(
            countries = countries.len(),
            settlements = cities.len(),
            regions = voronoi.len(),
            captured,
            pruned,
            unclaimed_land,
            "countries generated"
        );
        Ok(Territories { countries, voronoi, owner_map })
    }

    /// Add 3 to 5 villages around each capital, preferring the weaker sites
    /// of the placement score map. Returns each village with its capital's index.
    fn place_villages(
        &self,
        cities: &mut Cities,
        capitals: &[CityId],
        seed: u32,
        rng: &mut SeededRng,
        token: &CancelToken,
    ) -> StageResult<Vec<(CityId, usize)>> {
        let scores = self.inputs.score_map;
        let max_score = scores.as_slice().iter().copied().fold(0.0_f64, f64::max);
        let radius = self.inputs.min_distance * VILLAGE_RADIUS_FACTOR;
        let spacing = self.inputs.min_distance / 2.0;
        let r = radius.ceil() as i64;
        let mut villages = Vec::new();

        for (ci, &cap) in capitals.iter().enumerate() {
            token.checkpoint()?;
            let Some(capital) = cities.get(cap) else { continue };
            let (cx, cy) = (capital.x as i64, capital.y as i64);
            let wanted = rng.range_inclusive(VILLAGES_MIN, VILLAGES_MAX);
            let nearby: Vec<(usize, usize)> = cities
                .iter()
                .map(|c| c.position())
                .filter(|&p| distance(p, (capital.x, capital.y)) <= radius + spacing)
                .collect();

            let mut candidates: Vec<((usize, usize), f64)> = Vec::new();
            for dy in (-r..=r).step_by(VILLAGE_SAMPLE_STEP) {
                for dx in (-r..=r).step_by(VILLAGE_SAMPLE_STEP) {
                    let (x, y) = (cx + dx, cy + dy);
                    if !scores.in_bounds(x, y) || ((dx * dx + dy * dy) as f64).sqrt() > radius {
                        continue;
                    }
                    let pos = (x as usize, y as usize);
                    let s = *scores.get(pos.0, pos.1);
                    if s > 0.0 && nearby.iter().all(|&p| distance(p, pos) >= spacing) {
                        candidates.push((pos, s));
                    }
                }
            }

            for _ in 0..wanted {
                let weights: Vec<f64> = candidates.iter().map(|&(_, s)| max_score - s + 1.0).collect();
                let Some(pick) = rng.weighted_index(&weights) else { break };
                let (pos, score) = candidates[pick];
                let idx = scores.index(pos.0, pos.1);
                let biome = Biome::from_id(*self.inputs.biomes.at(idx)).unwrap_or(Biome::Plain);
                let village_seed = derive_seed(seed ^ (cities.len() as u32).wrapping_mul(0x9E37_79B9), 1);
                let id = cities.spawn(
                    pos,
                    village_seed,
                    *self.inputs.heights.at(idx),
                    *self.inputs.climate.at(idx),
                    biome,
                    score.floor(),
                );
                if let Some(v) = cities.get_mut(id) {
                    v.demote_to_village();
                }
                villages.push((id, ci));
                candidates.retain(|&(p, _)| distance(p, pos) >= spacing);
            }
        }
        Ok(villages)
    }

    /// Give each land pixel to the country with the highest influence.
    fn assign_pixels(
        &self,
        fields: &[InfluenceField],
        voronoi: &VoronoiMap,
        owner_map: &mut Tilemap<Option<CountryId>>,
        token: &CancelToken,
    ) -> StageResult<()> {
        let max_dim = self.width.max(self.height) as f64;

        // Which country claims each settlement-anchored region.
        let anchor_country: Vec<Option<usize>> = voronoi
            .regions
            .iter()
            .map(|region| {
                region.anchor.map(|_| best_index(fields.iter().map(|f| f.base(region.x, region.y, max_dim))))
            })
            .collect();

        // Only countries whose capital is nearly as close as the nearest one
        // can outweigh the distance term.
        let (lo, hi) = fields
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), f| (lo.min(f.capital_score), hi.max(f.capital_score)));
        let span = 2.0 * NOISE_WEIGHT + 2.0 * DIRECTION_WEIGHT + ANCHOR_BONUS + SCORE_WEIGHT * (hi - lo).max(0.0);
        let window = span * max_dim / DISTANCE_WEIGHT;

        let mut dists = vec![0.0; fields.len()];
        for y in 0..self.height {
            if y % 32 == 0 {
                token.checkpoint()?;
            }
            for x in 0..self.width {
                let idx = owner_map.index(x, y);
                if !self.is_land(idx) {
                    continue;
                }
                let mut d_min = f64::INFINITY;
                for (d, f) in dists.iter_mut().zip(fields) {
                    *d = distance(f.capital, (x, y));
                    d_min = d_min.min(*d);
                }
                let anchor = anchor_country[*voronoi.region_map.at(idx) as usize];

                let mut best: Option<(usize, f64)> = None;
                for (ci, f) in fields.iter().enumerate() {
                    if dists[ci] > d_min + window {
                        continue;
                    }
                    let mut value = f.base(x, y, max_dim);
                    if anchor == Some(ci) {
                        value += ANCHOR_BONUS;
                    }
                    if best.map_or(true, |(_, b)| value > b) {
                        best = Some((ci, value));
                    }
                }
                owner_map.set_at(idx, best.map(|(ci, _)| CountryId::from_index(ci)));
            }
        }
        Ok(())
    }
}

/// Index of the maximum; the first one wins ties.
fn best_index(values: impl Iterator<Item = f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

/// Unclaim every pixel that cannot reach its own capital through pixels of
/// the same country. Returns the number of pixels released.
fn prune_disconnected(owner_map: &mut Tilemap<Option<CountryId>>, fields: &[InfluenceField]) -> usize {
    let mut reached = vec![false; owner_map.len()];
    let mut queue = VecDeque::new();
    for (ci, f) in fields.iter().enumerate() {
        let start = owner_map.index(f.capital.0, f.capital.1);
        let owner = Some(CountryId::from_index(ci));
        if *owner_map.at(start) != owner || reached[start] {
            continue;
        }
        reached[start] = true;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            let (x, y) = owner_map.coords(idx);
            for (nx, ny) in owner_map.neighbors(x, y) {
                let n = owner_map.index(nx, ny);
                if !reached[n] && *owner_map.at(n) == owner {
                    reached[n] = true;
                    queue.push_back(n);
                }
            }
        }
    }

    let mut pruned = 0;
    for idx in 0..owner_map.len() {
        if owner_map.at(idx).is_some() && !reached[idx] {
            owner_map.set_at(idx, None);
            pruned += 1;
        }
    }
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlements::CityPlacer;

    fn island(size: usize) -> (Tilemap<u8>, Tilemap<u8>, Tilemap<u8>) {
        let mut heights = Tilemap::new_with(size, size, 100u8);
        let c = size as f64 / 2.0;
        for y in 0..size {
            for x in 0..size {
                let d = ((x as f64 - c).powi(2) + (y as f64 - c).powi(2)).sqrt();
                if d < c * 0.8 {
                    heights.set(x, y, 150);
                }
            }
        }
        let climate = Tilemap::new_with(size, size, 140u8);
        let biomes = crate::biomes::classify_field(&heights, &climate, 127);
        (heights, climate, biomes)
    }

    fn run(size: usize, seed: u32) -> (Cities, Territories, Tilemap<u8>) {
        let (heights, climate, biomes) = island(size);
        let rivers = Tilemap::new_with(size, size, 0u8);
        let token = CancelToken::new();
        let placement = CityPlacer::new(&heights, &climate, &biomes, &rivers, 127)
            .place(8, seed, &token)
            .unwrap();
        let mut cities = placement.cities;
        let config = GenerationConfig::new(size, size, seed);
        let inputs = TerritoryInputs {
            heights: &heights,
            climate: &climate,
            biomes: &biomes,
            score_map: &placement.score_map,
            min_distance: placement.min_distance,
        };
        let territories = CountryGenerator::new(inputs, &config).generate(&mut cities, seed, &token).unwrap();
        (cities, territories, heights)
    }

    #[test]
    fn test_capital_target_floor() {
        assert_eq!(capital_target(100 * 100, 25_000, 1.0), 3);
        assert_eq!(capital_target(1000 * 1000, 25_000, 1.3), 52);
    }

    #[test]
    fn test_select_capitals_by_score() {
        let mut cities = Cities::new();
        cities.spawn((0, 0), 1, 150, 120, Biome::Plain, 50.0);
        cities.spawn((5, 0), 2, 150, 120, Biome::Plain, 90.0);
        cities.spawn((9, 0), 3, 150, 120, Biome::Plain, 90.0);
        assert_eq!(select_capitals(&cities, 2), vec![CityId(1), CityId(2)]);
    }

    #[test]
    fn test_countries_exclude_water_and_are_disjoint() {
        let (_, territories, heights) = run(160, 42);
        assert!(!territories.countries.is_empty());
        let mut seen = vec![false; heights.len()];
        for country in &territories.countries {
            for &p in &country.pixels {
                assert!(*heights.at(p) > 127, "water pixel {} claimed", p);
                assert!(!seen[p], "pixel {} claimed twice", p);
                seen[p] = true;
            }
        }
    }

    #[test]
    fn test_capital_is_first_member_and_owned() {
        let (cities, territories, _) = run(160, 7);
        for country in &territories.countries {
            assert_eq!(country.cities[0], country.capital);
            let capital = cities.get(country.capital).unwrap();
            assert!(capital.is_capital);
            assert_eq!(capital.country, Some(country.id));
        }
    }

    #[test]
    fn test_city_membership_matches_pixels() {
        let (cities, territories, _) = run(160, 3);
        for city in cities.iter() {
            let owner = *territories.owner_map.get(city.x, city.y);
            assert_eq!(city.country, owner);
            if let Some(c) = owner {
                assert!(territories.countries[c.index()].contains_city(city.id));
            }
        }
    }

    #[test]
    fn test_villages_are_village_tier() {
        let (cities, _, _) = run(160, 11);
        let villages: Vec<_> = cities.iter().filter(|c| !c.is_capital && c.is_village()).collect();
        assert!(!villages.is_empty());
    }

    #[test]
    fn test_no_cities_no_countries() {
        let heights = Tilemap::new_with(50, 50, 90u8);
        let climate = Tilemap::new_with(50, 50, 120u8);
        let biomes = Tilemap::new_with(50, 50, 0u8);
        let scores = Tilemap::new_with(50, 50, -100.0);
        let config = GenerationConfig::new(50, 50, 1);
        let inputs = TerritoryInputs {
            heights: &heights,
            climate: &climate,
            biomes: &biomes,
            score_map: &scores,
            min_distance: 2.5,
        };
        let mut cities = Cities::new();
        let territories = CountryGenerator::new(inputs, &config)
            .generate(&mut cities, 1, &CancelToken::new())
            .unwrap();
        assert!(territories.countries.is_empty());
        assert!(!territories.voronoi.is_empty());
        assert!(cities.is_empty());
    }

    #[test]
    fn test_prune_releases_enclaves() {
        let mut owner = Tilemap::new_with(5, 1, Some(CountryId(0)));
        owner.set(2, 0, None);
        let fields = vec![InfluenceField {
            capital: (0, 0),
            capital_score: 0.0,
            noise: Perlin::new(1),
            direction: (1.0, 0.0),
        }];
        assert_eq!(prune_disconnected(&mut owner, &fields), 2);
        assert_eq!(*owner.get(1, 0), Some(CountryId(0)));
        assert_eq!(*owner.get(4, 0), None);
    }
}
