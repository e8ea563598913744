//! Cultures as competing noise fields.
//!
//! Every culture owns a Perlin field; a land pixel belongs to whichever
//! culture's field is strongest there. Nothing propagates or decays.

use std::collections::{BTreeSet, HashSet};

use noise::Perlin;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::StageResult;
use crate::ids::{CityId, CultureId};
use crate::naming::NameGenerator;
use crate::noise_field::{fbm, quantize};
use crate::rng::SeededRng;
use crate::settlements::{Cities, City};
use crate::territories::VoronoiMap;
use crate::tilemap::Tilemap;

use super::muted_color;

const MIN_CULTURES: i64 = 3;
const MAX_CULTURES: i64 = 8;
const FIELD_FREQUENCY: f64 = 0.008;
const FIELD_OCTAVES: u32 = 6;
const FIELD_PERSISTENCE: f64 = 0.6;
/// Half side of the square sampled around a settlement.
const SURVEY_RADIUS: usize = 64;
const HIGHLAND_ALTITUDE: u8 = 180;

/// Broad landscape a culture grew up in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TerrainCategory {
    Coastal,
    Mountain,
    Forest,
    Plains,
    Desert,
}

impl TerrainCategory {
    pub const ALL: [TerrainCategory; 5] = [
        TerrainCategory::Coastal,
        TerrainCategory::Mountain,
        TerrainCategory::Forest,
        TerrainCategory::Plains,
        TerrainCategory::Desert,
    ];

    /// Classify the square of radius 64 around `(cx, cy)`.
    pub fn survey(heights: &Tilemap<u8>, sea_level: u8, cx: usize, cy: usize) -> Self {
        let x0 = cx.saturating_sub(SURVEY_RADIUS);
        let y0 = cy.saturating_sub(SURVEY_RADIUS);
        let x1 = (cx + SURVEY_RADIUS).min(heights.width.saturating_sub(1));
        let y1 = (cy + SURVEY_RADIUS).min(heights.height.saturating_sub(1));

        let (mut total, mut sea, mut high, mut sum) = (0usize, 0usize, 0usize, 0u64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let h = *heights.get(x, y);
                total += 1;
                sum += h as u64;
                if h <= sea_level {
                    sea += 1;
                } else if h > HIGHLAND_ALTITUDE {
                    high += 1;
                }
            }
        }
        if total == 0 {
            return TerrainCategory::Plains;
        }
        let mean = sum as f64 / total as f64;
        let share = |n: usize| n as f64 > total as f64 * 0.3;
        if share(sea) {
            TerrainCategory::Coastal
        } else if share(high) {
            TerrainCategory::Mountain
        } else if mean < 140.0 {
            TerrainCategory::Forest
        } else if mean > 170.0 {
            TerrainCategory::Desert
        } else {
            TerrainCategory::Plains
        }
    }

    pub fn traits(self) -> CultureTraits {
        let (values, architecture, symbols) = match self {
            TerrainCategory::Coastal => (
                "adventure, exchange, daring",
                "timber and coral, harbors",
                "wave, shell, sail",
            ),
            TerrainCategory::Mountain => (
                "strength, devotion, independence",
                "massive stone, fortifications",
                "peak, eagle, crystal",
            ),
            TerrainCategory::Forest => (
                "harmony, mystery, freedom",
                "carved wood, buildings grown into the trees",
                "tree, stag, leaf",
            ),
            TerrainCategory::Plains => (
                "commerce, hospitality, community",
                "brick, open courtyards",
                "wheat, horse, horizon",
            ),
            TerrainCategory::Desert => (
                "survival, honor, tradition",
                "adobe and stone, defensive towers",
                "sun, camel, dune",
            ),
        };
        CultureTraits { values, architecture, symbols }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CultureTraits {
    pub values: &'static str,
    pub architecture: &'static str,
    pub symbols: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct Culture {
    pub id: CultureId,
    pub name: String,
    pub seed: u32,
    pub origin_city: CityId,
    pub origin: (usize, usize),
    pub founding_year: i32,
    pub terrain: TerrainCategory,
    pub traits: CultureTraits,
    pub color: [u8; 3],
    /// Cultures sharing a land border with this one, ascending.
    pub influenced_by: Vec<CultureId>,
    pub area: usize,
}

/// Cultures plus the winner of every land pixel.
#[derive(Clone, Debug, Serialize)]
pub struct CultureMap {
    pub cultures: Vec<Culture>,
    pub culture_map: Tilemap<Option<CultureId>>,
}

impl CultureMap {
    pub fn empty(width: usize, height: usize) -> Self {
        Self { cultures: Vec::new(), culture_map: Tilemap::new_with(width, height, None) }
    }

    pub fn culture_at(&self, x: usize, y: usize) -> Option<CultureId> {
        *self.culture_map.get(x, y)
    }

    pub fn get(&self, id: CultureId) -> Option<&Culture> {
        self.cultures.get(id.index())
    }
}

/// `clamp(3 + (land_regions - 50) / 50, 3, 8)`, floor division.
pub fn culture_count(land_regions: usize) -> usize {
    (MIN_CULTURES + (land_regions as i64 - 50).div_euclid(50)).clamp(MIN_CULTURES, MAX_CULTURES) as usize
}

pub struct CultureGenerator<'a> {
    heights: &'a Tilemap<u8>,
    voronoi: &'a VoronoiMap,
    sea_level: u8,
}

impl<'a> CultureGenerator<'a> {
    pub fn new(heights: &'a Tilemap<u8>, voronoi: &'a VoronoiMap, sea_level: u8) -> Self {
        Self { heights, voronoi, sea_level }
    }

    fn land_regions(&self) -> usize {
        let mut seen = HashSet::new();
        for (i, &h) in self.heights.as_slice().iter().enumerate() {
            if h > self.sea_level {
                seen.insert(*self.voronoi.region_map.at(i));
            }
        }
        seen.len()
    }

    /// Pick origins cycling through the terrain categories present, so the
    /// cultures start in different landscapes when the map allows it.
    fn pick_origins<'c>(
        &self,
        cities: &'c Cities,
        count: usize,
        rng: &mut SeededRng,
    ) -> Vec<(&'c City, TerrainCategory)> {
        let mut by_terrain: Vec<(TerrainCategory, Vec<&City>)> =
            TerrainCategory::ALL.iter().map(|&t| (t, Vec::new())).collect();
        for city in cities.iter() {
            let t = TerrainCategory::survey(self.heights, self.sea_level, city.x, city.y);
            if let Some((_, list)) = by_terrain.iter_mut().find(|(c, _)| *c == t) {
                list.push(city);
            }
        }
        by_terrain.retain(|(_, list)| !list.is_empty());

        let mut taken: HashSet<CityId> = HashSet::new();
        let mut origins = Vec::with_capacity(count);
        for k in 0..count {
            if by_terrain.is_empty() {
                break;
            }
            let (terrain, list) = &by_terrain[k % by_terrain.len()];
            let idx = rng.range(0, list.len());
            let candidate = list[idx];
            let pick = if taken.contains(&candidate.id) {
                by_terrain
                    .iter()
                    .flat_map(|(t, l)| l.iter().map(move |c| (*c, *t)))
                    .find(|(c, _)| !taken.contains(&c.id))
            } else {
                Some((candidate, *terrain))
            };
            if let Some((city, t)) = pick {
                taken.insert(city.id);
                origins.push((city, t));
            }
        }
        origins
    }

    pub fn generate(&self, cities: &Cities, seed: u32, token: &CancelToken) -> StageResult<CultureMap> {
        let (width, height) = (self.heights.width, self.heights.height);
        let mut result = CultureMap::empty(width, height);
        if cities.is_empty() {
            warn!("no settlements to seed cultures from");
            return Ok(result);
        }

        let land_regions = self.land_regions();
        let count = culture_count(land_regions).min(cities.len());
        let mut rng = SeededRng::new(seed);
        let origins = self.pick_origins(cities, count, &mut rng);
        token.checkpoint()?;

        let mut fields = Vec::with_capacity(origins.len());
        for (k, (city, terrain)) in origins.iter().enumerate() {
            let culture_seed = seed ^ (k as u32).wrapping_mul(777);
            fields.push(Perlin::new(culture_seed));
            result.cultures.push(Culture {
                id: CultureId::from_index(k),
                name: NameGenerator::culture_name(&mut SeededRng::new(culture_seed)),
                seed: culture_seed,
                origin_city: city.id,
                origin: city.position(),
                founding_year: city.founded_year,
                terrain: *terrain,
                traits: terrain.traits(),
                color: muted_color(culture_seed),
                influenced_by: Vec::new(),
                area: 0,
            });
        }

        for y in 0..height {
            if y % 64 == 0 {
                token.checkpoint()?;
            }
            for x in 0..width {
                if *self.heights.get(x, y) <= self.sea_level {
                    continue;
                }
                // Strictly stronger wins, so equal fields favour the lower id.
                let mut best: Option<(usize, u8)> = None;
                for (k, field) in fields.iter().enumerate() {
                    let n = fbm(field, x as f64, y as f64, FIELD_OCTAVES, FIELD_PERSISTENCE, FIELD_FREQUENCY);
                    let v = quantize((n + 1.0) / 2.0);
                    if best.map_or(true, |(_, b)| v > b) {
                        best = Some((k, v));
                    }
                }
                if let Some((k, _)) = best {
                    result.culture_map.set(x, y, Some(CultureId::from_index(k)));
                    result.cultures[k].area += 1;
                }
            }
        }

        link_influences(&mut result);
        debug!(
            cultures = result.cultures.len(),
            land_regions,
            "cultures assigned"
        );
        Ok(result)
    }
}

/// Cultures meeting across a pixel edge influence each other.
fn link_influences(map: &mut CultureMap) {
    let grid = &map.culture_map;
    let mut links: Vec<BTreeSet<CultureId>> = vec![BTreeSet::new(); map.cultures.len()];
    for y in 0..grid.height {
        for x in 0..grid.width {
            let Some(here) = *grid.get(x, y) else {
                continue;
            };
            let right = if x + 1 < grid.width { *grid.get(x + 1, y) } else { None };
            let down = if y + 1 < grid.height { *grid.get(x, y + 1) } else { None };
            for other in [right, down].into_iter().flatten() {
                if other != here {
                    links[here.index()].insert(other);
                    links[other.index()].insert(here);
                }
            }
        }
    }
    for (culture, set) in map.cultures.iter_mut().zip(links) {
        culture.influenced_by = set.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biomes::Biome;
    use crate::territories::build_voronoi;

    fn world(size: usize, settlements: &[(usize, usize)]) -> (Tilemap<u8>, Cities, VoronoiMap) {
        let mut heights = Tilemap::new_with(size, size, 150u8);
        for x in 0..size {
            heights.set(x, 0, 90);
        }
        let mut cities = Cities::new();
        let anchors: Vec<_> = settlements
            .iter()
            .enumerate()
            .map(|(i, &p)| Some(cities.spawn(p, i as u32 + 1, 150, 120, Biome::Plain, 100.0)))
            .collect();
        let voronoi = build_voronoi(settlements, &anchors, size, size, &CancelToken::new()).unwrap();
        (heights, cities, voronoi)
    }

    #[test]
    fn test_culture_count_bounds() {
        assert_eq!(culture_count(0), 3);
        assert_eq!(culture_count(50), 3);
        assert_eq!(culture_count(149), 4);
        assert_eq!(culture_count(150), 5);
        assert_eq!(culture_count(10_000), 8);
    }

    #[test]
    fn test_survey_categories() {
        let sea = Tilemap::new_with(40, 40, 100u8);
        assert_eq!(TerrainCategory::survey(&sea, 127, 20, 20), TerrainCategory::Coastal);
        let peaks = Tilemap::new_with(40, 40, 220u8);
        assert_eq!(TerrainCategory::survey(&peaks, 127, 20, 20), TerrainCategory::Mountain);
        let low = Tilemap::new_with(40, 40, 135u8);
        assert_eq!(TerrainCategory::survey(&low, 127, 20, 20), TerrainCategory::Forest);
        let mid = Tilemap::new_with(40, 40, 155u8);
        assert_eq!(TerrainCategory::survey(&mid, 127, 20, 20), TerrainCategory::Plains);
        let high = Tilemap::new_with(40, 40, 175u8);
        assert_eq!(TerrainCategory::survey(&high, 127, 20, 20), TerrainCategory::Desert);
    }

    #[test]
    fn test_water_is_never_assigned() {
        let (heights, cities, voronoi) = world(60, &[(10, 10), (40, 20), (20, 45), (50, 50)]);
        let map = CultureGenerator::new(&heights, &voronoi, 127)
            .generate(&cities, 5, &CancelToken::new())
            .unwrap();
        assert_eq!(map.cultures.len(), 3);
        for x in 0..60 {
            assert_eq!(map.culture_at(x, 0), None);
        }
        let land = 60 * 59;
        let assigned: usize = map.cultures.iter().map(|c| c.area).sum();
        assert_eq!(assigned, land);
    }

    #[test]
    fn test_origins_are_distinct_settlements() {
        let (heights, cities, voronoi) = world(60, &[(10, 10), (40, 20), (20, 45)]);
        let map = CultureGenerator::new(&heights, &voronoi, 127)
            .generate(&cities, 8, &CancelToken::new())
            .unwrap();
        let origins: HashSet<_> = map.cultures.iter().map(|c| c.origin_city).collect();
        assert_eq!(origins.len(), map.cultures.len());
    }

    #[test]
    fn test_influences_are_mutual() {
        let (heights, cities, voronoi) = world(120, &[(10, 10), (100, 20), (20, 100), (90, 90)]);
        let map = CultureGenerator::new(&heights, &voronoi, 127)
            .generate(&cities, 21, &CancelToken::new())
            .unwrap();
        for culture in &map.cultures {
            for other in &culture.influenced_by {
                assert!(map.get(*other).unwrap().influenced_by.contains(&culture.id));
                assert_ne!(*other, culture.id);
            }
        }
    }

    #[test]
    fn test_no_settlements_no_cultures() {
        let (heights, _, voronoi) = world(20, &[(5, 5)]);
        let map = CultureGenerator::new(&heights, &voronoi, 127)
            .generate(&Cities::new(), 1, &CancelToken::new())
            .unwrap();
        assert!(map.cultures.is_empty());
        assert!(map.culture_map.as_slice().iter().all(|c| c.is_none()));
    }
}
