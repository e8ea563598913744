//! Religions: founding, region-graph propagation and schisms.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use crate::biomes::Biome;
use crate::cancel::CancelToken;
use crate::error::StageResult;
use crate::ids::{CityId, RegionId, ReligionId};
use crate::naming::NameGenerator;
use crate::rng::SeededRng;
use crate::settlements::Cities;
use crate::territories::VoronoiMap;

use super::muted_color;

/// Strength of a faith in its founding region.
pub const FOUNDING_STRENGTH: f64 = 100.0;
/// Share of strength that survives each hop.
pub const HOP_DECAY: f64 = 0.85;
/// Propagation stops once strength falls below this.
pub const MIN_STRENGTH: f64 = 0.1;

const MIN_RELIGIONS: i32 = 5;
const MAX_RELIGIONS: i32 = 8;
const SCHISM_MIN_REGIONS: usize = 8;
const SCHISM_CHANCE: f64 = 0.35;
const SCHISM_REACH: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReligionStatus {
    Active,
    /// Lost every region; remembered only in records.
    Forgotten,
    /// Lost every region but survives underground.
    Secret,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReligionEventKind {
    Foundation,
    Schism,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReligionEvent {
    pub year: i32,
    pub kind: ReligionEventKind,
    pub description: String,
    pub location: (usize, usize),
}

#[derive(Clone, Debug, Serialize)]
pub struct Religion {
    pub id: ReligionId,
    pub name: String,
    pub seed: u32,
    pub deity_theme: &'static str,
    pub founding_city: Option<CityId>,
    pub founding_position: (usize, usize),
    pub founding_year: i32,
    pub color: [u8; 3],
    pub status: ReligionStatus,
    /// Best strength that reached each region, whoever ended up holding it.
    pub influence: BTreeMap<RegionId, f64>,
    /// Regions where this faith is dominant, ascending.
    pub regions: Vec<RegionId>,
    pub parent: Option<ReligionId>,
    pub schisms: Vec<ReligionId>,
    pub events: Vec<ReligionEvent>,
}

impl Religion {
    pub fn is_active(&self) -> bool {
        self.status == ReligionStatus::Active
    }
}

/// What a faith founded in `biome` worships.
pub fn deity_theme(biome: Biome) -> &'static str {
    match biome {
        Biome::Water | Biome::Beach => "the Endless Tide",
        Biome::Plain | Biome::Grassland => "the Golden Harvest",
        Biome::Forest => "the Sacred Grove",
        Biome::Desert => "the Burning Sun",
        Biome::Hills => "the Watching Stones",
        Biome::Mountain => "the Mountain Throne",
        Biome::Snow | Biome::Tundra => "the Eternal Frost",
        Biome::Jungle => "the Green Serpent",
        Biome::Swamp => "the Drowned Mother",
    }
}

/// Religions plus the dominant faith of every region.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReligionMap {
    pub religions: Vec<Religion>,
    /// Indexed by region id.
    pub region_religion: Vec<Option<ReligionId>>,
}

impl ReligionMap {
    pub fn religion_of(&self, region: RegionId) -> Option<ReligionId> {
        self.region_religion.get(region.index()).copied().flatten()
    }

    pub fn get(&self, id: ReligionId) -> Option<&Religion> {
        self.religions.get(id.index())
    }

    pub fn active(&self) -> impl Iterator<Item = &Religion> {
        self.religions.iter().filter(|r| r.is_active())
    }
}

/// Hop distance from `start` to every region, `usize::MAX` when unreachable.
fn hop_distances(voronoi: &VoronoiMap, start: RegionId, limit: usize) -> Vec<usize> {
    let mut hops = vec![usize::MAX; voronoi.len()];
    let mut queue = VecDeque::new();
    hops[start.index()] = 0;
    queue.push_back(start);
    while let Some(region) = queue.pop_front() {
        let d = hops[region.index()];
        if d >= limit {
            continue;
        }
        for &n in &voronoi.regions[region.index()].neighbors {
            if hops[n.index()] == usize::MAX {
                hops[n.index()] = d + 1;
                queue.push_back(n);
            }
        }
    }
    hops
}

pub struct ReligionGenerator<'a> {
    voronoi: &'a VoronoiMap,
    width: usize,
    height: usize,
}

impl<'a> ReligionGenerator<'a> {
    pub fn new(voronoi: &'a VoronoiMap) -> Self {
        Self {
            voronoi,
            width: voronoi.region_map.width,
            height: voronoi.region_map.height,
        }
    }

    /// Found 5 to 8 faiths in random settlements, spread them over the
    /// region graph and split the largest ones.
    pub fn generate(&self, cities: &Cities, seed: u32, token: &CancelToken) -> StageResult<ReligionMap> {
        let mut map = ReligionMap {
            religions: Vec::new(),
            region_religion: vec![None; self.voronoi.len()],
        };
        if cities.is_empty() || self.voronoi.is_empty() {
            warn!("no settlements to found religions in");
            return Ok(map);
        }
        let mut rng = SeededRng::new(seed);

        let wanted = rng.range_inclusive(MIN_RELIGIONS, MAX_RELIGIONS) as usize;
        let mut order: Vec<usize> = (0..cities.len()).collect();
        let take = wanted.min(order.len());
        for i in 0..take {
            let j = rng.range(i, order.len());
            order.swap(i, j);
        }

        let mut origins: Vec<Option<RegionId>> = Vec::new();
        for &idx in &order[..take] {
            let city = &cities.as_slice()[idx];
            let religion_seed = rng.next_u32();
            let theme = deity_theme(city.biome);
            let name = NameGenerator::religion_name(theme, &mut SeededRng::new(religion_seed));
            let id = ReligionId::from_index(map.religions.len());

            let origin = if city.x < self.width && city.y < self.height {
                Some(self.voronoi.region_at(city.x, city.y))
            } else {
                warn!(religion = %name, x = city.x, y = city.y, "founding city out of bounds, skipped");
                None
            };
            origins.push(origin);

            map.religions.push(Religion {
                id,
                events: vec![ReligionEvent {
                    year: city.founded_year,
                    kind: ReligionEventKind::Foundation,
                    description: format!("{} founded in {}", name, city.name),
                    location: city.position(),
                }],
                name,
                seed: religion_seed,
                deity_theme: theme,
                founding_city: Some(city.id),
                founding_position: city.position(),
                founding_year: city.founded_year,
                color: muted_color(religion_seed),
                status: ReligionStatus::Active,
                influence: BTreeMap::new(),
                regions: Vec::new(),
                parent: None,
                schisms: Vec::new(),
            });
        }

        self.propagate(&mut map, &origins, token)?;
        self.assign_regions(&mut map);
        token.checkpoint()?;
        self.split_schisms(&mut map, &origins, &mut rng);
        self.retire_landless(&mut map);

        debug!(
            religions = map.religions.len(),
            active = map.active().count(),
            regions = map.region_religion.iter().filter(|r| r.is_some()).count(),
            "religions spread"
        );
        Ok(map)
    }

    /// Breadth-first spread with per-hop decay. A region only accepts a
    /// faith's strength when it beats what that faith already brought there.
    fn propagate(&self, map: &mut ReligionMap, origins: &[Option<RegionId>], token: &CancelToken) -> StageResult<()> {
        let mut queue = VecDeque::new();
        for (religion, origin) in map.religions.iter_mut().zip(origins) {
            if let Some(region) = *origin {
                religion.influence.insert(region, FOUNDING_STRENGTH);
                queue.push_back((region, religion.id, FOUNDING_STRENGTH));
            }
        }

        let mut processed = 0usize;
        while let Some((region, id, strength)) = queue.pop_front() {
            processed += 1;
            if processed % 4096 == 0 {
                token.checkpoint()?;
            }
            let next = strength * HOP_DECAY;
            if next < MIN_STRENGTH {
                continue;
            }
            let religion = &mut map.religions[id.index()];
            for &neighbor in &self.voronoi.regions[region.index()].neighbors {
                let current = religion.influence.get(&neighbor).copied().unwrap_or(0.0);
                if next > current {
                    religion.influence.insert(neighbor, next);
                    queue.push_back((neighbor, id, next));
                }
            }
        }
        Ok(())
    }

    /// Strongest faith wins each region; ties go to the lower id.
    fn assign_regions(&self, map: &mut ReligionMap) {
        for slot in map.region_religion.iter_mut() {
            *slot = None;
        }
        for religion in map.religions.iter_mut() {
            religion.regions.clear();
        }
        for region in 0..self.voronoi.len() {
            let key = RegionId::from_index(region);
            let mut best: Option<(ReligionId, f64)> = None;
            for religion in &map.religions {
                if let Some(&s) = religion.influence.get(&key) {
                    if s > best.map_or(0.0, |(_, b)| b) {
                        best = Some((religion.id, s));
                    }
                }
            }
            if let Some((id, _)) = best {
                map.region_religion[region] = Some(id);
                map.religions[id.index()].regions.push(key);
            }
        }
    }

    /// Large faiths may split at their far edge; the splinter takes the
    /// parent's regions near its new seat.
    fn split_schisms(&self, map: &mut ReligionMap, origins: &[Option<RegionId>], rng: &mut SeededRng) {
        let founders = map.religions.len();
        for parent_idx in 0..founders {
            let parent = &map.religions[parent_idx];
            if !parent.is_active() || parent.regions.len() < SCHISM_MIN_REGIONS {
                continue;
            }
            if !rng.chance(SCHISM_CHANCE) {
                continue;
            }
            let Some(origin) = origins[parent_idx] else {
                continue;
            };

            let from_origin = hop_distances(self.voronoi, origin, usize::MAX);
            // Farthest reachable held region; first one wins ties.
            let mut seat: Option<(RegionId, usize)> = None;
            for &r in &parent.regions {
                let d = from_origin[r.index()];
                if d != usize::MAX && seat.map_or(true, |(_, best)| d > best) {
                    seat = Some((r, d));
                }
            }
            let Some((seat, _)) = seat else {
                continue;
            };
            if seat == origin {
                continue;
            }

            let near_seat = hop_distances(self.voronoi, seat, SCHISM_REACH);
            let taken: Vec<RegionId> = parent
                .regions
                .iter()
                .copied()
                .filter(|&r| r != origin && near_seat[r.index()] <= SCHISM_REACH)
                .collect();

            let parent_id = parent.id;
            let parent_name = parent.name.clone();
            let theme = parent.deity_theme;
            let year = parent.founding_year + rng.range_inclusive(50, 400);
            let child_seed = rng.next_u32();
            let name = NameGenerator::schism_name(&parent_name, &mut SeededRng::new(child_seed));
            let child_id = ReligionId::from_index(map.religions.len());
            let seat_region = &self.voronoi.regions[seat.index()];
            let location = (seat_region.x, seat_region.y);

            let mut influence = BTreeMap::new();
            for &r in &taken {
                if let Some(&s) = map.religions[parent_idx].influence.get(&r) {
                    influence.insert(r, s);
                }
                map.region_religion[r.index()] = Some(child_id);
            }

            let parent = &mut map.religions[parent_idx];
            parent.regions.retain(|r| !taken.contains(r));
            parent.schisms.push(child_id);
            parent.events.push(ReligionEvent {
                year,
                kind: ReligionEventKind::Schism,
                description: format!("{} broke away from {}", name, parent_name),
                location,
            });

            map.religions.push(Religion {
                id: child_id,
                events: vec![ReligionEvent {
                    year,
                    kind: ReligionEventKind::Schism,
                    description: format!("{} split from {}", name, parent_name),
                    location,
                }],
                name,
                seed: child_seed,
                deity_theme: theme,
                founding_city: seat_region.anchor,
                founding_position: location,
                founding_year: year,
                color: muted_color(child_seed),
                status: ReligionStatus::Active,
                influence,
                regions: taken,
                parent: Some(parent_id),
                schisms: Vec::new(),
            });
        }
    }

    /// Faiths holding no region go underground or are forgotten.
    fn retire_landless(&self, map: &mut ReligionMap) {
        for religion in map.religions.iter_mut() {
            if religion.regions.is_empty() {
                religion.status = if SeededRng::new(religion.seed).chance(0.5) {
                    ReligionStatus::Forgotten
                } else {
                    ReligionStatus::Secret
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::territories::build_voronoi;

    /// A row of `n` cells, each a settlement's region.
    fn strip(n: usize) -> (Cities, VoronoiMap) {
        let mut cities = Cities::new();
        let mut points = Vec::new();
        let mut anchors = Vec::new();
        for i in 0..n {
            let p = (i * 10 + 5, 5);
            anchors.push(Some(cities.spawn(p, i as u32 + 11, 150, 120, Biome::Forest, 120.0)));
            points.push(p);
        }
        let voronoi = build_voronoi(&points, &anchors, n * 10, 10, &CancelToken::new()).unwrap();
        (cities, voronoi)
    }

    #[test]
    fn test_every_reached_region_has_one_owner() {
        let (cities, voronoi) = strip(12);
        let map = ReligionGenerator::new(&voronoi).generate(&cities, 7, &CancelToken::new()).unwrap();
        assert!(map.religions.len() >= 5);

        let held: usize = map.active().map(|r| r.regions.len()).sum();
        assert!(held <= voronoi.len());
        assert_eq!(held, map.region_religion.iter().filter(|r| r.is_some()).count());
        for (i, slot) in map.region_religion.iter().enumerate() {
            if let Some(id) = slot {
                assert!(map.get(*id).unwrap().regions.contains(&RegionId::from_index(i)));
            }
        }
    }

    #[test]
    fn test_strength_decays_per_hop() {
        let (cities, voronoi) = strip(3);
        let map = ReligionGenerator::new(&voronoi).generate(&cities, 1, &CancelToken::new()).unwrap();
        // Three settlements: every one founds a faith at full strength.
        assert_eq!(map.religions.len(), 3);
        for religion in &map.religions {
            let origin = voronoi.region_at(religion.founding_position.0, religion.founding_position.1);
            assert_eq!(religion.influence[&origin], FOUNDING_STRENGTH);
            assert_eq!(religion.regions, vec![origin]);
            for (&region, &s) in &religion.influence {
                if region != origin {
                    assert!(s < FOUNDING_STRENGTH);
                }
            }
        }
    }

    #[test]
    fn test_landless_faiths_are_retired() {
        // Two settlements in one region: the second founder never wins a region.
        let mut cities = Cities::new();
        let a = cities.spawn((2, 2), 1, 150, 120, Biome::Plain, 100.0);
        cities.spawn((3, 2), 2, 150, 120, Biome::Plain, 100.0);
        let voronoi = build_voronoi(&[(2, 2)], &[Some(a)], 8, 8, &CancelToken::new()).unwrap();
        let map = ReligionGenerator::new(&voronoi).generate(&cities, 3, &CancelToken::new()).unwrap();
        assert_eq!(map.religions.len(), 2);
        assert_eq!(map.active().count(), 1);
        let retired = map.religions.iter().find(|r| !r.is_active()).unwrap();
        assert!(matches!(retired.status, ReligionStatus::Forgotten | ReligionStatus::Secret));
        assert!(retired.regions.is_empty());
    }

    #[test]
    fn test_schisms_reference_parent() {
        let (cities, voronoi) = strip(40);
        for seed in 0..20 {
            let map = ReligionGenerator::new(&voronoi).generate(&cities, seed, &CancelToken::new()).unwrap();
            for religion in map.religions.iter().filter(|r| r.parent.is_some()) {
                let parent = map.get(religion.parent.unwrap()).unwrap();
                assert!(parent.schisms.contains(&religion.id));
                assert_eq!(parent.deity_theme, religion.deity_theme);
                assert!(religion.founding_year > parent.founding_year);
                for r in &religion.regions {
                    assert!(!parent.regions.contains(r));
                }
            }
        }
    }

    #[test]
    fn test_no_settlements_no_religions() {
        let (_, voronoi) = strip(3);
        let map = ReligionGenerator::new(&voronoi).generate(&Cities::new(), 1, &CancelToken::new()).unwrap();
        assert!(map.religions.is_empty());
        assert!(map.region_religion.iter().all(|r| r.is_none()));
    }

    #[test]
    fn test_deterministic() {
        let (cities, voronoi) = strip(15);
        let gen = ReligionGenerator::new(&voronoi);
        let a = gen.generate(&cities, 99, &CancelToken::new()).unwrap();
        let b = gen.generate(&cities, 99, &CancelToken::new()).unwrap();
        assert_eq!(a.region_religion, b.region_religion);
        let names: Vec<_> = a.religions.iter().map(|r| &r.name).collect();
        assert_eq!(names, b.religions.iter().map(|r| &r.name).collect::<Vec<_>>());
    }
}
