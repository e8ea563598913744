//! Religions and cultures, plus the labels they leave on cities and realms.

pub mod culture;
pub mod religion;

use std::collections::BTreeMap;

use crate::rng::SeededRng;
use crate::settlements::Cities;
use crate::territories::{Country, VoronoiMap};

pub use culture::{culture_count, Culture, CultureGenerator, CultureMap, CultureTraits, TerrainCategory};
pub use religion::{
    deity_theme, Religion, ReligionEvent, ReligionEventKind, ReligionGenerator, ReligionMap, ReligionStatus,
};

/// Seeded color with every channel in `50..200`.
pub(crate) fn muted_color(seed: u32) -> [u8; 3] {
    let mut rng = SeededRng::new(seed);
    [0; 3].map(|_| rng.range(50, 200) as u8)
}

/// Most frequent value, lowest first on ties.
fn most_common<T: Ord + Copy>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: BTreeMap<T, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    let mut best: Option<(T, usize)> = None;
    for (v, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((v, n));
        }
    }
    best.map(|(v, _)| v)
}

/// Record each city's faith and culture, then each country's majority.
pub fn apply_labels(
    cities: &mut Cities,
    countries: &mut [Country],
    voronoi: &VoronoiMap,
    religions: &ReligionMap,
    cultures: &CultureMap,
) {
    let (width, height) = (voronoi.region_map.width, voronoi.region_map.height);
    for city in cities.iter_mut() {
        if city.x >= width || city.y >= height {
            continue;
        }
        city.religion = religions.religion_of(voronoi.region_at(city.x, city.y));
        city.culture = cultures.culture_at(city.x, city.y);
    }
    for country in countries.iter_mut() {
        let members: Vec<_> = country.cities.iter().filter_map(|&id| cities.get(id)).collect();
        country.religion = most_common(members.iter().filter_map(|c| c.religion));
        country.culture = most_common(members.iter().filter_map(|c| c.culture));
    }
}
