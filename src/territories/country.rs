//! Countries and their derived profile.

use serde::Serialize;

use crate::biomes::Biome;
use crate::ids::{CityId, CountryId, CultureId, ReligionId};
use crate::settlements::{Cities, Government, Resources};
use crate::tilemap::Tilemap;

/// Golden angle in degrees, spreads consecutive hues evenly.
const GOLDEN_ANGLE: f64 = 137.508;

#[derive(Clone, Debug, Serialize)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
    pub seed: u32,
    pub color: [u8; 3],
    /// Always the first entry of `cities`.
    pub capital: CityId,
    pub cities: Vec<CityId>,
    /// Row-major pixel indices, ascending.
    #[serde(skip)]
    pub pixels: Vec<usize>,
    pub area: usize,
    pub population: u64,
    pub dominant_biome: Biome,
    pub mean_climate: f64,
    pub government: Government,
    pub founded_year: i32,
    pub resources: Resources,
    /// Unit vector the realm prefers to expand along.
    pub preferred_direction: (f64, f64),
    pub religion: Option<ReligionId>,
    pub culture: Option<CultureId>,
}

impl Country {
    pub fn new(id: CountryId, name: String, seed: u32, capital: CityId, preferred_direction: (f64, f64)) -> Self {
        Self {
            id,
            name,
            seed,
            color: country_color(seed),
            capital,
            cities: vec![capital],
            pixels: Vec::new(),
            area: 0,
            population: 0,
            dominant_biome: Biome::Plain,
            mean_climate: 0.0,
            government: Government::Aristocratic,
            founded_year: 0,
            resources: Resources::default(),
            preferred_direction,
            religion: None,
            culture: None,
        }
    }

    pub fn contains_city(&self, city: CityId) -> bool {
        self.cities.contains(&city)
    }

    /// Fill in everything derived from member cities and owned pixels.
    pub fn update_profile(&mut self, cities: &Cities, biomes: &Tilemap<u8>, climate: &Tilemap<u8>) {
        self.area = self.pixels.len();

        let members: Vec<_> = self.cities.iter().filter_map(|&id| cities.get(id)).collect();
        self.population = members.iter().map(|c| c.population as u64).sum();
        if let Some(capital) = cities.get(self.capital) {
            self.government = capital.government;
        }
        self.founded_year = members.iter().map(|c| c.founded_year).min().unwrap_or(0);

        if !members.is_empty() {
            let n = members.len() as u32;
            let avg = |f: fn(&Resources) -> u8| -> u8 {
                (members.iter().map(|c| f(&c.resources) as u32).sum::<u32>() / n) as u8
            };
            self.resources = Resources {
                agriculture: avg(|r| r.agriculture),
                mining: avg(|r| r.mining),
                forestry: avg(|r| r.forestry),
                fishing: avg(|r| r.fishing),
                trade: avg(|r| r.trade),
            };
        }

        let mut counts = [0usize; Biome::ALL.len()];
        let mut climate_sum = 0u64;
        for &p in &self.pixels {
            let b = *biomes.at(p) as usize;
            if b < counts.len() {
                counts[b] += 1;
            }
            climate_sum += *climate.at(p) as u64;
        }
        if !self.pixels.is_empty() {
            // First maximum wins, so ties favour the lower biome id.
            let mut best = 0;
            for (i, &c) in counts.iter().enumerate() {
                if c > counts[best] {
                    best = i;
                }
            }
            self.dominant_biome = Biome::from_id(best as u8).unwrap_or(Biome::Plain);
            self.mean_climate = climate_sum as f64 / self.pixels.len() as f64;
        }
    }
}

/// Deterministic HSL color from a seed, returned as RGB.
pub fn country_color(seed: u32) -> [u8; 3] {
    let h = (seed as f64 * GOLDEN_ANGLE) % 360.0;
    let s = (70 + seed % 20) as f64 / 100.0;
    let l = (50 + seed % 15) as f64 / 100.0;
    hsl_to_rgb(h, s, l)
}

pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> [u8; 3] {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_byte = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_byte(r), to_byte(g), to_byte(b)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsl_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), [255, 0, 0]);
        assert_eq!(hsl_to_rgb(120.0, 1.0, 0.5), [0, 255, 0]);
        assert_eq!(hsl_to_rgb(240.0, 1.0, 0.5), [0, 0, 255]);
    }

    #[test]
    fn test_colors_differ_between_seeds() {
        assert_ne!(country_color(1), country_color(2));
        assert_eq!(country_color(5), country_color(5));
    }

    #[test]
    fn test_profile_from_members() {
        let mut cities = Cities::new();
        let a = cities.spawn((1, 1), 3, 150, 120, Biome::Plain, 100.0);
        let b = cities.spawn((3, 1), 4, 150, 120, Biome::Plain, 50.0);
        let biomes = Tilemap::new_with(4, 4, Biome::Forest.id());
        let climate = Tilemap::new_with(4, 4, 100u8);

        let mut country = Country::new(CountryId(0), "Testland".into(), 9, a, (1.0, 0.0));
        country.cities.push(b);
        country.pixels = (0..8).collect();
        country.update_profile(&cities, &biomes, &climate);

        let expected_pop = cities.get(a).unwrap().population as u64 + cities.get(b).unwrap().population as u64;
        assert_eq!(country.population, expected_pop);
        assert_eq!(country.area, 8);
        assert_eq!(country.dominant_biome, Biome::Forest);
        assert_eq!(country.mean_climate, 100.0);
        assert_eq!(country.government, cities.get(a).unwrap().government);
        let oldest = cities.get(a).unwrap().founded_year.min(cities.get(b).unwrap().founded_year);
        assert_eq!(country.founded_year, oldest);
    }
}
