//! Settlements and their procedurally generated flavor.

use serde::Serialize;

use crate::biomes::Biome;
use crate::ids::{CityId, CountryId, CultureId, ReligionId};
use crate::naming::NameGenerator;
use crate::rng::SeededRng;

/// Settlement size class, derived from population.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SettlementTier {
    Village,
    Town,
    City,
    Metropolis,
}

impl SettlementTier {
    pub fn from_population(population: u32) -> Self {
        match population {
            0..=999 => Self::Village,
            1000..=4999 => Self::Town,
            5000..=19_999 => Self::City,
            _ => Self::Metropolis,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Village => "village",
            Self::Town => "town",
            Self::City => "city",
            Self::Metropolis => "metropolis",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Government {
    Democratic,
    Aristocratic,
    Theocratic,
    Mercantile,
}

impl Government {
    pub const ALL: [Government; 4] = [
        Government::Democratic,
        Government::Aristocratic,
        Government::Theocratic,
        Government::Mercantile,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Prosperity {
    Struggling,
    Modest,
    Thriving,
    Flourishing,
}

impl Prosperity {
    pub fn from_score(score: f64) -> Self {
        if score < 80.0 {
            Self::Struggling
        } else if score < 140.0 {
            Self::Modest
        } else if score < 200.0 {
            Self::Thriving
        } else {
            Self::Flourishing
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ThreatLevel {
    Low,
    Moderate,
    High,
    Severe,
}

impl ThreatLevel {
    /// Harsh terrain and high ground are dangerous to live in.
    pub fn from_terrain(altitude: u8, biome: Biome) -> Self {
        let roughness = match biome {
            Biome::Snow | Biome::Mountain => 3,
            Biome::Swamp | Biome::Jungle | Biome::Desert => 2,
            Biome::Hills | Biome::Tundra => 1,
            _ => 0,
        } + if altitude > 170 { 1 } else { 0 };
        match roughness {
            0 => Self::Low,
            1 => Self::Moderate,
            2 => Self::High,
            _ => Self::Severe,
        }
    }
}

/// Economic output of a settlement, each in `0..=100`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Resources {
    pub agriculture: u8,
    pub mining: u8,
    pub forestry: u8,
    pub fishing: u8,
    pub trade: u8,
}

impl Resources {
    /// Derived from the terrain under the settlement. Trade starts low and is
    /// recomputed once routes exist.
    pub fn from_terrain(altitude: u8, climate: u8, rng: &mut SeededRng) -> Self {
        let mut roll = |base: i32, spread_lo: i32, spread_hi: i32| -> u8 {
            (base + rng.range_inclusive(spread_lo, spread_hi)).clamp(0, 100) as u8
        };

        let agriculture = if altitude > 100 && altitude < 180 && climate > 80 && climate < 170 {
            roll(70, -20, 20)
        } else if altitude > 100 && altitude < 200 {
            roll(40, -20, 20)
        } else {
            roll(20, -10, 10)
        };
        let mining = if altitude > 160 { roll(60, -20, 20) } else { roll(20, -15, 15) };
        let forestry = if climate > 60 && climate < 140 { roll(65, -20, 20) } else { roll(25, -15, 15) };
        let fishing = if altitude < 130 { roll(55, -20, 20) } else { roll(10, -5, 10) };
        let trade = roll(20, -10, 10);

        Self { agriculture, mining, forestry, fishing, trade }
    }

    /// `(name, value)` pairs in a fixed order.
    pub fn entries(&self) -> [(&'static str, u8); 5] {
        [
            ("agriculture", self.agriculture),
            ("mining", self.mining),
            ("forestry", self.forestry),
            ("fishing", self.fishing),
            ("trade", self.trade),
        ]
    }

    /// Name of the strongest resource; the first one wins ties.
    pub fn specialization(&self) -> &'static str {
        let mut best = ("agriculture", self.agriculture);
        for entry in self.entries() {
            if entry.1 > best.1 {
                best = entry;
            }
        }
        best.0
    }

    /// Trade value for a settlement touched by `routes` roads.
    pub fn trade_for_routes(routes: usize) -> u8 {
        if routes == 0 {
            20
        } else {
            (30 + 20 * routes).min(100) as u8
        }
    }
}

fn landmark_for(biome: Biome, rng: &mut SeededRng) -> String {
    let options: &[&str] = match biome {
        Biome::Beach => &["lighthouse", "harbor fortress", "sea cave shrine"],
        Biome::Plain | Biome::Grassland => &["great market", "standing stones", "old windmill"],
        Biome::Forest => &["elder tree", "hunting lodge", "moss-covered temple"],
        Biome::Desert => &["oasis well", "buried ziggurat", "sandstone gate"],
        Biome::Hills => &["hill fort", "terraced vineyards", "watchtower"],
        Biome::Mountain | Biome::Snow => &["cliffside monastery", "deep mine", "ice-bound citadel"],
        Biome::Jungle => &["vine-choked pyramid", "canopy bridge", "serpent idol"],
        Biome::Swamp => &["stilt hall", "drowned chapel", "bog causeway"],
        Biome::Tundra => &["frost cairn", "mammoth bone hall", "reindeer corrals"],
        Biome::Water => &["sunken pier"],
    };
    rng.choice(options).copied().unwrap_or("town square").to_string()
}

/// A placed settlement.
#[derive(Clone, Debug, Serialize)]
pub struct City {
    pub id: CityId,
    pub name: String,
    pub x: usize,
    pub y: usize,
    pub seed: u32,

    pub altitude: u8,
    pub climate: u8,
    pub biome: Biome,
    /// Placement desirability at the settlement's pixel.
    pub score: f64,

    pub population: u32,
    pub tier: SettlementTier,
    /// Negative: years before year 0.
    pub founded_year: i32,
    pub government: Government,
    pub resources: Resources,
    pub specialization: &'static str,
    pub landmark: String,
    pub prosperity: Prosperity,
    pub threat: ThreatLevel,

    pub is_capital: bool,
    pub country: Option<CountryId>,
    pub religion: Option<ReligionId>,
    pub culture: Option<CultureId>,
}

impl City {
    /// Build a settlement and roll every derived attribute from its own seed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: CityId,
        position: (usize, usize),
        seed: u32,
        altitude: u8,
        climate: u8,
        biome: Biome,
        score: f64,
    ) -> Self {
        let mut rng = SeededRng::new(seed);

        let base = (score * 50.0).floor().max(0.0) as i32 + 500;
        let jitter = base / 10;
        let population = (base + rng.range_inclusive(-jitter, jitter)).max(1) as u32;
        let founded_year = -rng.range_inclusive(100, 1000);
        let name = NameGenerator::city_name(&mut rng);
        let government = *rng.choice(&Government::ALL).unwrap_or(&Government::Aristocratic);
        let resources = Resources::from_terrain(altitude, climate, &mut rng);
        let landmark = landmark_for(biome, &mut rng);

        Self {
            id,
            name,
            x: position.0,
            y: position.1,
            seed,
            altitude,
            climate,
            biome,
            score,
            population,
            tier: SettlementTier::from_population(population),
            founded_year,
            government,
            specialization: resources.specialization(),
            resources,
            landmark,
            prosperity: Prosperity::from_score(score),
            threat: ThreatLevel::from_terrain(altitude, biome),
            is_capital: false,
            country: None,
            religion: None,
            culture: None,
        }
    }

    pub fn position(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    pub fn is_village(&self) -> bool {
        self.tier == SettlementTier::Village
    }

    pub fn distance_to(&self, other: &City) -> f64 {
        distance(self.position(), other.position())
    }

    /// Shrink to a hamlet-sized village regardless of site score.
    pub fn demote_to_village(&mut self) {
        self.population = (self.population / 10).clamp(100, 999);
        self.tier = SettlementTier::Village;
    }

    /// Recompute trade after the road network is known.
    pub fn set_route_count(&mut self, routes: usize) {
        self.resources.trade = Resources::trade_for_routes(routes);
        self.specialization = self.resources.specialization();
    }
}

pub fn distance(a: (usize, usize), b: (usize, usize)) -> f64 {
    let dx = a.0 as f64 - b.0 as f64;
    let dy = a.1 as f64 - b.1 as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Arena of every settlement, in creation order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Cities {
    cities: Vec<City>,
}

impl Cities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a settlement with the next id and return that id.
    pub fn spawn(
        &mut self,
        position: (usize, usize),
        seed: u32,
        altitude: u8,
        climate: u8,
        biome: Biome,
        score: f64,
    ) -> CityId {
        let id = CityId::from_index(self.cities.len());
        self.cities.push(City::new(id, position, seed, altitude, climate, biome, score));
        id
    }

    pub fn get(&self, id: CityId) -> Option<&City> {
        self.cities.get(id.index())
    }

    pub fn get_mut(&mut self, id: CityId) -> Option<&mut City> {
        self.cities.get_mut(id.index())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, City> {
        self.cities.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, City> {
        self.cities.iter_mut()
    }

    pub fn as_slice(&self) -> &[City] {
        &self.cities
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn min_score(&self) -> f64 {
        if self.cities.is_empty() {
            return 0.0;
        }
        self.cities.iter().map(|c| c.score).fold(f64::INFINITY, f64::min)
    }

    pub fn max_score(&self) -> f64 {
        if self.cities.is_empty() {
            return 1.0;
        }
        self.cities.iter().map(|c| c.score).fold(f64::NEG_INFINITY, f64::max)
    }
}
