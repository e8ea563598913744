//! Biome classification
//!
//! A pure lookup from (altitude, climate) to one of twelve biome ids. The
//! field itself is stored as raw ids so it can be compared byte for byte.

use serde::Serialize;
use tracing::debug;

use crate::tilemap::Tilemap;

/// Discrete terrain category. The discriminant is the stored biome id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum Biome {
    Water = 0,
    Beach = 1,
    Plain = 2,
    Forest = 3,
    Grassland = 4,
    Desert = 5,
    Hills = 6,
    Mountain = 7,
    Snow = 8,
    Jungle = 9,
    Swamp = 10,
    Tundra = 11,
}

impl Biome {
    pub const ALL: [Biome; 12] = [
        Biome::Water,
        Biome::Beach,
        Biome::Plain,
        Biome::Forest,
        Biome::Grassland,
        Biome::Desert,
        Biome::Hills,
        Biome::Mountain,
        Biome::Snow,
        Biome::Jungle,
        Biome::Swamp,
        Biome::Tundra,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Biome::Water => "Water",
            Biome::Beach => "Beach",
            Biome::Plain => "Plain",
            Biome::Forest => "Forest",
            Biome::Grassland => "Grassland",
            Biome::Desert => "Desert",
            Biome::Hills => "Hills",
            Biome::Mountain => "Mountain",
            Biome::Snow => "Snow",
            Biome::Jungle => "Jungle",
            Biome::Swamp => "Swamp",
            Biome::Tundra => "Tundra",
        }
    }

    /// Settlement desirability adjustment for this biome.
    pub fn settlement_bonus(self) -> f64 {
        match self {
            Biome::Water => -100.0,
            Biome::Beach => 20.0,
            Biome::Plain => 50.0,
            Biome::Forest => 60.0,
            Biome::Grassland => 45.0,
            Biome::Desert => -30.0,
            Biome::Hills => 40.0,
            Biome::Mountain => -40.0,
            Biome::Snow => -60.0,
            Biome::Jungle => 30.0,
            Biome::Swamp => -20.0,
            Biome::Tundra => 0.0,
        }
    }

    pub fn is_water(self) -> bool {
        self == Biome::Water
    }
}

impl std::fmt::Display for Biome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Classify one pixel.
///
/// Branch order matters: the swamp and tropical overrides are tested before
/// the generic altitude bands so they win where they overlap.
pub fn classify(altitude: u8, climate: u8, sea_level: u8) -> Biome {
    if altitude <= sea_level {
        return Biome::Water;
    }

    // Humid lowland
    if (120..=140).contains(&altitude) && (120..=170).contains(&climate) {
        return Biome::Swamp;
    }
    // Tropical
    if (135..=180).contains(&altitude) && (170..=215).contains(&climate) {
        return Biome::Jungle;
    }

    match altitude {
        0..=135 => Biome::Beach,
        136..=160 => match climate {
            0..=59 => Biome::Tundra,
            60..=109 => Biome::Forest,
            110..=149 => Biome::Plain,
            150..=169 => Biome::Grassland,
            _ => Biome::Desert,
        },
        161..=180 => Biome::Hills,
        181..=200 => Biome::Mountain,
        _ => Biome::Snow,
    }
}

/// Classify every pixel of a height/climate pair into a field of biome ids.
pub fn classify_field(heights: &Tilemap<u8>, climate: &Tilemap<u8>, sea_level: u8) -> Tilemap<u8> {
    let mut biomes = Tilemap::new_with(heights.width, heights.height, 0u8);
    let mut counts = [0usize; 12];
    for idx in 0..heights.len() {
        let biome = classify(*heights.at(idx), *climate.at(idx), sea_level);
        counts[biome as usize] += 1;
        biomes.set_at(idx, biome.id());
    }
    debug!(
        water = counts[Biome::Water as usize],
        forest = counts[Biome::Forest as usize],
        mountain = counts[Biome::Mountain as usize],
        "biomes classified"
    );
    biomes
}
