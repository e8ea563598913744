//! Seed management for atlas generation
//!
//! One master seed is expanded into independent sub-seeds, one per pipeline
//! stage. Only the stage indices below need to stay fixed for a seed to keep
//! producing the same map.

/// Seeds for every generation stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct WorldSeeds {
    /// Master seed (used for display/reference)
    pub master: u32,
    /// Base height field noise
    pub heightmap: u32,
    /// Multiplicative variation noise under the island mask
    pub variation: u32,
    /// Climate noise field
    pub climate: u32,
    /// River source rotation and wobble draws
    pub rivers: u32,
    /// Weighted city sampling and per-city flavor
    pub cities: u32,
    /// Capital count, villages, fill points, country noise
    pub countries: u32,
    /// Route drift noise
    pub routes: u32,
    /// Religion founders, names, schisms
    pub religions: u32,
    /// Culture fields and origins
    pub cultures: u32,
}

impl WorldSeeds {
    /// Derive all stage seeds from a master seed.
    pub fn from_master(master: u32) -> Self {
        Self {
            master,
            heightmap: master,
            variation: derive_seed(master, 1),
            climate: derive_seed(master, 2),
            rivers: derive_seed(master, 3),
            cities: derive_seed(master, 4),
            countries: derive_seed(master, 5),
            routes: derive_seed(master, 6),
            religions: derive_seed(master, 7),
            cultures: derive_seed(master, 8),
        }
    }
}

/// One round of the 32-bit xorshift (13, 17, 5).
#[inline]
fn xorshift32(mut x: u32) -> u32 {
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    x
}

/// Derive the `index`-th sub-seed of `seed` by applying xorshift `index` times.
///
/// `index == 0` returns the seed itself. Zero is a fixed point of xorshift, so
/// a zero state is replaced by the golden-ratio constant before stepping.
pub fn derive_seed(seed: u32, index: u32) -> u32 {
    let mut x = seed;
    for _ in 0..index {
        if x == 0 {
            x = 0x9E37_79B9;
        }
        x = xorshift32(x);
    }
    x
}

/// Display format for seeds (useful for sharing world configurations)
impl std::fmt::Display for WorldSeeds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WorldSeeds {{ master: {}, heightmap: {}, variation: {}, climate: {}, rivers: {}, \
             cities: {}, countries: {}, routes: {}, religions: {}, cultures: {} }}",
            self.master,
            self.heightmap,
            self.variation,
            self.climate,
            self.rivers,
            self.cities,
            self.countries,
            self.routes,
            self.religions,
            self.cultures,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_derivation() {
        let seeds1 = WorldSeeds::from_master(12345);
        let seeds2 = WorldSeeds::from_master(12345);
        assert_eq!(seeds1, seeds2);
    }

    #[test]
    fn test_different_stages_get_different_seeds() {
        let seeds = WorldSeeds::from_master(12345);
        assert_ne!(seeds.heightmap, seeds.variation);
        assert_ne!(seeds.variation, seeds.climate);
        assert_ne!(seeds.climate, seeds.rivers);
        assert_ne!(seeds.routes, seeds.religions);
    }

    #[test]
    fn test_derive_seed_is_iterated_xorshift() {
        assert_eq!(derive_seed(42, 0), 42);
        assert_eq!(derive_seed(42, 1), xorshift32(42));
        assert_eq!(derive_seed(42, 3), xorshift32(xorshift32(xorshift32(42))));
    }

    #[test]
    fn test_zero_seed_does_not_collapse() {
        let seeds = WorldSeeds::from_master(0);
        assert_ne!(seeds.variation, 0);
        assert_ne!(seeds.variation, seeds.climate);
    }
}
