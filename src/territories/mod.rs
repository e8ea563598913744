//! Territories: Voronoi regions, countries and pixel ownership.

pub mod country;
pub mod generator;
pub mod voronoi;

pub use country::Country;
pub use generator::{CountryGenerator, Territories, TerritoryInputs};
pub use voronoi::{build_voronoi, NearestIndex, Region, VoronoiMap};
