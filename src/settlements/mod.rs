//! Settlements: the city model and the placement engine.

pub mod city;
pub mod placement;

pub use city::{Cities, City, Government, Prosperity, Resources, SettlementTier, ThreatLevel};
pub use placement::{target_city_count, CityPlacer, Placement, ScoreMap};
