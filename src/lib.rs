//! Atlas generation library
//!
//! Deterministic fantasy maps from one seed: terrain, rivers, settlements,
//! realms, roads, faiths and cultures.

pub mod beliefs;
pub mod biomes;
pub mod cancel;
pub mod climate;
pub mod config;
pub mod error;
pub mod export;
pub mod heightmap;
pub mod ids;
pub mod naming;
pub mod noise_field;
pub mod rivers;
pub mod rng;
pub mod routes;
pub mod seeds;
pub mod settlements;
pub mod territories;
pub mod tilemap;
pub mod world;

pub use cancel::CancelToken;
pub use config::{GenerationConfig, NoiseParams};
pub use error::{GenError, Halt, StageResult};
pub use world::{generate, generate_with, GenerationOutcome, GenerationReport, WorldGenContext, WorldMap};
