//! Climate field.
//!
//! On this flat atlas climate is an independent noise field rather than a
//! latitude model: low values read as cold, high values as hot and wet.

use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::GenerationConfig;
use crate::error::StageResult;
use crate::noise_field::synthesize_params;
use crate::tilemap::Tilemap;

pub fn generate_climate(config: &GenerationConfig, seed: u32, token: &CancelToken) -> StageResult<Tilemap<u8>> {
    let climate = synthesize_params(config.width, config.height, seed, &config.climate_noise, token)?;
    let sum: u64 = climate.as_slice().iter().map(|&c| c as u64).sum();
    debug!(mean = sum as f64 / climate.len().max(1) as f64, "climate field ready");
    Ok(climate)
}

/// Five coarse climate bands used by city scoring and culture tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ClimateBand {
    Polar,
    CoolTemperate,
    WarmTemperate,
    Tropical,
    Arid,
}

impl ClimateBand {
    pub fn from_value(climate: u8) -> Self {
        match climate {
            0..=84 => Self::Polar,
            85..=126 => Self::CoolTemperate,
            127..=169 => Self::WarmTemperate,
            170..=209 => Self::Tropical,
            _ => Self::Arid,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Polar => "polar",
            Self::CoolTemperate => "cool temperate",
            Self::WarmTemperate => "warm temperate",
            Self::Tropical => "tropical",
            Self::Arid => "arid",
        }
    }
}

impl std::fmt::Display for ClimateBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
