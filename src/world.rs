//! Generation pipeline and the finished atlas.
//!
//! [`WorldGenContext`] carries every intermediate field between stages. Each
//! stage reads what it needs from the context, fails with
//! [`GenError::MissingPrerequisite`] if an earlier stage has not run, and
//! stores its own output back. [`generate_with`] runs all ten in order.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::beliefs::{apply_labels, CultureGenerator, CultureMap, ReligionGenerator, ReligionMap};
use crate::biomes::classify_field;
use crate::cancel::CancelToken;
use crate::climate::generate_climate;
use crate::config::GenerationConfig;
use crate::error::{GenError, Halt, StageResult};
use crate::heightmap::generate_heightmap;
use crate::ids::CountryId;
use crate::rivers::{trace_rivers, RiverNetwork};
use crate::routes::{update_trade, Route, RouteGenerator};
use crate::seeds::WorldSeeds;
use crate::settlements::{target_city_count, Cities, CityPlacer, Placement};
use crate::territories::{Country, CountryGenerator, Territories, TerritoryInputs, VoronoiMap};
use crate::tilemap::Tilemap;

// =============================================================================
// REPORT
// =============================================================================

/// Timing and output size of one stage.
#[derive(Clone, Debug, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub elapsed_ms: f64,
    pub items: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct GenerationReport {
    pub stages: Vec<StageReport>,
}

impl GenerationReport {
    fn record(&mut self, stage: &'static str, started: Instant, items: usize) {
        self.stages.push(StageReport {
            stage,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            items,
        });
    }

    pub fn total_ms(&self) -> f64 {
        self.stages.iter().map(|s| s.elapsed_ms).sum()
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

// =============================================================================
// WORLD MAP
// =============================================================================

/// Everything one run produces.
#[derive(Clone, Debug, Serialize)]
pub struct WorldMap {
    pub width: usize,
    pub height: usize,
    pub seeds: WorldSeeds,
    pub sea_level: u8,
    pub heights: Tilemap<u8>,
    pub climate: Tilemap<u8>,
    pub biomes: Tilemap<u8>,
    pub rivers: RiverNetwork,
    pub cities: Cities,
    pub countries: Vec<Country>,
    pub voronoi: VoronoiMap,
    pub owner_map: Tilemap<Option<CountryId>>,
    pub routes: Vec<Route>,
    pub religions: ReligionMap,
    pub cultures: CultureMap,
    pub report: GenerationReport,
}

impl WorldMap {
    /// Row-major height values. Borrowed from the stored field, so repeated
    /// calls hand back the same buffer.
    pub fn height_map_1d(&self) -> &[u8] {
        self.heights.as_slice()
    }

    pub fn is_water(&self, x: usize, y: usize) -> bool {
        *self.heights.get(x, y) <= self.sea_level
    }

    pub fn country_at(&self, x: usize, y: usize) -> Option<&Country> {
        (*self.owner_map.get(x, y)).and_then(|id| self.countries.get(id.index()))
    }
}

/// How a run ended.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum GenerationOutcome {
    Completed(WorldMap),
    Cancelled,
}

impl GenerationOutcome {
    pub fn into_map(self) -> Option<WorldMap> {
        match self {
            GenerationOutcome::Completed(map) => Some(map),
            GenerationOutcome::Cancelled => None,
        }
    }

    /// Like `into_map`, with cancellation reported as `GenError::Cancelled`.
    pub fn into_result(self) -> Result<WorldMap, GenError> {
        match self {
            GenerationOutcome::Completed(map) => Ok(map),
            GenerationOutcome::Cancelled => Err(GenError::Cancelled),
        }
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

fn require<'a, T>(slot: &'a Option<T>, stage: &'static str, requires: &'static str) -> Result<&'a T, GenError> {
    slot.as_ref().ok_or(GenError::MissingPrerequisite { stage, requires })
}

fn require_mut<'a, T>(
    slot: &'a mut Option<T>,
    stage: &'static str,
    requires: &'static str,
) -> Result<&'a mut T, GenError> {
    slot.as_mut().ok_or(GenError::MissingPrerequisite { stage, requires })
}

/// Intermediate state of one generation run.
pub struct WorldGenContext {
    config: GenerationConfig,
    seeds: WorldSeeds,
    heights: Option<Tilemap<u8>>,
    climate: Option<Tilemap<u8>>,
    biomes: Option<Tilemap<u8>>,
    rivers: Option<RiverNetwork>,
    placement: Option<Placement>,
    territories: Option<Territories>,
    routes: Option<Vec<Route>>,
    religions: Option<ReligionMap>,
    cultures: Option<CultureMap>,
    report: GenerationReport,
}

impl WorldGenContext {
    /// Validate `config` and derive the stage seeds.
    pub fn new(config: GenerationConfig) -> Result<Self, GenError> {
        config.validate()?;
        let seeds = WorldSeeds::from_master(config.seed);
        Ok(Self {
            config,
            seeds,
            heights: None,
            climate: None,
            biomes: None,
            rivers: None,
            placement: None,
            territories: None,
            routes: None,
            religions: None,
            cultures: None,
            report: GenerationReport::default(),
        })
    }

    pub fn seeds(&self) -> &WorldSeeds {
        &self.seeds
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn heights(&self) -> Option<&Tilemap<u8>> {
        self.heights.as_ref()
    }

    /// Settlements placed so far, with their minimum spacing.
    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    pub fn report(&self) -> &GenerationReport {
        &self.report
    }

    /// Stages 2 and 3.
    pub fn run_heightmap(&mut self, token: &CancelToken) -> StageResult<()> {
        let started = Instant::now();
        let heights = generate_heightmap(&self.config, &self.seeds, token)?;
        self.report.record("heightmap", started, heights.len());
        self.heights = Some(heights);
        token.checkpoint()
    }

    /// Stage 4.
    pub fn run_climate(&mut self, token: &CancelToken) -> StageResult<()> {
        let started = Instant::now();
        let climate = generate_climate(&self.config, self.seeds.climate, token)?;
        self.report.record("climate", started, climate.len());
        self.climate = Some(climate);
        token.checkpoint()
    }

    /// Stage 5.
    pub fn run_biomes(&mut self, token: &CancelToken) -> StageResult<()> {
        let started = Instant::now();
        let heights = require(&self.heights, "biomes", "heightmap")?;
        let climate = require(&self.climate, "biomes", "climate")?;
        let biomes = classify_field(heights, climate, self.config.sea_level);
        self.report.record("biomes", started, biomes.len());
        self.biomes = Some(biomes);
        token.checkpoint()
    }

    /// Stage 6. Erodes the stored height field.
    pub fn run_rivers(&mut self, token: &CancelToken) -> StageResult<()> {
        let started = Instant::now();
        require(&self.biomes, "rivers", "biomes")?;
        let heights = require_mut(&mut self.heights, "rivers", "heightmap")?;
        let network = trace_rivers(heights, self.config.sea_level, self.seeds.rivers, token)?;
        self.report.record("rivers", started, network.rivers.len());
        self.rivers = Some(network);
        token.checkpoint()
    }

    /// Stage 7.
    pub fn run_cities(&mut self, token: &CancelToken) -> StageResult<()> {
        let started = Instant::now();
        let heights = require(&self.heights, "cities", "heightmap")?;
        let climate = require(&self.climate, "cities", "climate")?;
        let biomes = require(&self.biomes, "cities", "biomes")?;
        let rivers = require(&self.rivers, "cities", "rivers")?;

        let target = target_city_count(self.config.area(), self.config.pixels_per_city);
        let placement = CityPlacer::new(heights, climate, biomes, &rivers.river_map, self.config.sea_level)
            .place(target, self.seeds.cities, token)?;
        self.report.record("cities", started, placement.cities.len());
        self.placement = Some(placement);
        token.checkpoint()
    }

    /// Stage 8. Adds villages to the settlement arena.
    pub fn run_countries(&mut self, token: &CancelToken) -> StageResult<()> {
        let started = Instant::now();
        let heights = require(&self.heights, "countries", "heightmap")?;
        let climate = require(&self.climate, "countries", "climate")?;
        let biomes = require(&self.biomes, "countries", "biomes")?;
        let Placement { cities, score_map, min_distance, .. } =
            require_mut(&mut self.placement, "countries", "cities")?;

        let inputs = TerritoryInputs { heights, climate, biomes, score_map, min_distance: *min_distance };
        let territories = CountryGenerator::new(inputs, &self.config).generate(cities, self.seeds.countries, token)?;
        self.report.record("countries", started, territories.countries.len());
        self.territories = Some(territories);
        token.checkpoint()
    }

    /// Stage 9. Also refreshes each city's trade from its road count.
    pub fn run_routes(&mut self, token: &CancelToken) -> StageResult<()> {
        let started = Instant::now();
        require(&self.territories, "routes", "countries")?;
        let heights = require(&self.heights, "routes", "heightmap")?;
        let placement = require_mut(&mut self.placement, "routes", "cities")?;

        let routes = RouteGenerator::new(heights, self.config.sea_level, self.seeds.routes)
            .generate(&placement.cities, token)?;
        update_trade(&mut placement.cities, &routes);
        self.report.record("routes", started, routes.len());
        self.routes = Some(routes);
        token.checkpoint()
    }

    /// Stage 10: religions over the region graph, cultures over the pixels,
    /// then the labels on cities and countries.
    pub fn run_beliefs(&mut self, token: &CancelToken) -> StageResult<()> {
        let started = Instant::now();
        require(&self.routes, "beliefs", "routes")?;
        let heights = require(&self.heights, "beliefs", "heightmap")?;
        let placement = require_mut(&mut self.placement, "beliefs", "cities")?;
        let territories = require_mut(&mut self.territories, "beliefs", "countries")?;

        let religions =
            ReligionGenerator::new(&territories.voronoi).generate(&placement.cities, self.seeds.religions, token)?;
        token.checkpoint()?;
        let cultures = CultureGenerator::new(heights, &territories.voronoi, self.config.sea_level).generate(
            &placement.cities,
            self.seeds.cultures,
            token,
        )?;
        apply_labels(
            &mut placement.cities,
            &mut territories.countries,
            &territories.voronoi,
            &religions,
            &cultures,
        );

        self.report.record("beliefs", started, religions.religions.len() + cultures.cultures.len());
        self.religions = Some(religions);
        self.cultures = Some(cultures);
        token.checkpoint()
    }

    /// Run every stage in dependency order.
    pub fn run_all(&mut self, token: &CancelToken) -> StageResult<()> {
        token.checkpoint()?;
        self.run_heightmap(token)?;
        self.run_climate(token)?;
        self.run_biomes(token)?;
        self.run_rivers(token)?;
        self.run_cities(token)?;
        self.run_countries(token)?;
        self.run_routes(token)?;
        self.run_beliefs(token)
    }

    /// Assemble the finished map. Fails if any stage is still missing.
    pub fn finish(self) -> Result<WorldMap, GenError> {
        let missing = |requires| GenError::MissingPrerequisite { stage: "finish", requires };
        let heights = self.heights.ok_or_else(|| missing("heightmap"))?;
        let climate = self.climate.ok_or_else(|| missing("climate"))?;
        let biomes = self.biomes.ok_or_else(|| missing("biomes"))?;
        let rivers = self.rivers.ok_or_else(|| missing("rivers"))?;
        let placement = self.placement.ok_or_else(|| missing("cities"))?;
        let territories = self.territories.ok_or_else(|| missing("countries"))?;
        let routes = self.routes.ok_or_else(|| missing("routes"))?;
        let religions = self.religions.ok_or_else(|| missing("religions"))?;
        let cultures = self.cultures.ok_or_else(|| missing("cultures"))?;

        Ok(WorldMap {
            width: self.config.width,
            height: self.config.height,
            seeds: self.seeds,
            sea_level: self.config.sea_level,
            heights,
            climate,
            biomes,
            rivers,
            cities: placement.cities,
            countries: territories.countries,
            voronoi: territories.voronoi,
            owner_map: territories.owner_map,
            routes,
            religions,
            cultures,
            report: self.report,
        })
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Generate with the default configuration. Never cancelled.
pub fn generate(width: usize, height: usize, seed: u32) -> Result<WorldMap, GenError> {
    let config = GenerationConfig::new(width, height, seed);
    generate_with(&config, &CancelToken::new())?.into_result()
}

/// Generate with an explicit configuration, polling `token` between and
/// inside stages. Cancellation drops every partial field.
pub fn generate_with(config: &GenerationConfig, token: &CancelToken) -> Result<GenerationOutcome, GenError> {
    let mut ctx = WorldGenContext::new(config.clone())?;
    info!(width = config.width, height = config.height, seed = config.seed, "generating atlas");

    match ctx.run_all(token) {
        Ok(()) => {}
        Err(Halt::Cancelled) => {
            warn!("generation cancelled");
            return Ok(GenerationOutcome::Cancelled);
        }
        Err(Halt::Failed(err)) => return Err(err),
    }

    let map = ctx.finish()?;
    info!(
        cities = map.cities.len(),
        countries = map.countries.len(),
        routes = map.routes.len(),
        religions = map.religions.religions.len(),
        cultures = map.cultures.cultures.len(),
        elapsed_ms = map.report.total_ms(),
        "atlas generated"
    );
    Ok(GenerationOutcome::Completed(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_enforced() {
        let mut ctx = WorldGenContext::new(GenerationConfig::new(32, 32, 1)).unwrap();
        let token = CancelToken::new();
        match ctx.run_biomes(&token) {
            Err(Halt::Failed(GenError::MissingPrerequisite { stage, requires })) => {
                assert_eq!(stage, "biomes");
                assert_eq!(requires, "heightmap");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        ctx.run_heightmap(&token).unwrap();
        assert!(matches!(
            ctx.run_biomes(&token),
            Err(Halt::Failed(GenError::MissingPrerequisite { requires: "climate", .. }))
        ));
        assert!(matches!(ctx.finish(), Err(GenError::MissingPrerequisite { .. })));
    }

    #[test]
    fn test_oversized_map_rejected_before_work() {
        let config = GenerationConfig::new(5000, 10, 1);
        assert!(matches!(
            generate_with(&config, &CancelToken::new()),
            Err(GenError::DimensionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_precancelled_run_yields_no_map() {
        let token = CancelToken::new();
        token.cancel();
        let outcome = generate_with(&GenerationConfig::new(64, 64, 3), &token).unwrap();
        assert!(outcome.into_map().is_none());

        let outcome = generate_with(&GenerationConfig::new(64, 64, 3), &token).unwrap();
        assert!(matches!(outcome.into_result(), Err(GenError::Cancelled)));
    }

    #[test]
    fn test_report_lists_every_stage() {
        let map = generate(64, 64, 11).unwrap();
        for stage in ["heightmap", "climate", "biomes", "rivers", "cities", "countries", "routes", "beliefs"] {
            assert!(map.report.stage(stage).is_some(), "missing {}", stage);
        }
        // Villages join the arena after placement.
        assert!(map.report.stage("cities").unwrap().items <= map.cities.len());
    }

    #[test]
    fn test_height_map_1d_is_stored_buffer() {
        let map = generate(48, 48, 5).unwrap();
        let a = map.height_map_1d();
        let b = map.height_map_1d();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.len(), 48 * 48);
    }
}
