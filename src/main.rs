use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use atlas_generator::export::export_json;
use atlas_generator::settlements::SettlementTier;
use atlas_generator::{generate_with, CancelToken, GenerationConfig, GenerationOutcome};

#[derive(Parser, Debug)]
#[command(name = "atlas_generator")]
#[command(about = "Generate a deterministic fantasy atlas from a seed")]
struct Args {
    /// Width of the map in pixels (overrides the config file)
    #[arg(short = 'W', long)]
    width: Option<usize>,

    /// Height of the map in pixels (overrides the config file)
    #[arg(short = 'H', long)]
    height: Option<usize>,

    /// Random seed (uses random seed if neither this nor a config file sets one)
    #[arg(short, long)]
    seed: Option<u32>,

    /// JSON file with generation parameters; missing keys keep their defaults
    #[arg(long)]
    config: Option<String>,

    /// Write the generated atlas as JSON (e.g., "atlas.json")
    #[arg(long)]
    export: Option<String>,

    /// Log every stage at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => match GenerationConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path, "failed to load config: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => GenerationConfig {
            seed: rand::random(),
            ..GenerationConfig::default()
        },
    };
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let map = match generate_with(&config, &CancelToken::new()) {
        Ok(GenerationOutcome::Completed(map)) => map,
        Ok(GenerationOutcome::Cancelled) => {
            error!("generation was cancelled");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("generation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Atlas {}x{} (seed {})", map.width, map.height, map.seeds.master);
    let land = map.height_map_1d().iter().filter(|&&h| h > map.sea_level).count();
    println!("  Land: {:.1}%", 100.0 * land as f64 / (map.width * map.height) as f64);
    println!("  Rivers: {}", map.rivers.rivers.len());
    let villages = map.cities.iter().filter(|c| c.tier == SettlementTier::Village).count();
    println!("  Settlements: {} ({} villages)", map.cities.len(), villages);
    for country in &map.countries {
        let capital = map.cities.get(country.capital).map(|c| c.name.as_str()).unwrap_or("?");
        println!(
            "  {} - capital {}, {} cities, {} px, pop {}",
            country.name,
            capital,
            country.cities.len(),
            country.area,
            country.population
        );
    }
    println!("  Routes: {}", map.routes.len());
    for religion in &map.religions.religions {
        println!("  {} [{:?}] {} regions", religion.name, religion.status, religion.regions.len());
    }
    for culture in &map.cultures.cultures {
        println!("  {} ({:?}) {} px", culture.name, culture.terrain, culture.area);
    }

    if let Some(path) = &args.export {
        if let Err(e) = export_json(&map, path) {
            error!(path = %path, "export failed: {}", e);
            return ExitCode::FAILURE;
        }
        info!(path = %path, "wrote atlas");
    }
    ExitCode::SUCCESS
}
