//! End-to-end properties of the generation pipeline.

use std::collections::HashSet;

use atlas_generator::biomes::Biome;
use atlas_generator::routes::terrain_ratios;
use atlas_generator::settlements::city::distance;
use atlas_generator::{generate, generate_with, CancelToken, GenerationConfig, GenerationOutcome, Halt, WorldGenContext};

#[test]
fn test_same_seed_same_atlas() {
    let a = generate(128, 128, 42).unwrap();
    let b = generate(128, 128, 42).unwrap();

    assert_eq!(a.heights, b.heights);
    assert_eq!(a.biomes, b.biomes);
    assert_eq!(a.climate, b.climate);
    assert_eq!(a.cities.len(), b.cities.len());
    for (x, y) in a.cities.iter().zip(b.cities.iter()) {
        assert_eq!((x.x, x.y, &x.name, x.population), (y.x, y.y, &y.name, y.population));
    }
    assert_eq!(a.countries.len(), b.countries.len());
    for (x, y) in a.countries.iter().zip(&b.countries) {
        assert_eq!(x.pixels, y.pixels);
        assert_eq!(x.cities, y.cities);
        assert_eq!(x.name, y.name);
    }
    let paths = |m: &atlas_generator::WorldMap| m.routes.iter().map(|r| r.path.clone()).collect::<Vec<_>>();
    assert_eq!(paths(&a), paths(&b));
    assert_eq!(a.religions.region_religion, b.religions.region_religion);
    assert_eq!(a.cultures.culture_map, b.cultures.culture_map);
}

#[test]
fn test_different_seeds_differ() {
    let a = generate(64, 64, 1).unwrap();
    let b = generate(64, 64, 2).unwrap();
    assert_ne!(a.heights, b.heights);
}

#[test]
fn test_countries_never_own_water_and_never_overlap() {
    let map = generate(160, 160, 42).unwrap();
    let heights = map.height_map_1d();
    let mut seen = HashSet::new();
    for country in &map.countries {
        for &p in &country.pixels {
            assert!(heights[p] > map.sea_level, "{} owns water pixel {}", country.name, p);
            assert!(seen.insert(p), "pixel {} owned twice", p);
        }
    }
}

#[test]
fn test_settlements_stand_on_scored_land() {
    let map = generate(160, 160, 7).unwrap();
    for city in map.cities.iter() {
        assert!(city.altitude > map.sea_level, "{} in the sea", city.name);
        assert!(*map.heights.get(city.x, city.y) > map.sea_level);
        assert!(city.score >= 0.0, "{} has score {}", city.name, city.score);
    }
}

#[test]
fn test_placed_cities_respect_spacing() {
    let token = CancelToken::new();
    let mut ctx = WorldGenContext::new(GenerationConfig::new(256, 256, 42)).unwrap();
    ctx.run_heightmap(&token).unwrap();
    ctx.run_climate(&token).unwrap();
    ctx.run_biomes(&token).unwrap();
    ctx.run_rivers(&token).unwrap();
    ctx.run_cities(&token).unwrap();

    let placement = ctx.placement().unwrap();
    let all: Vec<_> = placement.cities.iter().collect();
    for (i, a) in all.iter().enumerate() {
        for b in &all[i + 1..] {
            assert!(
                distance(a.position(), b.position()) >= placement.min_distance,
                "{} and {} too close",
                a.name,
                b.name
            );
        }
    }
}

#[test]
fn test_height_map_1d_is_idempotent() {
    let map = generate(64, 64, 3).unwrap();
    let first = map.height_map_1d().to_vec();
    let again = map.height_map_1d();
    assert_eq!(first.as_slice(), again);
    assert!(std::ptr::eq(map.height_map_1d(), again));
}

#[test]
fn test_two_hundred_square_seed_42() {
    let map = generate(200, 200, 42).unwrap();
    assert_eq!(map.height_map_1d().len(), 200 * 200);
    assert_eq!(map.biomes.len(), 200 * 200);
    let any_water = map.height_map_1d().iter().any(|&h| h <= map.sea_level);
    if any_water {
        assert!(map.biomes.as_slice().contains(&Biome::Water.id()));
    }
    for (i, &h) in map.height_map_1d().iter().enumerate() {
        assert_eq!(*map.biomes.at(i) == Biome::Water.id(), h <= map.sea_level);
    }
}

#[test]
fn test_all_water_map_is_empty_not_an_error() {
    let config = GenerationConfig { sea_level: 255, ..GenerationConfig::new(96, 96, 42) };
    let map = generate_with(&config, &CancelToken::new()).unwrap().into_map().unwrap();
    assert!(map.cities.is_empty());
    assert!(map.countries.is_empty());
    assert!(map.routes.is_empty());
    assert!(map.religions.religions.is_empty());
    assert!(map.cultures.cultures.is_empty());
}

#[test]
fn test_routes_stay_on_passable_land() {
    for seed in [42, 7, 1234] {
        let map = generate(192, 192, seed).unwrap();
        for route in &map.routes {
            let (water, mountain) = terrain_ratios(&route.path, &map.heights, map.sea_level);
            assert!(water < 0.01, "route {} water ratio {}", route.id, water);
            assert!(mountain < 0.10, "route {} mountain ratio {}", route.id, mountain);
            assert_eq!(route.path.first(), map.cities.get(route.from).map(|c| c.position()).as_ref());
            assert_eq!(route.path.last(), map.cities.get(route.to).map(|c| c.position()).as_ref());
        }
    }
}

#[test]
fn test_religions_partition_regions() {
    let map = generate(192, 192, 42).unwrap();
    let held: usize = map.religions.active().map(|r| r.regions.len()).sum();
    assert!(held <= map.voronoi.len());

    let mut owner = vec![None; map.voronoi.len()];
    for religion in map.religions.active() {
        for region in &religion.regions {
            assert!(owner[region.index()].is_none(), "region {} held twice", region);
            owner[region.index()] = Some(religion.id);
        }
    }
    assert_eq!(owner, map.religions.region_religion);
}

#[test]
fn test_cities_carry_labels() {
    let map = generate(192, 192, 42).unwrap();
    for city in map.cities.iter() {
        if let Some(culture) = city.culture {
            assert!(map.cultures.get(culture).is_some());
        }
        if let Some(religion) = city.religion {
            assert!(map.religions.get(religion).unwrap().is_active());
        }
    }
}

#[test]
fn test_cancelled_stage_unwinds() {
    let token = CancelToken::new();
    let mut ctx = WorldGenContext::new(GenerationConfig::new(128, 128, 9)).unwrap();
    ctx.run_heightmap(&token).unwrap();
    token.cancel();
    assert!(matches!(ctx.run_climate(&token), Err(Halt::Cancelled)));

    let outcome = generate_with(&GenerationConfig::new(128, 128, 9), &token).unwrap();
    assert!(matches!(outcome, GenerationOutcome::Cancelled));
}
