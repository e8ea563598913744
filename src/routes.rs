//! Road network between settlements.
//!
//! A sparse graph is picked from the shortest city pairs, capped per city,
//! checked against the terrain along the straight line, and made connected
//! with a union-find pass. Each surviving edge is then walked with a
//! noise-steered path so roads meander instead of running straight.

use std::f64::consts::PI;

use noise::Perlin;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::StageResult;
use crate::ids::{CityId, RouteId};
use crate::noise_field::fbm;
use crate::settlements::Cities;
use crate::tilemap::Tilemap;

/// Edges kept per city before degree capping.
const EDGES_PER_CITY: f64 = 2.5;
const VILLAGE_MAX_DEGREE: usize = 2;
const MAX_DEGREE: usize = 4;
/// Sites scoring below this are capped like villages.
const LOW_SCORE: f64 = 100.0;

/// Straight lines crossing this share of invalid pixels are rejected.
const MAX_INVALID_LINE_RATIO: f64 = 0.10;
/// Final paths must stay under these shares.
const MAX_WATER_RATIO: f64 = 0.01;
const MAX_MOUNTAIN_RATIO: f64 = 0.10;
/// Impassable peaks for validation.
const MOUNTAIN_ALTITUDE: u8 = 230;
/// The path walker refuses to step above this altitude.
const STEP_MAX_ALTITUDE: u8 = 200;

const STEP_SIZE: f64 = 1.5;
const DRIFT_OCTAVES: u32 = 6;
const DRIFT_PERSISTENCE: f64 = 0.35;
const DRIFT_FREQUENCY: f64 = 0.05;
const ALTERNATE_OFFSETS: [f64; 6] = [0.3, -0.3, 0.6, -0.6, 0.9, -0.9];

pub const ROUTE_WIDTH: u8 = 1;
pub const ROUTE_COLOR: &str = "#6B4423";

#[derive(Clone, Debug, Serialize)]
pub struct Route {
    pub id: RouteId,
    pub from: CityId,
    pub to: CityId,
    pub path: Vec<(usize, usize)>,
    /// Lower of the two endpoint scores.
    pub importance: f64,
    pub width: u8,
    pub color: &'static str,
}

impl Route {
    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn connects(&self, city: CityId) -> bool {
        self.from == city || self.to == city
    }
}

/// Share of water and of mountain pixels along a path.
pub fn terrain_ratios(path: &[(usize, usize)], heights: &Tilemap<u8>, sea_level: u8) -> (f64, f64) {
    if path.is_empty() {
        return (0.0, 0.0);
    }
    let mut water = 0;
    let mut mountain = 0;
    for &(x, y) in path {
        let h = *heights.get(x, y);
        if h <= sea_level {
            water += 1;
        }
        if h > MOUNTAIN_ALTITUDE {
            mountain += 1;
        }
    }
    let n = path.len() as f64;
    (water as f64 / n, mountain as f64 / n)
}

/// Integer raster line from `a` to `b`, both endpoints included.
pub fn bresenham(a: (usize, usize), b: (usize, usize)) -> Vec<(usize, usize)> {
    let (mut x, mut y) = (a.0 as i64, a.1 as i64);
    let (x1, y1) = (b.0 as i64, b.1 as i64);
    let dx = (x1 - x).abs();
    let dy = (y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx - dy;
    let mut points = Vec::with_capacity((dx.max(dy) + 1) as usize);
    loop {
        points.push((x as usize, y as usize));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
    points
}

/// Union-find over city indices.
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
    components: usize,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self { parent: (0..n).collect(), rank: vec![0; n], components: n }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`; `false` if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        self.components -= 1;
        true
    }

    pub fn components(&self) -> usize {
        self.components
    }
}

#[derive(Clone, Copy, Debug)]
struct Edge {
    a: usize,
    b: usize,
    dist: f64,
}

pub struct RouteGenerator<'a> {
    heights: &'a Tilemap<u8>,
    sea_level: u8,
    drift: Perlin,
}

impl<'a> RouteGenerator<'a> {
    pub fn new(heights: &'a Tilemap<u8>, sea_level: u8, seed: u32) -> Self {
        Self { heights, sea_level, drift: Perlin::new(seed) }
    }

    fn is_steppable(&self, x: i64, y: i64) -> bool {
        if !self.heights.in_bounds(x, y) {
            return false;
        }
        let h = *self.heights.get(x as usize, y as usize);
        h > self.sea_level && h <= STEP_MAX_ALTITUDE
    }

    /// Straight-line check: fewer than 10 % water or peak pixels.
    pub fn line_is_valid(&self, a: (usize, usize), b: (usize, usize)) -> bool {
        let line = bresenham(a, b);
        let invalid = line
            .iter()
            .filter(|&&(x, y)| {
                let h = *self.heights.get(x, y);
                h <= self.sea_level || h > MOUNTAIN_ALTITUDE
            })
            .count();
        (invalid as f64 / line.len() as f64) < MAX_INVALID_LINE_RATIO
    }

    /// Walk from `start` toward `goal`, rotating the heading by the local
    /// drift noise. Blocked steps try alternate rotations; if all fail the
    /// walk stops and the rest is drawn as a straight line.
    pub fn drift_path(&self, start: (usize, usize), goal: (usize, usize)) -> Vec<(usize, usize)> {
        let (gx, gy) = (goal.0 as f64, goal.1 as f64);
        let (mut cx, mut cy) = (start.0 as f64, start.1 as f64);
        let total = ((gx - cx).powi(2) + (gy - cy).powi(2)).sqrt();
        let max_steps = (total * 2.0).ceil() as usize;
        let mut path = vec![start];

        for _ in 0..max_steps {
            let (dx, dy) = (gx - cx, gy - cy);
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < STEP_SIZE {
                break;
            }
            let (dir_x, dir_y) = (dx / dist, dy / dist);

            let px = cx.round().clamp(0.0, (self.heights.width - 1) as f64);
            let py = cy.round().clamp(0.0, (self.heights.height - 1) as f64);
            let n = fbm(&self.drift, px, py, DRIFT_OCTAVES, DRIFT_PERSISTENCE, DRIFT_FREQUENCY);
            let angle = n * (2.0 * PI / 3.0);

            let step = |theta: f64| {
                let (s, c) = theta.sin_cos();
                (cx + (dir_x * c - dir_y * s) * STEP_SIZE, cy + (dir_x * s + dir_y * c) * STEP_SIZE)
            };
            let fits = |p: (f64, f64)| self.is_steppable(p.0.round() as i64, p.1.round() as i64);

            let mut next = step(angle);
            if !fits(next) {
                match ALTERNATE_OFFSETS.iter().map(|o| step(angle + o)).find(|&p| fits(p)) {
                    Some(p) => next = p,
                    None => break,
                }
            }
            cx = next.0;
            cy = next.1;
            let pixel = (cx.round() as usize, cy.round() as usize);
            if path.last() != Some(&pixel) {
                path.push(pixel);
            }
        }

        if let Some(&last) = path.last() {
            if last != goal {
                path.extend(bresenham(last, goal).into_iter().skip(1));
            }
        }
        path
    }

    /// Stage 9: build the road network between `cities`.
    pub fn generate(&self, cities: &Cities, token: &CancelToken) -> StageResult<Vec<Route>> {
        let n = cities.len();
        if n < 2 {
            if n == 0 {
                warn!("no settlements, no routes generated");
            }
            return Ok(Vec::new());
        }
        let all = cities.as_slice();

        // All pairs, shortest first.
        let mut pairs = Vec::with_capacity(n * (n - 1) / 2);
        for a in 0..n {
            for b in (a + 1)..n {
                pairs.push(Edge { a, b, dist: all[a].distance_to(&all[b]) });
            }
        }
        pairs.sort_by(|e, f| e.dist.total_cmp(&f.dist).then(e.a.cmp(&f.a)).then(e.b.cmp(&f.b)));
        token.checkpoint()?;

        // Sparsify, then cap degrees.
        let keep = (n as f64 * EDGES_PER_CITY).ceil() as usize;
        let mut degree = vec![0usize; n];
        let mut edges: Vec<Edge> = Vec::new();
        for e in pairs.iter().take(keep) {
            let cap = |i: usize| {
                if all[i].score < LOW_SCORE || all[i].is_village() {
                    VILLAGE_MAX_DEGREE
                } else {
                    MAX_DEGREE
                }
            };
            if degree[e.a] < cap(e.a) && degree[e.b] < cap(e.b) {
                degree[e.a] += 1;
                degree[e.b] += 1;
                edges.push(*e);
            }
        }
        let capped = edges.len();

        edges.retain(|e| self.line_is_valid(all[e.a].position(), all[e.b].position()));
        let valid = edges.len();
        token.checkpoint()?;

        // Connect components with their cheapest valid bridges.
        let mut sets = DisjointSet::new(n);
        for e in &edges {
            sets.union(e.a, e.b);
        }
        for (i, e) in pairs.iter().enumerate() {
            if sets.components() == 1 {
                break;
            }
            if i % 1024 == 0 {
                token.checkpoint()?;
            }
            if sets.find(e.a) == sets.find(e.b) {
                continue;
            }
            if self.line_is_valid(all[e.a].position(), all[e.b].position()) {
                sets.union(e.a, e.b);
                edges.push(*e);
            }
        }
        let bridges = edges.len() - valid;

        let mut routes = Vec::new();
        let mut rejected = 0;
        for e in &edges {
            token.checkpoint()?;
            let (from, to) = (&all[e.a], &all[e.b]);
            let path = self.drift_path(from.position(), to.position());
            let (water, mountain) = terrain_ratios(&path, self.heights, self.sea_level);
            if water >= MAX_WATER_RATIO || mountain >= MAX_MOUNTAIN_RATIO {
                rejected += 1;
                continue;
            }
            routes.push(Route {
                id: RouteId::from_index(routes.len()),
                from: from.id,
                to: to.id,
                path,
                importance: from.score.min(to.score),
                width: ROUTE_WIDTH,
                color: ROUTE_COLOR,
            });
        }

        debug!(
            cities = n,
            capped_edges = capped,
            valid_edges = valid,
            bridges,
            components = sets.components(),
            routes = routes.len(),
            rejected,
            "routes generated"
        );
        Ok(routes)
    }
}

/// Recompute every city's trade from the number of roads that reach it.
pub fn update_trade(cities: &mut Cities, routes: &[Route]) {
    let mut counts = vec![0usize; cities.len()];
    for route in routes {
        for id in [route.from, route.to] {
            if let Some(c) = counts.get_mut(id.index()) {
                *c += 1;
            }
        }
    }
    for city in cities.iter_mut() {
        city.set_route_count(counts[city.id.index()]);
    }
}
