//! River tracing
//!
//! Rivers start on high ground and walk downhill one pixel at a time until
//! they reach the sea, run out of unvisited neighbours, or hit the iteration
//! cap. Each kept river carves its path into the height field.

use serde::Serialize;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::StageResult;
use crate::rng::SeededRng;
use crate::tilemap::Tilemap;

/// Minimum altitude of a river source.
pub const SOURCE_ALTITUDE: u8 = 200;
/// Probability of taking the lowest neighbour rather than the second lowest.
const STEEPEST_PROBABILITY: f64 = 0.85;
/// Rivers that never reach the sea must be longer than this to be kept.
const MIN_INLAND_LENGTH: usize = 5;
const CENTER_EROSION: u8 = 3;
const SIDE_EROSION: u8 = 1;

/// How a trace ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RiverEnd {
    Sea,
    DeadEnd,
    IterationCap,
}

#[derive(Clone, Debug, Serialize)]
pub struct River {
    pub id: usize,
    /// Source first.
    pub path: Vec<(usize, usize)>,
    pub end: RiverEnd,
}

impl River {
    pub fn source(&self) -> Option<(usize, usize)> {
        self.path.first().copied()
    }

    pub fn mouth(&self) -> Option<(usize, usize)> {
        self.path.last().copied()
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// All rivers plus the byte map marking river pixels with 1.
#[derive(Clone, Debug, Serialize)]
pub struct RiverNetwork {
    pub rivers: Vec<River>,
    pub river_map: Tilemap<u8>,
}

/// Number of rivers attempted for a map of this size.
pub fn river_count(width: usize, height: usize) -> usize {
    1 + (width + height) / 200
}

/// Walk downhill from `start`. Returns the path and how it ended.
///
/// `visited` must be all `false` on entry and is restored before returning.
fn trace(
    heights: &Tilemap<u8>,
    start: (usize, usize),
    sea_level: u8,
    rng: &mut SeededRng,
    visited: &mut [bool],
) -> (Vec<(usize, usize)>, RiverEnd) {
    let max_iterations = (heights.width + heights.height) * 5;
    let mut path = vec![start];
    visited[heights.index(start.0, start.1)] = true;
    let mut current = start;
    let mut end = RiverEnd::IterationCap;

    for _ in 0..max_iterations {
        if *heights.get(current.0, current.1) <= sea_level {
            end = RiverEnd::Sea;
            break;
        }

        let mut options: Vec<((usize, usize), u8)> = heights
            .neighbors_8(current.0, current.1)
            .into_iter()
            .filter(|&(x, y)| !visited[heights.index(x, y)])
            .map(|(x, y)| ((x, y), *heights.get(x, y)))
            .collect();
        if options.is_empty() {
            end = RiverEnd::DeadEnd;
            break;
        }
        options.sort_by_key(|&(_, h)| h);

        let pick = if rng.chance(STEEPEST_PROBABILITY) || options.len() < 2 { 0 } else { 1 };
        current = options[pick].0;
        visited[heights.index(current.0, current.1)] = true;
        path.push(current);
    }

    // The cap can land exactly on the sea pixel.
    if end == RiverEnd::IterationCap && *heights.get(current.0, current.1) <= sea_level {
        end = RiverEnd::Sea;
    }

    for &(x, y) in &path {
        visited[heights.index(x, y)] = false;
    }
    (path, end)
}

/// Lower land along the path: the path pixel by 3, its 4-neighbours by 1,
/// never below `sea_level + 1`. Water is left untouched.
pub fn erode_path(heights: &mut Tilemap<u8>, path: &[(usize, usize)], sea_level: u8) {
    let floor = sea_level.saturating_add(1);
    let lower = |heights: &mut Tilemap<u8>, x: usize, y: usize, amount: u8| {
        let h = *heights.get(x, y);
        if h > sea_level {
            heights.set(x, y, h.saturating_sub(amount).max(floor));
        }
    };
    for &(x, y) in path {
        lower(heights, x, y, CENTER_EROSION);
        for (nx, ny) in heights.neighbors(x, y) {
            lower(heights, nx, ny, SIDE_EROSION);
        }
    }
}

/// Stage 6: trace rivers from high ground and erode the height field.
pub fn trace_rivers(
    heights: &mut Tilemap<u8>,
    sea_level: u8,
    seed: u32,
    token: &CancelToken,
) -> StageResult<RiverNetwork> {
    let mut river_map = Tilemap::new_with(heights.width, heights.height, 0u8);
    let mut rivers = Vec::new();

    let candidates: Vec<usize> = heights
        .as_slice()
        .iter()
        .enumerate()
        .filter(|(_, &h)| h >= SOURCE_ALTITUDE)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        debug!("no river sources above altitude {}", SOURCE_ALTITUDE);
        return Ok(RiverNetwork { rivers, river_map });
    }

    let count = river_count(heights.width, heights.height);
    let stride = (candidates.len() / count).max(1);
    let mut rng = SeededRng::new(seed);
    let mut visited = vec![false; heights.len()];

    for i in 0..count {
        token.checkpoint()?;
        let slot = (seed as usize).wrapping_add(i * stride) % candidates.len();
        let start_idx = candidates[slot];
        if *river_map.at(start_idx) != 0 {
            continue;
        }
        let start = heights.coords(start_idx);

        let (path, end) = trace(heights, start, sea_level, &mut rng, &mut visited);
        if end != RiverEnd::Sea && path.len() <= MIN_INLAND_LENGTH {
            continue;
        }

        erode_path(heights, &path, sea_level);
        for &(x, y) in &path {
            river_map.set(x, y, 1);
        }
        rivers.push(River { id: rivers.len(), path, end });
    }

    debug!(
        rivers = rivers.len(),
        reached_sea = rivers.iter().filter(|r| r.end == RiverEnd::Sea).count(),
        "rivers traced"
    );
    Ok(RiverNetwork { rivers, river_map })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A ramp sloping down to the left edge, where the sea is.
    fn ramp(width: usize, height: usize) -> Tilemap<u8> {
        let mut map = Tilemap::new_with(width, height, 0u8);
        for y in 0..height {
            for x in 0..width {
                map.set(x, y, (100 + x * 4).min(255) as u8);
            }
        }
        map
    }

    #[test]
    fn test_river_count_scales_with_size() {
        assert_eq!(river_count(100, 50), 1);
        assert_eq!(river_count(200, 200), 3);
    }

    #[test]
    fn test_river_runs_downhill_to_sea() {
        let mut heights = ramp(40, 10);
        let network = trace_rivers(&mut heights, 127, 7, &CancelToken::new()).unwrap();
        assert!(!network.rivers.is_empty());
        let river = &network.rivers[0];
        assert_eq!(river.end, RiverEnd::Sea);
        let (sx, _) = river.source().unwrap();
        let (mx, _) = river.mouth().unwrap();
        assert!(mx < sx, "river should flow toward the low edge");
    }

    #[test]
    fn test_path_never_revisits() {
        let mut heights = ramp(40, 10);
        let network = trace_rivers(&mut heights, 127, 3, &CancelToken::new()).unwrap();
        for river in &network.rivers {
            let mut seen = std::collections::HashSet::new();
            for p in &river.path {
                assert!(seen.insert(*p), "pixel {:?} visited twice", p);
            }
        }
    }

    #[test]
    fn test_erosion_floors_at_sea_level() {
        let mut heights = Tilemap::new_with(5, 5, 129u8);
        heights.set(0, 0, 100);
        erode_path(&mut heights, &[(2, 2), (0, 0)], 127);
        assert_eq!(*heights.get(2, 2), 128);
        assert_eq!(*heights.get(2, 1), 128);
        assert_eq!(*heights.get(4, 4), 129);
        assert_eq!(*heights.get(0, 0), 100, "water is not eroded");
    }

    #[test]
    fn test_no_sources_no_rivers() {
        let mut heights = Tilemap::new_with(30, 30, 150u8);
        let network = trace_rivers(&mut heights, 127, 1, &CancelToken::new()).unwrap();
        assert!(network.rivers.is_empty());
        assert!(network.river_map.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_rivers_deterministic() {
        let mut a = ramp(60, 30);
        let mut b = ramp(60, 30);
        let na = trace_rivers(&mut a, 127, 11, &CancelToken::new()).unwrap();
        let nb = trace_rivers(&mut b, 127, 11, &CancelToken::new()).unwrap();
        assert_eq!(a, b);
        assert_eq!(na.river_map, nb.river_map);
    }
}
