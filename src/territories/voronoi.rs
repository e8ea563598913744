//! Pixel Voronoi partition and its region adjacency graph.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::StageResult;
use crate::ids::{CityId, RegionId};
use crate::tilemap::Tilemap;

/// One Voronoi cell.
#[derive(Clone, Debug, Serialize)]
pub struct Region {
    pub id: RegionId,
    pub x: usize,
    pub y: usize,
    /// Settlement that generated this cell, `None` for fill points.
    pub anchor: Option<CityId>,
    /// Regions sharing a pixel edge with this one.
    pub neighbors: BTreeSet<RegionId>,
    /// Row-major pixel indices, ascending.
    #[serde(skip)]
    pub pixels: Vec<usize>,
}

impl Region {
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }
}

/// Regions plus the per-pixel region id.
#[derive(Clone, Debug, Serialize)]
pub struct VoronoiMap {
    pub regions: Vec<Region>,
    pub region_map: Tilemap<u32>,
}

impl VoronoiMap {
    pub fn region_at(&self, x: usize, y: usize) -> RegionId {
        RegionId(*self.region_map.get(x, y))
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Bucket grid answering nearest-point queries without scanning every point.
pub struct NearestIndex {
    points: Vec<(usize, usize)>,
    cell: usize,
    cols: usize,
    rows: usize,
    buckets: Vec<Vec<usize>>,
}

impl NearestIndex {
    pub fn new(points: &[(usize, usize)], width: usize, height: usize) -> Self {
        let area = (width * height).max(1);
        let cell = ((area as f64 / points.len().max(1) as f64).sqrt().ceil() as usize).max(1);
        let cols = width.div_ceil(cell).max(1);
        let rows = height.div_ceil(cell).max(1);
        let mut buckets = vec![Vec::new(); cols * rows];
        for (i, &(x, y)) in points.iter().enumerate() {
            let cx = (x / cell).min(cols - 1);
            let cy = (y / cell).min(rows - 1);
            buckets[cy * cols + cx].push(i);
        }
        Self { points: points.to_vec(), cell, cols, rows, buckets }
    }

    /// Index of the closest point; ties go to the lower index.
    pub fn nearest(&self, x: usize, y: usize) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let cx = (x / self.cell).min(self.cols - 1) as i64;
        let cy = (y / self.cell).min(self.rows - 1) as i64;
        let max_ring = self.cols.max(self.rows) as i64;
        let mut best: Option<(u64, usize)> = None;

        for ring in 0..=max_ring {
            for by in (cy - ring)..=(cy + ring) {
                if by < 0 || by >= self.rows as i64 {
                    continue;
                }
                for bx in (cx - ring)..=(cx + ring) {
                    if bx < 0 || bx >= self.cols as i64 {
                        continue;
                    }
                    // Only the ring's border; the inside was already scanned.
                    if (bx - cx).abs() != ring && (by - cy).abs() != ring {
                        continue;
                    }
                    for &i in &self.buckets[by as usize * self.cols + bx as usize] {
                        let (px, py) = self.points[i];
                        let dx = px as i64 - x as i64;
                        let dy = py as i64 - y as i64;
                        let key = ((dx * dx + dy * dy) as u64, i);
                        if best.map_or(true, |b| key < b) {
                            best = Some(key);
                        }
                    }
                }
            }
            // Anything in a farther ring is at least `ring * cell` away.
            if let Some((d2, _)) = best {
                let reach = (ring as u64) * self.cell as u64;
                if d2 <= reach * reach {
                    break;
                }
            }
        }
        best.map(|(_, i)| i)
    }
}

/// Partition the map by nearest generating point and record which regions
/// touch across a 4-neighbour pixel edge.
pub fn build_voronoi(
    points: &[(usize, usize)],
    anchors: &[Option<CityId>],
    width: usize,
    height: usize,
    token: &CancelToken,
) -> StageResult<VoronoiMap> {
    let index = NearestIndex::new(points, width, height);
    let mut region_map = Tilemap::new_with(width, height, 0u32);
    let mut regions: Vec<Region> = points
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| Region {
            id: RegionId::from_index(i),
            x,
            y,
            anchor: anchors.get(i).copied().flatten(),
            neighbors: BTreeSet::new(),
            pixels: Vec::new(),
        })
        .collect();

    for y in 0..height {
        if y % 64 == 0 {
            token.checkpoint()?;
        }
        for x in 0..width {
            if let Some(r) = index.nearest(x, y) {
                let idx = region_map.index(x, y);
                region_map.set_at(idx, r as u32);
                regions[r].pixels.push(idx);
            }
        }
    }

    for y in 0..height {
        for x in 0..width {
            let here = *region_map.get(x, y) as usize;
            let right = if x + 1 < width { Some(*region_map.get(x + 1, y) as usize) } else { None };
            let down = if y + 1 < height { Some(*region_map.get(x, y + 1) as usize) } else { None };
            for other in [right, down].into_iter().flatten() {
                if other != here {
                    regions[here].neighbors.insert(RegionId::from_index(other));
                    regions[other].neighbors.insert(RegionId::from_index(here));
                }
            }
        }
    }

    debug!(regions = regions.len(), "voronoi partition built");
    Ok(VoronoiMap { regions, region_map })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_nearest(points: &[(usize, usize)], x: usize, y: usize) -> usize {
        let mut best = (u64::MAX, 0);
        for (i, &(px, py)) in points.iter().enumerate() {
            let dx = px as i64 - x as i64;
            let dy = py as i64 - y as i64;
            let key = ((dx * dx + dy * dy) as u64, i);
            if key < best {
                best = key;
            }
        }
        best.1
    }

    #[test]
    fn test_index_matches_brute_force() {
        let points = vec![(3, 4), (40, 2), (17, 30), (60, 55), (8, 60), (33, 33), (33, 34)];
        let index = NearestIndex::new(&points, 64, 64);
        for y in 0..64 {
            for x in 0..64 {
                assert_eq!(index.nearest(x, y), Some(brute_nearest(&points, x, y)), "at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_ties_go_to_lower_index() {
        let points = vec![(0, 0), (4, 0)];
        let index = NearestIndex::new(&points, 5, 1);
        assert_eq!(index.nearest(2, 0), Some(0));
    }

    #[test]
    fn test_regions_cover_map_and_are_adjacent() {
        let points = vec![(2, 2), (12, 2), (7, 12)];
        let anchors = vec![Some(CityId(0)), None, None];
        let map = build_voronoi(&points, &anchors, 15, 15, &CancelToken::new()).unwrap();
        let total: usize = map.regions.iter().map(|r| r.pixel_count()).sum();
        assert_eq!(total, 225);
        assert_eq!(map.region_at(2, 2), RegionId(0));
        assert_eq!(map.regions[0].anchor, Some(CityId(0)));
        assert!(map.regions[0].neighbors.contains(&RegionId(1)));
        assert!(map.regions[1].neighbors.contains(&RegionId(0)));
        assert!(!map.regions[0].neighbors.contains(&RegionId(0)));
    }
}
