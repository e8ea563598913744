use serde::Serialize;

/// A dense 2D grid stored row-major (`index = y * width + x`).
///
/// Unlike a globe projection the atlas is a flat rectangle: nothing wraps,
/// neighbour queries simply stop at the edges.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tilemap<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Tilemap<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }
}

impl<T: Clone> Tilemap<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap an existing row-major buffer. Returns `None` if the length does not
    /// match the dimensions.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self { width, height, data })
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Inverse of [`Tilemap::index`].
    #[inline]
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx % self.width, idx / self.width)
    }

    #[inline]
    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let idx = self.index(x, y);
        &mut self.data[idx]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Direct access by flat index.
    pub fn at(&self, idx: usize) -> &T {
        &self.data[idx]
    }

    pub fn set_at(&mut self, idx: usize, value: T) {
        self.data[idx] = value;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The row-major backing buffer.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// 4-connected neighbours (left, right, up, down) that lie inside the map.
    pub fn neighbors(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        let mut result = Vec::with_capacity(4);
        if x > 0 {
            result.push((x - 1, y));
        }
        if x + 1 < self.width {
            result.push((x + 1, y));
        }
        if y > 0 {
            result.push((x, y - 1));
        }
        if y + 1 < self.height {
            result.push((x, y + 1));
        }
        result
    }

    /// 8-connected neighbours in a fixed scan order (row above, same row, row
    /// below; left to right).
    pub fn neighbors_8(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        let mut result = Vec::with_capacity(8);
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if self.in_bounds(nx, ny) {
                    result.push((nx as usize, ny as usize));
                }
            }
        }
        result
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let width = self.width;
        self.data.iter().enumerate().map(move |(idx, val)| (idx % width, idx / width, val))
    }

    /// Build a new map of the same shape by applying `f` to every cell.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Tilemap<U> {
        Tilemap {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_layout() {
        let mut map = Tilemap::new_with(4, 3, 0u8);
        map.set(2, 1, 9);
        assert_eq!(map.index(2, 1), 6);
        assert_eq!(*map.at(6), 9);
        assert_eq!(map.coords(6), (2, 1));
    }

    #[test]
    fn test_edges_do_not_wrap() {
        let map = Tilemap::new_with(5, 5, 0u8);
        assert_eq!(map.neighbors(0, 0).len(), 2);
        assert_eq!(map.neighbors_8(0, 0).len(), 3);
        assert_eq!(map.neighbors_8(2, 2).len(), 8);
        assert!(!map.neighbors(4, 2).contains(&(0, 2)));
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Tilemap::from_vec(2, 2, vec![0u8; 3]).is_none());
        assert!(Tilemap::from_vec(2, 2, vec![0u8; 4]).is_some());
    }
}
