/// A bounded 2D grid. Unlike a planetary map it does not wrap: cells
/// outside `[0, width) x [0, height)` do not exist.
#[derive(Clone, Debug)]
pub struct Tilemap<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Tilemap<T> {
    /// A grid of default cells, or `None` if `width * height` overflows.
    pub fn new(width: usize, height: usize) -> Option<Self> {
        let len = width.checked_mul(height)?;
        Some(Self {
            width,
            height,
            data: vec![T::default(); len],
        })
    }
}

impl<T> Tilemap<T> {
    fn index(&self, x: usize, y: usize) -> Option<usize> {
        self.in_bounds(x as i64, y as i64).then(|| y * self.width + x)
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        self.index(x, y).map(|idx| &self.data[idx])
    }

    /// Store `value`. Returns false when the cell is outside the grid.
    pub fn set(&mut self, x: usize, y: usize, value: T) -> bool {
        match self.index(x, y) {
            Some(idx) => {
                self.data[idx] = value;
                true
            }
            None => false,
        }
    }

    /// 4-connected neighbours that lie inside the grid (left, right, up, down).
    pub fn neighbors(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        const OFFSETS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
        OFFSETS
            .iter()
            .map(|&(dx, dy)| (x as i64 + dx, y as i64 + dy))
            .filter(|&(nx, ny)| self.in_bounds(nx, ny))
            .map(|(nx, ny)| (nx as usize, ny as usize))
            .collect()
    }
}

/// Manhattan distance between two cells.
pub fn manhattan(a: (usize, usize), b: (usize, usize)) -> usize {
    a.0.abs_diff(b.0) + a.1.abs_diff(b.1)
}
