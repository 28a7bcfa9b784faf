//! Spatial indexing for efficient neighbor lookup in the focal plane.
#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;

/// Spatial grid for 2D neighbor queries on floating-point positions.
///
/// The focal plane is divided into square cells; a query returns the
/// contents of the 3x3 block of cells around a point, so any item within
/// one cell size of the point is guaranteed to be among the results.
#[derive(Debug, Default)]
pub struct SpatialGrid<T> {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<T>>,
}

impl<T: Copy> SpatialGrid<T> {
    /// Create a new spatial grid. Non-positive cell sizes are treated as 1.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 1.0 },
            cells: HashMap::new(),
        }
    }

    fn cell(&self, x: f64, y: f64) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    /// Insert a value at the given coordinates.
    pub fn insert(&mut self, x: f64, y: f64, value: T) {
        let cell = self.cell(x, y);
        self.cells.entry(cell).or_default().push(value);
    }

    /// Query the 3x3 neighborhood around a point.
    pub fn query_neighborhood(&self, x: f64, y: f64) -> impl Iterator<Item = T> + '_ {
        let (cx, cy) = self.cell(x, y);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).map(move |dy| (cx + dx, cy + dy)))
            .filter_map(|cell| self.cells.get(&cell))
            .flat_map(|values| values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spatial_grid() {
        let mut grid: SpatialGrid<usize> = SpatialGrid::new(0.05);
        grid.insert(0.10, 0.10, 0);
        grid.insert(0.105, 0.105, 1);
        grid.insert(0.30, 0.30, 2);
        grid.insert(-0.02, 0.10, 3);

        let neighbors: Vec<usize> = grid.query_neighborhood(0.10, 0.10).collect();
        assert!(neighbors.contains(&0));
        assert!(neighbors.contains(&1));
        assert!(!neighbors.contains(&2));
        assert!(!neighbors.contains(&3));

        let near_origin: Vec<usize> = grid.query_neighborhood(0.01, 0.10).collect();
        assert!(near_origin.contains(&3));
    }
}
