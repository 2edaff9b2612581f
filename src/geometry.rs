//! Grid geometry and the logical color grid.

use std::collections::HashMap;

use imageproc::rect::Rect;

use crate::{color::Rgb8, SmallVecLine};

/// The recovered grid geometry: ordered pixel coordinates of the
/// cell-separating lines on each axis.
///
/// `row_boundaries` has length R+1 and `col_boundaries` length C+1 for an
/// R×C grid. Both sequences are strictly increasing, and adjacent boundaries
/// differ by at least the configured merge distance. The median spacings are
/// diagnostic only.
///
/// # Example
/// ```
/// use beadgrid::{GridGeometry, SmallVecLine};
///
/// let geometry = GridGeometry::new(
///     SmallVecLine::from_vec(vec![0, 20, 40, 60]),
///     SmallVecLine::from_vec(vec![0, 20, 40]),
/// );
/// assert_eq!(geometry.rows(), 3);
/// assert_eq!(geometry.cols(), 2);
/// assert_eq!(geometry.row_spacing, 20.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GridGeometry {
    /// y coordinates of the horizontal grid lines, length R+1.
    pub row_boundaries: SmallVecLine<u32>,
    /// x coordinates of the vertical grid lines, length C+1.
    pub col_boundaries: SmallVecLine<u32>,
    /// Median vertical gap between row boundaries (diagnostic).
    pub row_spacing: f32,
    /// Median horizontal gap between column boundaries (diagnostic).
    pub col_spacing: f32,
}

impl GridGeometry {
    /// Builds a geometry from two boundary sequences, computing the median
    /// spacings.
    pub fn new(row_boundaries: SmallVecLine<u32>, col_boundaries: SmallVecLine<u32>) -> Self {
        let row_spacing = median_spacing(&row_boundaries);
        let col_spacing = median_spacing(&col_boundaries);
        Self {
            row_boundaries,
            col_boundaries,
            row_spacing,
            col_spacing,
        }
    }

    /// Number of cell rows.
    pub fn rows(&self) -> usize {
        self.row_boundaries.len().saturating_sub(1)
    }

    /// Number of cell columns.
    pub fn cols(&self) -> usize {
        self.col_boundaries.len().saturating_sub(1)
    }

    /// Bounding box of the cell at (`row`, `col`), or `None` out of range.
    pub fn cell(&self, row: usize, col: usize) -> Option<Rect> {
        let y0 = *self.row_boundaries.get(row)?;
        let y1 = *self.row_boundaries.get(row + 1)?;
        let x0 = *self.col_boundaries.get(col)?;
        let x1 = *self.col_boundaries.get(col + 1)?;
        Some(Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0))
    }
}

/// Median gap between consecutive positions, 0.0 with fewer than two.
pub(crate) fn median_spacing(positions: &[u32]) -> f32 {
    if positions.len() < 2 {
        return 0.0;
    }
    let mut gaps: Vec<u32> = positions.windows(2).map(|w| w[1] - w[0]).collect();
    gaps.sort_unstable();
    let mid = gaps.len() / 2;
    if gaps.len() % 2 == 0 {
        (gaps[mid - 1] + gaps[mid]) as f32 / 2.0
    } else {
        gaps[mid] as f32
    }
}

/// An R×C grid of cell colors.
///
/// Created once per detection run by the extractor; the merger substitutes
/// colors in place but never changes the shape.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ColorGrid {
    rows: usize,
    cols: usize,
    cells: Vec<Rgb8>,
}

impl ColorGrid {
    /// Creates a grid filled with one color.
    pub fn new(rows: usize, cols: usize, fill: Rgb8) -> Self {
        Self {
            rows,
            cols,
            cells: vec![fill; rows * cols],
        }
    }

    /// Builds a grid from row-major rows of equal length.
    ///
    /// # Panics
    /// Panics if the rows have differing lengths.
    pub fn from_rows(rows: Vec<Vec<Rgb8>>) -> Self {
        let row_count = rows.len();
        let col_count = rows.first().map_or(0, Vec::len);
        let mut cells = Vec::with_capacity(row_count * col_count);
        for row in rows {
            assert_eq!(row.len(), col_count, "ragged color grid");
            cells.extend(row);
        }
        Self {
            rows: row_count,
            cols: col_count,
            cells,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Color of the cell at (`row`, `col`).
    ///
    /// # Panics
    /// Panics if the indices are out of range.
    pub fn get(&self, row: usize, col: usize) -> Rgb8 {
        assert!(row < self.rows && col < self.cols, "cell out of range");
        self.cells[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, color: Rgb8) {
        assert!(row < self.rows && col < self.cols, "cell out of range");
        self.cells[row * self.cols + col] = color;
    }

    /// Iterates over all cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &Rgb8> {
        self.cells.iter()
    }

    /// Occurrence count per distinct color.
    pub fn color_counts(&self) -> HashMap<Rgb8, usize> {
        let mut counts = HashMap::new();
        for cell in &self.cells {
            *counts.entry(*cell).or_insert(0) += 1;
        }
        counts
    }

    /// Number of distinct colors in the grid.
    pub fn distinct_colors(&self) -> usize {
        self.color_counts().len()
    }

    /// Substitutes every cell color through the map; colors absent from the
    /// map are left unchanged. The grid shape never changes.
    pub fn apply_color_map(&mut self, map: &HashMap<Rgb8, Rgb8>) {
        for cell in &mut self.cells {
            if let Some(mapped) = map.get(cell) {
                *cell = *mapped;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use smallvec::smallvec;

    #[test]
    fn test_cell_rect() {
        let geometry = GridGeometry::new(smallvec![10, 30, 55], smallvec![0, 40]);
        assert_eq!(geometry.rows(), 2);
        assert_eq!(geometry.cols(), 1);
        let rect = geometry.cell(1, 0).unwrap();
        assert_eq!((rect.left(), rect.top()), (0, 30));
        assert_eq!((rect.width(), rect.height()), (40, 25));
        assert!(geometry.cell(2, 0).is_none());
    }

    #[test]
    fn test_median_spacing() {
        assert_eq!(median_spacing(&[0, 10, 20, 30]), 10.0);
        assert_eq!(median_spacing(&[0, 10, 21, 33]), 11.0);
        assert_eq!(median_spacing(&[5]), 0.0);
    }

    #[test]
    fn test_color_counts_and_map() {
        let mut grid = ColorGrid::from_rows(vec![
            vec![[255, 0, 0], [0, 255, 0]],
            vec![[255, 0, 0], [255, 0, 0]],
        ]);
        let counts = grid.color_counts();
        assert_eq!(counts[&[255, 0, 0]], 3);
        assert_eq!(counts[&[0, 255, 0]], 1);

        let map = HashMap::from([([255u8, 0, 0], [250u8, 10, 10])]);
        grid.apply_color_map(&map);
        assert_eq!(grid.get(0, 0), [250, 10, 10]);
        assert_eq!(grid.get(0, 1), [0, 255, 0]);
        assert_eq!(grid.distinct_colors(), 2);
    }

    proptest! {
        #[test]
        fn test_grid_shape_survives_mapping(rows in 1usize..8, cols in 1usize..8) {
            let mut grid = ColorGrid::new(rows, cols, [9, 9, 9]);
            grid.apply_color_map(&HashMap::from([([9u8, 9, 9], [1u8, 2, 3])]));
            prop_assert_eq!(grid.rows(), rows);
            prop_assert_eq!(grid.cols(), cols);
            prop_assert_eq!(grid.iter().count(), rows * cols);
        }
    }
}
