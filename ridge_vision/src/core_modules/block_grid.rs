// THEORY:
// The `BlockGrid` is the coordinate space every other module speaks. An image
// is cut into square blocks of `block_size` pixels and each analysis layer
// (background mask, quality scores, damage categories, labels, orientations)
// stores exactly one value per block. Keeping all of them in one generic
// container gives three guarantees for free:
//
// 1.  **Shared shape**: grids are created with explicit `(cols, rows)` and can be
//     checked against each other before any analysis starts.
// 2.  **One scan order**: `points()` walks the grid column-major (x outer, y
//     inner). Flood fill seeding, area numbering and the area-by-area
//     growth tie-break all depend on this order, so it lives here and nowhere
//     else.
// 3.  **Clipped neighborhoods**: the 3x3 neighborhood and the clockwise 8-ring
//     used by the Poincaré index are produced here, already clipped at the
//     grid edges.

use crate::error::{AnalysisError, Result};
use std::ops::{Index, IndexMut};

/// A block coordinate on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Offsets of the 8-ring around a block, clockwise starting below it.
const RING_OFFSETS: [(i32, i32); 8] = [
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// A dense `cols x rows` grid holding one value per image block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGrid<T> {
    cols: u32,
    rows: u32,
    cells: Vec<T>,
}

impl<T: Clone> BlockGrid<T> {
    /// Creates a grid with every block set to `value`.
    pub fn filled(cols: u32, rows: u32, value: T) -> Self {
        Self {
            cols,
            rows,
            cells: vec![value; (cols * rows) as usize],
        }
    }
}

impl<T> BlockGrid<T> {
    /// Wraps row-major `cells` (index `y * cols + x`) as a grid.
    pub fn from_vec(cols: u32, rows: u32, cells: Vec<T>) -> Result<Self> {
        if cells.len() != (cols * rows) as usize {
            return Err(AnalysisError::ShapeMismatch {
                what: "cell buffer",
                expected: (cols, rows),
                actual: (cells.len() as u32, 1),
            });
        }
        Ok(Self { cols, rows, cells })
    }

    pub fn from_fn(cols: u32, rows: u32, mut f: impl FnMut(Point) -> T) -> Self {
        let mut cells = Vec::with_capacity((cols * rows) as usize);
        for y in 0..rows {
            for x in 0..cols {
                cells.push(f(Point::new(x, y)));
            }
        }
        Self { cols, rows, cells }
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// `(cols, rows)`.
    pub fn shape(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Row-major view of the cells.
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    /// Fails with `ShapeMismatch` unless this grid is `expected` in shape.
    pub fn ensure_shape(&self, what: &'static str, expected: (u32, u32)) -> Result<()> {
        if self.shape() != expected {
            return Err(AnalysisError::ShapeMismatch {
                what,
                expected,
                actual: self.shape(),
            });
        }
        Ok(())
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.cols as i64 && y < self.rows as i64
    }

    pub fn get(&self, x: i64, y: i64) -> Option<&T> {
        if self.contains(x, y) {
            Some(&self.cells[self.index_of(Point::new(x as u32, y as u32))])
        } else {
            None
        }
    }

    /// The block at `p + (dx, dy)`, if it is on the grid.
    pub fn offset(&self, p: Point, dx: i32, dy: i32) -> Option<Point> {
        let x = p.x as i64 + dx as i64;
        let y = p.y as i64 + dy as i64;
        self.contains(x, y).then(|| Point::new(x as u32, y as u32))
    }

    /// True for blocks on the outermost row or column.
    pub fn is_border(&self, p: Point) -> bool {
        p.x == 0 || p.y == 0 || p.x + 1 >= self.cols || p.y + 1 >= self.rows
    }

    /// Every block in column-major order (x outer, y inner).
    pub fn points(&self) -> impl Iterator<Item = Point> + use<T> {
        let rows = self.rows;
        (0..self.cols).flat_map(move |x| (0..rows).map(move |y| Point::new(x, y)))
    }

    /// The 3x3 neighborhood of `p` including `p` itself, clipped at the edges,
    /// in column-major order.
    pub fn neighborhood(&self, p: Point) -> impl Iterator<Item = Point> + '_ {
        (-1..=1).flat_map(move |dx| (-1..=1).filter_map(move |dy| self.offset(p, dx, dy)))
    }

    /// The 4-connected neighbors of `p` that are on the grid.
    pub fn direct_neighbors(&self, p: Point) -> impl Iterator<Item = Point> + '_ {
        [(1, 0), (-1, 0), (0, 1), (0, -1)]
            .into_iter()
            .filter_map(move |(dx, dy)| self.offset(p, dx, dy))
    }

    /// The clockwise 8-ring around `p`, or `None` when part of it is off the grid.
    pub fn ring(&self, p: Point) -> Option<[Point; 8]> {
        let mut ring = [p; 8];
        for (slot, (dx, dy)) in ring.iter_mut().zip(RING_OFFSETS) {
            *slot = self.offset(p, dx, dy)?;
        }
        Some(ring)
    }

    pub fn map<U>(&self, mut f: impl FnMut(Point, &T) -> U) -> BlockGrid<U> {
        BlockGrid::from_fn(self.cols, self.rows, |p| f(p, &self[p]))
    }

    fn index_of(&self, p: Point) -> usize {
        (p.y * self.cols + p.x) as usize
    }
}

impl<T> Index<Point> for BlockGrid<T> {
    type Output = T;

    fn index(&self, p: Point) -> &T {
        &self.cells[self.index_of(p)]
    }
}

impl<T> IndexMut<Point> for BlockGrid<T> {
    fn index_mut(&mut self, p: Point) -> &mut T {
        let index = self.index_of(p);
        &mut self.cells[index]
    }
}

/// Background segmentation result for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Segment {
    Background,
    #[default]
    Foreground,
}

/// Per-block background/foreground mask supplied by the segmentation collaborator.
pub type BackgroundMask = BlockGrid<Segment>;

impl BlockGrid<Segment> {
    pub fn is_background(&self, p: Point) -> bool {
        self[p] == Segment::Background
    }

    pub fn is_foreground(&self, p: Point) -> bool {
        self[p] == Segment::Foreground
    }

    /// True when any block of the clipped 3x3 neighborhood (self included) is background.
    pub fn has_background_neighbor(&self, p: Point) -> bool {
        self.neighborhood(p).any(|n| self.is_background(n))
    }

    pub fn foreground_count(&self) -> usize {
        self.cells.iter().filter(|s| **s == Segment::Foreground).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_are_column_major() {
        let grid = BlockGrid::filled(2, 3, 0u8);
        let order: Vec<(u32, u32)> = grid.points().map(|p| (p.x, p.y)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn neighborhood_is_clipped_at_corners() {
        let grid = BlockGrid::filled(4, 4, 0u8);
        assert_eq!(grid.neighborhood(Point::new(0, 0)).count(), 4);
        assert_eq!(grid.neighborhood(Point::new(1, 0)).count(), 6);
        assert_eq!(grid.neighborhood(Point::new(1, 1)).count(), 9);
    }

    #[test]
    fn ring_is_clockwise_from_below() {
        let grid = BlockGrid::filled(3, 3, 0u8);
        let ring = grid.ring(Point::new(1, 1)).expect("interior block has a ring");
        assert_eq!(ring[0], Point::new(1, 2));
        assert_eq!(ring[2], Point::new(0, 1));
        assert_eq!(ring[4], Point::new(1, 0));
        assert_eq!(ring[6], Point::new(2, 1));
        assert!(grid.ring(Point::new(0, 1)).is_none());
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(BlockGrid::from_vec(3, 3, vec![0u8; 8]).is_err());
        let grid = BlockGrid::from_vec(3, 2, (0..6).collect::<Vec<u8>>()).unwrap();
        assert_eq!(grid[Point::new(2, 1)], 5);
    }

    #[test]
    fn background_neighbor_includes_diagonals() {
        let mut mask = BackgroundMask::filled(3, 3, Segment::Foreground);
        mask[Point::new(0, 0)] = Segment::Background;
        assert!(mask.has_background_neighbor(Point::new(1, 1)));
        assert!(!mask.has_background_neighbor(Point::new(2, 2)));
        assert_eq!(mask.foreground_count(), 8);
    }
}
