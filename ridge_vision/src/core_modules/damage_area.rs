// THEORY:
// A `DamageArea` is the spatial object of the damage layer: a set of block
// coordinates that together form one damaged region of the print, plus a tag
// saying how later stages must treat it.
//
// Key principles:
// 1.  **Fixed identity**: an area is created from one connected seed of heavily
//     damaged blocks and keeps its id for the whole run. Growth only appends
//     points; two areas never merge.
// 2.  **Dumb container**: like `Point`, it only knows summary geometry about
//     itself (extent, point count). It does not know the grid it came from.
// 3.  **One tag flip**: areas start as `Damaged`; the singularity tagger may
//     flip the tag to `Singularity` once, which excludes the area from field
//     correction.

use crate::core_modules::block_grid::Point;

/// How an area is treated by orientation correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaTag {
    /// Ordinary damage; its orientations get re-estimated.
    Damaged,
    /// Contains a core or delta; curvature there is expected, leave it alone.
    Singularity,
}

/// A connected (then grown) region of damaged blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageArea {
    /// 1-based id, equal to the label the area carries in the labeled grid.
    pub id: u32,
    pub tag: AreaTag,
    points: Vec<Point>,
}

impl DamageArea {
    pub fn new(id: u32, points: Vec<Point>) -> Self {
        Self {
            id,
            tag: AreaTag::Damaged,
            points,
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn is_singularity(&self) -> bool {
        self.tag == AreaTag::Singularity
    }

    /// Top-left and bottom-right corners, or `None` for an empty area.
    pub fn bounding_box(&self) -> Option<(Point, Point)> {
        let first = *self.points.first()?;
        let (min, max) = self.points.iter().fold((first, first), |(min, max), p| {
            (
                Point::new(min.x.min(p.x), min.y.min(p.y)),
                Point::new(max.x.max(p.x), max.y.max(p.y)),
            )
        });
        Some((min, max))
    }

    /// Horizontal extent in blocks (`max_x - min_x`); 0 for one column or no points.
    pub fn width(&self) -> u32 {
        self.bounding_box().map_or(0, |(min, max)| max.x - min.x)
    }

    /// Vertical extent in blocks (`max_y - min_y`); 0 for one row or no points.
    pub fn height(&self) -> u32 {
        self.bounding_box().map_or(0, |(min, max)| max.y - min.y)
    }

    /// The smaller of width and height; selects the area's field bank bucket.
    pub fn minor_dimension(&self) -> u32 {
        self.width().min(self.height())
    }
}
