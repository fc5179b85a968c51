// Conversions between block grids and 8-bit grayscale images, for collaborator
// maps on the way in and previews on the way out.

pub mod image_helper {
    use crate::core_modules::block_grid::{BackgroundMask, BlockGrid, Point, Segment};
    use crate::core_modules::orientation::OrientationField;
    use crate::core_modules::quality_categorizer::QualityMap;
    use crate::core_modules::region_extractor::{Label, LabeledGrid};
    use crate::core_modules::singularity_tagger::{SingularityKind, SingularityMap};
    use crate::error::Result;
    use image::{GrayImage, ImageEncoder, Luma};
    use std::path::Path;

    /// Writes `image` as an 8-bit grayscale PNG.
    pub fn save(path: &Path, image: &GrayImage) -> Result<()> {
        let output = std::io::BufWriter::new(std::fs::File::create(path)?);
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::L8)?;

        Ok(())
    }

    /// Block-resolution mask: black pixels are background.
    pub fn mask_from_gray(image: &GrayImage) -> BackgroundMask {
        BlockGrid::from_fn(image.width(), image.height(), |p| {
            if image.get_pixel(p.x, p.y).0[0] == 0 {
                Segment::Background
            } else {
                Segment::Foreground
            }
        })
    }

    /// Block-resolution quality map: gray / 255 per foreground block.
    pub fn quality_from_gray(image: &GrayImage, background: &BackgroundMask) -> Result<QualityMap> {
        let quality = BlockGrid::from_fn(image.width(), image.height(), |p| {
            Some(image.get_pixel(p.x, p.y).0[0] as f64 / 255.0)
        });
        quality.ensure_shape("quality image", background.shape())?;
        Ok(quality.map(|p, score| if background.is_background(p) { None } else { *score }))
    }

    /// Area labels scaled up to pixels. Every area gets its own gray level,
    /// unclaimed low-damage blocks are mid gray, everything else white.
    pub fn render_labels(labels: &LabeledGrid, block_size: u32) -> GrayImage {
        render_blocks(labels, block_size, |label| match label {
            Label::Area(id) => Luma([(40 + (id * 37) % 100) as u8]),
            Label::LowDamage | Label::Damaged => Luma([180]),
            Label::Unassigned => Luma([255]),
        })
    }

    /// Singular blocks black on white.
    pub fn render_singularities(map: &SingularityMap, block_size: u32) -> GrayImage {
        render_blocks(map, block_size, |kind| match kind {
            SingularityKind::CoreOrDelta => Luma([0]),
            SingularityKind::None => Luma([255]),
        })
    }

    /// `image` faded to light gray with one dark ridge line per block.
    pub fn render_orientation(image: &GrayImage, field: &OrientationField) -> GrayImage {
        let mut canvas = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            Luma([155 + image.get_pixel(x, y).0[0] / 3])
        });
        let block_size = field.block_size() as f64;
        let half_length = block_size / 2.0 - 1.0;

        for p in field.angles().points() {
            let radians = field.angle(p).to_radians();
            let center_x = (p.x as f64 + 0.5) * block_size;
            let center_y = (p.y as f64 + 0.5) * block_size;
            let (dx, dy) = (radians.cos(), radians.sin());

            let steps = (2.0 * half_length).ceil().max(1.0) as i64;
            for step in 0..=steps {
                let t = -half_length + step as f64 * (2.0 * half_length / steps as f64);
                let x = (center_x + t * dx).round();
                let y = (center_y + t * dy).round();
                if x >= 0.0 && y >= 0.0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
                    canvas.put_pixel(x as u32, y as u32, Luma([0]));
                }
            }
        }
        canvas
    }

    fn render_blocks<T>(grid: &BlockGrid<T>, block_size: u32, shade: impl Fn(&T) -> Luma<u8>) -> GrayImage {
        let block_size = block_size.max(1);
        GrayImage::from_fn(grid.cols() * block_size, grid.rows() * block_size, |x, y| {
            shade(&grid[Point::new(x / block_size, y / block_size)])
        })
    }
}
