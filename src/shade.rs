//! Colour shading of density grids.

use image::{Rgba, RgbaImage};

use crate::execution_log::ExecutionLog;
use crate::grid::DensityGrid;

/// Colour of the lowest cell values: light green.
pub const LOW_COLOUR: [u8; 3] = [144, 238, 144];
/// Colour of the highest cell values: dark blue.
pub const HIGH_COLOUR: [u8; 3] = [0, 0, 139];

/// Legend for the default colour scale.
pub const LEGEND: &str = "Density map notes:\nLight green = shorter trips\nDark blue = longer trips";

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Maps cell values linearly onto a two colour gradient.
#[derive(Clone, Copy, Debug)]
pub struct Shader {
    low: [u8; 3],
    high: [u8; 3],
}

impl Default for Shader {
    fn default() -> Self {
        Shader::new(LOW_COLOUR, HIGH_COLOUR)
    }
}

fn lerp(low: u8, high: u8, t: f64) -> u8 {
    let value = f64::from(low) + (f64::from(high) - f64::from(low)) * t;
    value.round().clamp(0.0, 255.0) as u8
}

impl Shader {
    pub fn new(low: [u8; 3], high: [u8; 3]) -> Self {
        Shader { low, high }
    }

    /// Colour of a value on the scale `[min, max]`.
    ///
    /// If the scale is degenerate every value takes the low colour.
    pub fn colour(&self, value: f64, min: f64, max: f64) -> Rgba<u8> {
        let t = if max > min {
            ((value - min) / (max - min)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Rgba([
            lerp(self.low[0], self.high[0], t),
            lerp(self.low[1], self.high[1], t),
            lerp(self.low[2], self.high[2], t),
            u8::MAX,
        ])
    }

    /// Render the cell means of a grid as an image, one pixel per cell.
    ///
    /// Occupied cells are opaque and empty cells transparent. The first image row holds the
    /// cells with the greatest latitude, so north is up.
    #[tracing::instrument(level = "DEBUG", skip_all)]
    pub fn shade(&self, grid: &DensityGrid, log: ExecutionLog) -> (RgbaImage, ExecutionLog) {
        let spec = grid.spec();
        let mean = grid.mean();
        let range = grid.value_range();
        let image = RgbaImage::from_fn(spec.width as u32, spec.height as u32, |x, y| {
            let row = spec.height - 1 - y as usize;
            let value = mean[(row, x as usize)];
            match range {
                Some((min, max)) if !value.is_nan() => self.colour(value, min, max),
                _ => TRANSPARENT,
            }
        });
        (image, log.append(LEGEND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{BoundingBox, GridSpec};

    fn grid() -> DensityGrid {
        DensityGrid::new(GridSpec {
            width: 3,
            height: 2,
            bounds: BoundingBox {
                x_min: 0.0,
                x_max: 3.0,
                y_min: 0.0,
                y_max: 2.0,
            },
        })
    }

    #[test]
    fn colour_endpoints() {
        let shader = Shader::default();
        assert_eq!(Rgba([144, 238, 144, 255]), shader.colour(1.0, 1.0, 50.0));
        assert_eq!(Rgba([0, 0, 139, 255]), shader.colour(50.0, 1.0, 50.0));
        assert_eq!(Rgba([72, 119, 142, 255]), shader.colour(25.5, 1.0, 50.0));
    }

    #[test]
    fn colour_degenerate_scale() {
        let shader = Shader::default();
        assert_eq!(Rgba([144, 238, 144, 255]), shader.colour(7.0, 7.0, 7.0));
    }

    #[test]
    fn shade_flips_and_masks() {
        let mut grid = grid();
        // South west cell, low value.
        grid.add(0.5, 0.5, 1.0);
        // North east cell, high value.
        grid.add(2.5, 1.5, 9.0);
        let (image, log) = Shader::default().shade(&grid, ExecutionLog::new());
        assert_eq!((3, 2), image.dimensions());
        assert_eq!(&Rgba([144, 238, 144, 255]), image.get_pixel(0, 1));
        assert_eq!(&Rgba([0, 0, 139, 255]), image.get_pixel(2, 0));
        assert_eq!(&TRANSPARENT, image.get_pixel(0, 0));
        assert_eq!(&TRANSPARENT, image.get_pixel(1, 1));
        assert_eq!(LEGEND, log.entries()[0].message);
    }

    #[test]
    fn shade_single_value() {
        let mut grid = grid();
        grid.add(0.5, 0.5, 4.0);
        grid.add(1.5, 0.5, 4.0);
        let (image, _) = Shader::default().shade(&grid, ExecutionLog::new());
        assert_eq!(image.get_pixel(0, 1), image.get_pixel(1, 1));
        assert_eq!(&Rgba([144, 238, 144, 255]), image.get_pixel(0, 1));
    }

    #[test]
    fn shade_empty() {
        let (image, _) = Shader::default().shade(&grid(), ExecutionLog::new());
        assert!(image.pixels().all(|p| *p == TRANSPARENT));
    }
}
