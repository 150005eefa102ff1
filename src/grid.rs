//! Spatial binning of sampled pickup locations.
//!
//! Points inside a bounding box are mapped to the cells of a fixed grid by linear scaling, and
//! each cell accumulates the sum and count of the trip distances that land in it. Grids combine
//! by elementwise addition.

use ndarray::Array2;
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::ReductionError;
use crate::execution_log::ExecutionLog;
use crate::metrics;
use crate::models::FilteredRecord;
use crate::sample::SampleSet;

/// Default grid width and height, in cells.
pub const DEFAULT_GRID_SIZE: usize = 800;

/// An axis-aligned longitude/latitude box. Bounds are inclusive.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[validate(schema(function = "validate_bounding_box"))]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

fn validate_bounding_box(bounds: &BoundingBox) -> Result<(), ValidationError> {
    let finite = [bounds.x_min, bounds.x_max, bounds.y_min, bounds.y_max]
        .iter()
        .all(|v| v.is_finite());
    if !finite || bounds.x_min >= bounds.x_max || bounds.y_min >= bounds.y_max {
        return Err(ValidationError::new(
            "Bounding box must be finite with minimum less than maximum",
        ));
    };
    Ok(())
}

impl Default for BoundingBox {
    /// New York City
    fn default() -> Self {
        BoundingBox {
            x_min: -74.05,
            x_max: -73.75,
            y_min: 40.63,
            y_max: 40.85,
        }
    }
}

impl BoundingBox {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }
}

/// Grid dimensions and extent.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
pub struct GridSpec {
    #[validate(range(min = 1, max = 16384, message = "width must be between 1 and 16384"))]
    pub width: usize,
    #[validate(range(min = 1, max = 16384, message = "height must be between 1 and 16384"))]
    pub height: usize,
    #[validate]
    pub bounds: BoundingBox,
}

impl Default for GridSpec {
    fn default() -> Self {
        GridSpec {
            width: DEFAULT_GRID_SIZE,
            height: DEFAULT_GRID_SIZE,
            bounds: BoundingBox::default(),
        }
    }
}

fn scale(value: f64, min: f64, max: f64, cells: usize) -> usize {
    let index = ((value - min) / (max - min) * cells as f64).floor() as usize;
    index.min(cells - 1)
}

impl GridSpec {
    /// Cell `(row, column)` of a point, or `None` if it lies outside the bounding box.
    ///
    /// Row 0 is at the minimum latitude. Points on the upper edges fall in the last row or
    /// column.
    pub fn cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !self.bounds.contains(x, y) {
            return None;
        }
        let column = scale(x, self.bounds.x_min, self.bounds.x_max, self.width);
        let row = scale(y, self.bounds.y_min, self.bounds.y_max, self.height);
        Some((row, column))
    }
}

/// Sum and count of trip distance per grid cell.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityGrid {
    spec: GridSpec,
    sum: Array2<f64>,
    count: Array2<u64>,
}

impl DensityGrid {
    /// Return an empty grid.
    pub fn new(spec: GridSpec) -> Self {
        DensityGrid {
            spec,
            sum: Array2::zeros((spec.height, spec.width)),
            count: Array2::zeros((spec.height, spec.width)),
        }
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    /// Add a value at a point. Returns false if the point is outside the grid.
    pub fn add(&mut self, x: f64, y: f64, value: f64) -> bool {
        match self.spec.cell(x, y) {
            Some(cell) => {
                self.sum[cell] += value;
                self.count[cell] += 1;
                true
            }
            None => false,
        }
    }

    /// Combine with another grid of the same shape by elementwise addition.
    pub fn merge(mut self, other: &DensityGrid) -> Self {
        self.sum += &other.sum;
        self.count += &other.count;
        self
    }

    /// Total number of values accumulated across all cells.
    pub fn total_count(&self) -> u64 {
        self.count.sum()
    }

    /// Number of cells with at least one value.
    pub fn occupied_cells(&self) -> usize {
        self.count.iter().filter(|c| **c > 0).count()
    }

    pub fn count(&self, row: usize, column: usize) -> u64 {
        self.count[(row, column)]
    }

    /// Mean value per cell. Empty cells are NaN.
    pub fn mean(&self) -> Array2<f64> {
        let mut mean = self.sum.clone();
        mean.zip_mut_with(&self.count, |m, c| {
            *m = if *c == 0 { f64::NAN } else { *m / *c as f64 }
        });
        mean
    }

    /// Minimum and maximum cell means, or `None` if every cell is empty.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mean = self.mean();
        let min = *mean.min_skipnan();
        let max = *mean.max_skipnan();
        if min.is_nan() || max.is_nan() {
            None
        } else {
            Some((min, max))
        }
    }
}

/// Counts of points binned and dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BinSummary {
    pub points: usize,
    pub binned: usize,
    pub out_of_bounds: usize,
    pub null_coordinates: usize,
}

impl BinSummary {
    pub fn dropped(&self) -> usize {
        self.out_of_bounds + self.null_coordinates
    }
}

/// Bins a sample into a density grid.
#[derive(Clone, Debug)]
pub struct SpatialBinner {
    spec: GridSpec,
}

impl SpatialBinner {
    /// Return a new SpatialBinner.
    pub fn new(spec: GridSpec) -> Result<Self, ReductionError> {
        spec.validate()?;
        Ok(SpatialBinner { spec })
    }

    fn bin_records(&self, records: &[FilteredRecord]) -> (DensityGrid, BinSummary) {
        let mut grid = DensityGrid::new(self.spec);
        let mut summary = BinSummary {
            points: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.pickup() {
                None => summary.null_coordinates += 1,
                Some((x, y)) => {
                    if grid.add(x, y, record.trip_distance) {
                        summary.binned += 1;
                    } else {
                        summary.out_of_bounds += 1;
                    }
                }
            }
        }
        (grid, summary)
    }

    /// Bin the pickup locations of a sample, accumulating trip distance.
    ///
    /// Points without coordinates or outside the bounding box are dropped and counted. The sample
    /// is already local, so binning runs on the calling thread.
    #[tracing::instrument(level = "DEBUG", skip_all)]
    pub fn bin(&self, sample: &SampleSet, log: ExecutionLog) -> (DensityGrid, BinSummary, ExecutionLog) {
        let (grid, summary) = self.bin_records(&sample.records);

        metrics::record_dropped("out_of_bounds", summary.out_of_bounds);
        metrics::record_dropped("null_coordinates", summary.null_coordinates);
        if summary.dropped() > 0 {
            tracing::warn!(
                "Dropped {} points outside the bounding box and {} without coordinates",
                summary.out_of_bounds,
                summary.null_coordinates
            );
        }
        let log = log.append(format!(
            "{} of {} sampled points binned into a {}x{} grid; {} outside the bounding box, {} without coordinates.",
            summary.binned,
            summary.points,
            self.spec.width,
            self.spec.height,
            summary.out_of_bounds,
            summary.null_coordinates
        ));
        (grid, summary, log)
    }
}
