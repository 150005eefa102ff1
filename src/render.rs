//! Rendering of reduced results to PNG images.

use std::error::Error;
use std::io::Cursor;
use std::ops::Range;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::aggregate::AggregationResult;
use crate::error::ReductionError;
use crate::grid::BoundingBox;
use crate::sample::{percentage, SampleSet};

/// A chart to render.
///
/// Charts only ever borrow reduced, locally materialised results.
#[derive(Clone, Copy, Debug)]
pub enum Chart<'a> {
    /// Mean total amount per payment type
    Bar(&'a AggregationResult),
    /// Trip distance against total amount for each sampled trip
    Scatter(&'a SampleSet),
    /// Shaded density grid, one pixel per cell with north up, spanning `bounds`
    DensityMap {
        image: &'a RgbaImage,
        bounds: &'a BoundingBox,
    },
}

impl Chart<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Chart::Bar(_) => "bar",
            Chart::Scatter(_) => "scatter",
            Chart::DensityMap { .. } => "density",
        }
    }
}

/// Renders a chart to PNG data.
pub trait Renderer: Send + Sync {
    fn render(&self, chart: &Chart) -> Result<Bytes, ReductionError>;
}

/// Encode an image as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Bytes, ReductionError> {
    let mut data = Vec::new();
    image.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
    Ok(data.into())
}

/// Renders charts to bitmaps with plotters.
#[derive(Clone, Copy, Debug)]
pub struct PlottersRenderer {
    width: u32,
    height: u32,
}

impl Default for PlottersRenderer {
    fn default() -> Self {
        PlottersRenderer {
            width: 1024,
            height: 768,
        }
    }
}

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
type DrawResult = Result<(), Box<dyn Error>>;

fn draw_bar(root: Area, result: &AggregationResult) -> DrawResult {
    let names: Vec<&str> = result.groups.keys().map(String::as_str).collect();
    let means: Vec<f64> = result
        .groups
        .values()
        .map(|group| group.mean.unwrap_or(0.0))
        .collect();
    let y_max = means.iter().copied().fold(0.0, f64::max).max(1.0) * 1.1;

    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Average total amount by payment type", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((0..names.len().max(1)).into_segmented(), 0.0..y_max)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("payment_type")
        .y_desc("avg(total_amount)")
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(i) => names.get(*i).map(|n| n.to_string()).unwrap_or_default(),
            _ => String::new(),
        })
        .draw()?;
    chart.draw_series(
        Histogram::vertical(&chart)
            .style(BLUE.filled())
            .margin(10)
            .data(means.iter().enumerate().map(|(i, mean)| (i, *mean))),
    )?;
    root.present()?;
    Ok(())
}

/// Axis range covering zero and every finite value, padded by 5%.
fn axis_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 1.0), |(min, max): (f64, f64), v| (min.min(v), max.max(v)));
    let pad = (max - min) * 0.05;
    let start = if min < 0.0 { min - pad } else { 0.0 };
    start..max + pad
}

fn draw_scatter(root: Area, sample: &SampleSet) -> DrawResult {
    let points: Vec<(f64, f64)> = sample
        .records
        .iter()
        .filter_map(|record| record.total_amount.map(|total| (record.trip_distance, total)))
        .collect();
    let x_range = axis_range(points.iter().map(|p| p.0));
    let y_range = axis_range(points.iter().map(|p| p.1));

    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Trip distance vs total amount ({}% sample)", percentage(sample.fraction)),
            ("sans-serif", 24),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .x_desc("trip_distance")
        .y_desc("total_amount")
        .draw()?;
    chart.draw_series(
        points
            .iter()
            .map(|point| Circle::new(*point, 2, BLUE.mix(0.5).filled())),
    )?;
    root.present()?;
    Ok(())
}

/// Composite an image onto a white background.
fn on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn draw_density(root: Area, image: &RgbaImage, bounds: &BoundingBox) -> DrawResult {
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Pickup location colored by avg trip distance", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(bounds.x_min..bounds.x_max, bounds.y_min..bounds.y_max)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("pickup_longitude")
        .y_desc("pickup_latitude")
        .draw()?;
    let (width, height) = chart.plotting_area().dim_in_pixel();
    if width > 0 && height > 0 {
        let raster = on_white(&imageops::resize(image, width, height, FilterType::Nearest));
        let element: BitMapElement<(f64, f64)> = BitMapElement::with_owned_buffer(
            (bounds.x_min, bounds.y_max),
            (width, height),
            raster.into_raw(),
        )
        .ok_or("raster buffer size mismatch")?;
        chart.draw_series(std::iter::once(element))?;
    }
    root.present()?;
    Ok(())
}

impl PlottersRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        PlottersRenderer { width, height }
    }

    fn draw<F>(&self, draw: F) -> Result<RgbaImage, Box<dyn Error>>
    where
        F: FnOnce(Area) -> DrawResult,
    {
        let mut buffer = vec![0u8; self.width as usize * self.height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (self.width, self.height)).into_drawing_area();
            draw(root)?;
        }
        let image = RgbImage::from_raw(self.width, self.height, buffer).ok_or("bitmap buffer size mismatch")?;
        Ok(image::DynamicImage::ImageRgb8(image).into_rgba8())
    }
}

impl Renderer for PlottersRenderer {
    fn render(&self, chart: &Chart) -> Result<Bytes, ReductionError> {
        let image = match chart {
            Chart::Bar(result) => self.draw(|root| draw_bar(root, result)),
            Chart::Scatter(sample) => self.draw(|root| draw_scatter(root, sample)),
            Chart::DensityMap { image, bounds } => self.draw(|root| draw_density(root, image, bounds)),
        }
        .map_err(|err| ReductionError::Render {
            chart: chart.name(),
            reason: err.to_string(),
        })?;
        encode_png(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::GroupMean;
    use crate::test_utils;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn decode(data: &Bytes) -> RgbaImage {
        assert_eq!(PNG_SIGNATURE, data[..8]);
        image::load_from_memory_with_format(data, ImageFormat::Png)
            .unwrap()
            .into_rgba8()
    }

    fn sample(records: Vec<crate::models::FilteredRecord>) -> SampleSet {
        SampleSet {
            records,
            fraction: 0.05,
            seed: 0,
        }
    }

    #[test]
    fn chart_names() {
        let result = AggregationResult::default();
        let set = sample(vec![]);
        let image = RgbaImage::new(1, 1);
        let bounds = BoundingBox::default();
        assert_eq!("bar", Chart::Bar(&result).name());
        assert_eq!("scatter", Chart::Scatter(&set).name());
        assert_eq!(
            "density",
            Chart::DensityMap {
                image: &image,
                bounds: &bounds
            }
            .name()
        );
    }

    #[test]
    fn axis_range_covers_values() {
        let range = axis_range(std::iter::empty());
        assert_eq!(0.0, range.start);
        assert!((range.end - 1.05).abs() < 1e-12);
        assert_eq!(0.0..105.0, axis_range([2.0, 100.0].into_iter()));
        let range = axis_range([-10.0, 10.0, f64::NAN, f64::INFINITY].into_iter());
        assert_eq!(-11.0..11.0, range);
        assert!(range.contains(&-10.0));
    }

    #[test]
    fn render_bar_png() {
        let mut result = AggregationResult::default();
        for (payment_type, mean) in [("CRD", 15.5), ("CSH", 9.25), ("UNK", 0.0)] {
            result.groups.insert(
                payment_type.to_string(),
                GroupMean {
                    sum: mean * 2.0,
                    count: 2,
                    mean: Some(mean),
                },
            );
        }
        let data = PlottersRenderer::new(320, 240)
            .render(&Chart::Bar(&result))
            .unwrap();
        assert_eq!((320, 240), decode(&data).dimensions());
    }

    #[test]
    fn render_scatter_png() {
        let set = sample(test_utils::filtered_records_many(100));
        let data = PlottersRenderer::new(400, 300)
            .render(&Chart::Scatter(&set))
            .unwrap();
        assert_eq!((400, 300), decode(&data).dimensions());
    }

    #[test]
    fn render_scatter_negative_totals() {
        let set = sample(vec![
            test_utils::filtered_record("CSH", 2.0, Some(-52.5)),
            test_utils::filtered_record("CRD", 4.0, Some(12.0)),
            test_utils::filtered_record("CRD", 6.0, None),
        ]);
        let data = PlottersRenderer::new(320, 240)
            .render(&Chart::Scatter(&set))
            .unwrap();
        assert_eq!((320, 240), decode(&data).dimensions());
    }

    #[test]
    fn render_density_png() {
        let mut image = RgbaImage::new(4, 3);
        image.put_pixel(1, 2, Rgba([0, 0, 139, 255]));
        let bounds = BoundingBox::default();
        let data = PlottersRenderer::new(320, 240)
            .render(&Chart::DensityMap {
                image: &image,
                bounds: &bounds,
            })
            .unwrap();
        let decoded = decode(&data);
        assert_eq!((320, 240), decoded.dimensions());
        // The occupied cell is drawn in the plotting area.
        assert!(decoded.pixels().any(|p| *p == Rgba([0, 0, 139, 255])));
    }

    #[test]
    fn on_white_blends_alpha() {
        let mut image = RgbaImage::new(3, 1);
        image.put_pixel(0, 0, Rgba([0, 0, 139, 255]));
        image.put_pixel(1, 0, Rgba([0, 0, 0, 0]));
        image.put_pixel(2, 0, Rgba([0, 0, 0, 51]));
        let flat = on_white(&image);
        assert_eq!(&Rgb([0, 0, 139]), flat.get_pixel(0, 0));
        assert_eq!(&Rgb([255, 255, 255]), flat.get_pixel(1, 0));
        assert_eq!(&Rgb([204, 204, 204]), flat.get_pixel(2, 0));
    }
}
