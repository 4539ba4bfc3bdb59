//! Per-seed measurement via ellipse fitting, and population statistics.

use crate::geometry::{contour_area, fit_ellipse, min_area_rect_fit, percentile, round_to};
use crate::models::{
    DimensionStats, DimensionSummary, SeedMeasurement, SeedShape, ShapeDistribution, SizeRatio,
    Statistics,
};
use crate::segmentation::Region;

/// Measures seed dimensions and aggregates population statistics.
#[derive(Debug, Clone, Default)]
pub struct SeedMeasurer;

impl SeedMeasurer {
    pub fn new() -> Self {
        Self
    }

    /// Measure a single region.
    ///
    /// Regions with at least 5 boundary points get an ellipse fit; smaller
    /// or degenerate ones fall back to the minimum-area bounding rectangle.
    /// The fitted axis pair is unordered, so major/minor are taken here.
    pub fn measure(&self, region: &Region, pixels_per_mm: f64, id: usize) -> SeedMeasurement {
        let fit = if region.points.len() >= 5 {
            fit_ellipse(&region.points).unwrap_or_else(|| min_area_rect_fit(&region.points))
        } else {
            min_area_rect_fit(&region.points)
        };

        let major_px = fit.axis_a.max(fit.axis_b);
        let minor_px = fit.axis_a.min(fit.axis_b);

        let length_mm = major_px / pixels_per_mm;
        let width_mm = minor_px / pixels_per_mm;
        let aspect_ratio = if width_mm > 0.0 {
            length_mm / width_mm
        } else {
            f64::INFINITY
        };
        let shape = SeedShape::from_aspect_ratio(aspect_ratio);

        let area_mm2 = contour_area(&region.points) / (pixels_per_mm * pixels_per_mm);

        SeedMeasurement {
            id,
            length_mm: round_to(length_mm, 3),
            width_mm: round_to(width_mm, 3),
            aspect_ratio: round_to(aspect_ratio, 3),
            shape,
            area_mm2: round_to(area_mm2, 3),
            center_x: round_to(fit.center_x, 1),
            center_y: round_to(fit.center_y, 1),
        }
    }

    /// Aggregate statistics over a non-empty measurement set.
    ///
    /// Returns `None` on empty input; the pipeline guarantees at least one
    /// measurement before calling.
    pub fn calculate_statistics(
        &self,
        measurements: &[SeedMeasurement],
        large_percentile: f64,
        small_percentile: f64,
    ) -> Option<Statistics> {
        if measurements.is_empty() {
            return None;
        }

        let lengths: Vec<f64> = measurements.iter().map(|m| m.length_mm).collect();
        let widths: Vec<f64> = measurements.iter().map(|m| m.width_mm).collect();
        let areas: Vec<f64> = measurements.iter().map(|m| m.area_mm2).collect();

        let large_threshold = percentile(&areas, large_percentile)?;
        let small_threshold = percentile(&areas, small_percentile)?;
        let large_count = areas.iter().filter(|a| **a >= large_threshold).count();
        let small_count = areas.iter().filter(|a| **a <= small_threshold).count();
        let ratio = if small_count > 0 {
            round_to(large_count as f64 / small_count as f64, 3)
        } else {
            0.0
        };

        let mut shapes = ShapeDistribution {
            circular: 0,
            oval: 0,
            elongated: 0,
        };
        for m in measurements {
            match m.shape {
                SeedShape::Circular => shapes.circular += 1,
                SeedShape::Oval => shapes.oval += 1,
                SeedShape::Elongated => shapes.elongated += 1,
            }
        }

        Some(Statistics {
            total_seed_count: measurements.len(),
            dimensions: DimensionSummary {
                length: dimension_stats(&lengths),
                width: dimension_stats(&widths),
            },
            shape_distribution: shapes,
            size_ratio: SizeRatio {
                large_count,
                small_count,
                ratio,
            },
        })
    }
}

/// Min/max/mean/population standard deviation, rounded to 3 decimals.
fn dimension_stats(values: &[f64]) -> DimensionStats {
    let n = values.len() as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

    DimensionStats {
        min_mm: round_to(min, 3),
        max_mm: round_to(max, 3),
        mean_mm: round_to(mean, 3),
        std_mm: round_to(variance.sqrt(), 3),
    }
}
