use serde::{Deserialize, Serialize};

/// Result of millimeter-grid calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Conversion factor derived from the detected grid spacing.
    pub pixels_per_mm: f64,
    /// Total number of grid lines classified as horizontal or vertical.
    pub grid_lines_detected: usize,
    /// Detection confidence in `[0, 1]`, rounded to 3 decimals.
    pub confidence: f64,
}

/// Seed shape classes, assigned from the fitted aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedShape {
    Circular,
    Oval,
    Elongated,
}

impl SeedShape {
    /// Classify a length/width aspect ratio.
    ///
    /// `< 1.2` circular, `<= 1.8` oval, above that elongated.
    pub fn from_aspect_ratio(aspect_ratio: f64) -> Self {
        if aspect_ratio < 1.2 {
            SeedShape::Circular
        } else if aspect_ratio <= 1.8 {
            SeedShape::Oval
        } else {
            SeedShape::Elongated
        }
    }
}

/// Measurement of a single seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedMeasurement {
    /// 1-based id, assigned in region-discovery order.
    pub id: usize,
    pub length_mm: f64,
    pub width_mm: f64,
    /// `length_mm / width_mm`; infinite when the fitted width is zero.
    pub aspect_ratio: f64,
    pub shape: SeedShape,
    pub area_mm2: f64,
    /// Center in pixel coordinates, rounded to 1 decimal.
    pub center_x: f64,
    pub center_y: f64,
}

/// Min/max/mean/standard deviation for one dimension, in millimeters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionStats {
    pub min_mm: f64,
    pub max_mm: f64,
    pub mean_mm: f64,
    /// Population standard deviation (divide by N).
    pub std_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSummary {
    pub length: DimensionStats,
    pub width: DimensionStats,
}

/// Counts per shape class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDistribution {
    pub circular: usize,
    pub oval: usize,
    pub elongated: usize,
}

/// Large/small seed counts from area percentile thresholds.
///
/// The two sets can overlap on small samples where the percentiles
/// coincide; that is expected, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeRatio {
    pub large_count: usize,
    pub small_count: usize,
    /// `large_count / small_count`, or `0.0` when `small_count` is zero.
    pub ratio: f64,
}

/// Aggregate statistics over all measured seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_seed_count: usize,
    pub dimensions: DimensionSummary,
    pub shape_distribution: ShapeDistribution,
    pub size_ratio: SizeRatio,
}

/// Complete output of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub calibration: CalibrationResult,
    pub measurements: Vec<SeedMeasurement>,
    pub statistics: Statistics,
    pub processing_time_ms: u64,
}
