//! Millimeter-grid detection and pixel-to-millimeter calibration.

use image::RgbImage;
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions};

use crate::error::AnalysisError;
use crate::geometry::{median, round_to};
use crate::mask;
use crate::models::CalibrationResult;

/// Minimum total line detections before attempting calibration.
const MIN_LINES_REQUIRED: usize = 5;
/// Minimum classified lines required per axis.
const MIN_DIRECTIONAL_LINES: usize = 3;
/// Gaps at or below this are duplicate detections of one grid line.
const MIN_LINE_GAP_PX: f64 = 5.0;

/// Detects the millimeter grid and derives the conversion factor.
#[derive(Debug, Clone)]
pub struct GridCalibrator {
    grid_size_mm: f64,
}

impl GridCalibrator {
    pub fn new(grid_size_mm: f64) -> Self {
        Self { grid_size_mm }
    }

    /// Detect grid lines and compute pixels per millimeter.
    ///
    /// Deterministic for a given input; failures are user-correctable
    /// (grid not visible, lighting, wrinkled paper) and carry counts.
    pub fn calibrate(&self, image: &RgbImage) -> Result<CalibrationResult, AnalysisError> {
        let gray = mask::to_grayscale(image);
        let smoothed = mask::smooth(&gray);

        // Adaptive threshold copes with uneven lighting; inverted so grid
        // lines are foreground.
        let binary = mask::adaptive_threshold_inv(&smoothed, 11, 2);
        let edges = canny(&binary, 50.0, 150.0);

        // Votes count edge pixels on a line, so the threshold doubles as a
        // minimum line length of 15% of the shorter image dimension.
        let min_dim = image.width().min(image.height());
        let options = LineDetectionOptions {
            vote_threshold: ((min_dim as f32 * 0.15) as u32).max(50),
            suppression_radius: 8,
        };
        let lines = detect_lines(&edges, options);

        if lines.len() < MIN_LINES_REQUIRED {
            return Err(AnalysisError::GridNotDetected {
                lines_detected: lines.len(),
            });
        }

        // Classify by polar angle: theta near 0/180 is a vertical line
        // (position |r| on the x axis), theta near 90 a horizontal one
        // (position r on the y axis). Everything else is noise.
        let mut horizontal: Vec<f64> = Vec::new();
        let mut vertical: Vec<f64> = Vec::new();
        for line in &lines {
            let angle = line.angle_in_degrees;
            if angle < 15 || angle > 165 {
                vertical.push(line.r.abs() as f64);
            } else if (75..=105).contains(&angle) {
                horizontal.push(line.r as f64);
            }
        }

        if horizontal.len() < MIN_DIRECTIONAL_LINES || vertical.len() < MIN_DIRECTIONAL_LINES {
            return Err(AnalysisError::InsufficientGridLines {
                horizontal: horizontal.len(),
                vertical: vertical.len(),
            });
        }

        horizontal.sort_by(|a, b| a.total_cmp(b));
        vertical.sort_by(|a, b| a.total_cmp(b));

        let h_estimate = median_spacing(&horizontal);
        let v_estimate = median_spacing(&vertical);
        let (Some(h_spacing), Some(v_spacing)) = (h_estimate, v_estimate) else {
            return Err(AnalysisError::InconsistentGridSpacing {
                h_spacing: h_estimate,
                v_spacing: v_estimate,
            });
        };

        let avg_spacing = (h_spacing + v_spacing) / 2.0;
        let pixels_per_mm = avg_spacing / self.grid_size_mm;

        let spacing_consistency = 1.0 - (h_spacing - v_spacing).abs() / h_spacing.max(v_spacing);
        let line_count_factor = 1.0f64.min((horizontal.len() + vertical.len()) as f64 / 20.0);
        let confidence = spacing_consistency * 0.7 + line_count_factor * 0.3;

        tracing::debug!(
            pixels_per_mm,
            h_lines = horizontal.len(),
            v_lines = vertical.len(),
            "grid calibration complete"
        );

        Ok(CalibrationResult {
            pixels_per_mm,
            grid_lines_detected: horizontal.len() + vertical.len(),
            confidence: round_to(confidence, 3),
        })
    }
}

/// Robust median spacing of sorted line positions.
///
/// Consecutive differences at or below [`MIN_LINE_GAP_PX`] are duplicate
/// detections and are dropped. The median of the rest is refined by
/// re-taking the median over spacings within 50% of it; if that band is
/// empty the unfiltered median stands.
fn median_spacing(positions: &[f64]) -> Option<f64> {
    if positions.len() < 2 {
        return None;
    }

    let spacings: Vec<f64> = positions
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| *d > MIN_LINE_GAP_PX)
        .collect();
    let rough = median(&spacings)?;

    let banded: Vec<f64> = spacings
        .iter()
        .copied()
        .filter(|s| *s > 0.5 * rough && *s < 1.5 * rough)
        .collect();

    match median(&banded) {
        Some(refined) => Some(refined),
        None => Some(rough),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_line_segment_mut;

    fn grid_image(size: u32, spacing: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(size, size, Rgb([255, 255, 255]));
        let line = Rgb([128, 128, 128]);
        for i in (0..size).step_by(spacing as usize) {
            draw_line_segment_mut(&mut img, (i as f32, 0.0), (i as f32, size as f32 - 1.0), line);
            draw_line_segment_mut(&mut img, (0.0, i as f32), (size as f32 - 1.0, i as f32), line);
        }
        img
    }

    #[test]
    fn median_spacing_discards_outliers() {
        // Diffs are [10, 10, 11, 34]; raw median 10.5; the 50% band drops
        // the 34 and the refined median is 10.
        let positions = [10.0, 20.0, 30.0, 41.0, 75.0];
        assert_eq!(median_spacing(&positions), Some(10.0));
    }

    #[test]
    fn median_spacing_drops_duplicate_detections() {
        let positions = [10.0, 12.0, 30.0, 50.0, 70.0];
        // The 2 px gap is a double detection; remaining diffs 18, 20, 20.
        assert_eq!(median_spacing(&positions), Some(20.0));
    }

    #[test]
    fn median_spacing_fails_without_plausible_gaps() {
        assert_eq!(median_spacing(&[10.0, 11.0, 12.0]), None);
        assert_eq!(median_spacing(&[10.0]), None);
    }

    #[test]
    fn calibrates_synthetic_grid() {
        let image = grid_image(400, 25);
        let result = GridCalibrator::new(1.0).calibrate(&image).unwrap();

        assert!(
            (result.pixels_per_mm - 25.0).abs() < 3.0,
            "pixels_per_mm = {}",
            result.pixels_per_mm
        );
        assert!(result.pixels_per_mm > 0.0);
        assert!((0.0..=1.0).contains(&result.confidence));
        assert!(result.grid_lines_detected >= 6);
    }

    #[test]
    fn blank_image_fails_with_zero_line_count() {
        let image = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        let err = GridCalibrator::new(1.0).calibrate(&image).unwrap_err();
        assert_eq!(err, AnalysisError::GridNotDetected { lines_detected: 0 });
    }

    #[test]
    fn calibration_is_deterministic() {
        let image = grid_image(400, 25);
        let calibrator = GridCalibrator::new(1.0);
        let a = calibrator.calibrate(&image).unwrap();
        let b = calibrator.calibrate(&image).unwrap();
        assert_eq!(a, b);
    }
}
