//! Planar geometry over contour point lists: areas, moment-based ellipse
//! fitting, and the small numeric helpers shared by calibration and
//! statistics.

use imageproc::geometry::{convex_hull, min_area_rect};
use imageproc::point::Point;
use nalgebra::Matrix2;

/// Best-effort ellipse fitted to a closed boundary.
///
/// Axis lengths are full diameters and are deliberately not sorted; callers
/// take max/min as needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipseFit {
    pub center_x: f64,
    pub center_y: f64,
    pub axis_a: f64,
    pub axis_b: f64,
}

/// Polygon area of a closed contour (shoelace formula).
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        acc += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    (acc / 2.0).abs()
}

/// Fit an ellipse to a closed boundary via exact polygon second moments.
///
/// The fitted ellipse has the same centroid and central second moments as
/// the filled polygon, which recovers the true axes for solid elliptical
/// blobs. Returns `None` for degenerate (near-zero area) boundaries.
pub fn fit_ellipse(points: &[Point<i32>]) -> Option<EllipseFit> {
    if points.len() < 5 {
        return None;
    }

    let mut area2 = 0.0f64; // twice the signed area
    let mut cx_acc = 0.0f64;
    let mut cy_acc = 0.0f64;
    let mut sxx = 0.0f64;
    let mut syy = 0.0f64;
    let mut sxy = 0.0f64;

    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        let (xi, yi) = (p.x as f64, p.y as f64);
        let (xj, yj) = (q.x as f64, q.y as f64);
        let cross = xi * yj - xj * yi;

        area2 += cross;
        cx_acc += (xi + xj) * cross;
        cy_acc += (yi + yj) * cross;
        sxx += (xi * xi + xi * xj + xj * xj) * cross;
        syy += (yi * yi + yi * yj + yj * yj) * cross;
        sxy += (xi * yj + 2.0 * xi * yi + 2.0 * xj * yj + xj * yi) * cross;
    }

    let area = area2 / 2.0;
    if area.abs() < 1e-9 {
        return None;
    }

    let cx = cx_acc / (3.0 * area2);
    let cy = cy_acc / (3.0 * area2);

    // Central second moments of the filled polygon, normalized by area.
    let mxx = sxx / (12.0 * area) - cx * cx;
    let myy = syy / (12.0 * area) - cy * cy;
    let mxy = sxy / (24.0 * area) - cx * cy;

    let eigen = Matrix2::new(mxx, mxy, mxy, myy).symmetric_eigen();
    // A solid ellipse with semi-axis a has variance a^2 / 4 along that axis.
    let axis_a = 4.0 * eigen.eigenvalues[0].max(0.0).sqrt();
    let axis_b = 4.0 * eigen.eigenvalues[1].max(0.0).sqrt();

    Some(EllipseFit {
        center_x: cx,
        center_y: cy,
        axis_a,
        axis_b,
    })
}

/// Center and side lengths of the minimum-area bounding rectangle.
///
/// Fallback for boundaries too small to fit an ellipse. Collinear input
/// degenerates to a zero-width segment.
pub fn min_area_rect_fit(points: &[Point<i32>]) -> EllipseFit {
    let hull = convex_hull(points);
    if hull.len() < 3 || contour_area(&hull) == 0.0 {
        let min_x = points.iter().map(|p| p.x).min().unwrap_or(0) as f64;
        let max_x = points.iter().map(|p| p.x).max().unwrap_or(0) as f64;
        let min_y = points.iter().map(|p| p.y).min().unwrap_or(0) as f64;
        let max_y = points.iter().map(|p| p.y).max().unwrap_or(0) as f64;
        let dx = max_x - min_x;
        let dy = max_y - min_y;
        return EllipseFit {
            center_x: (min_x + max_x) / 2.0,
            center_y: (min_y + max_y) / 2.0,
            axis_a: (dx * dx + dy * dy).sqrt(),
            axis_b: 0.0,
        };
    }

    let corners = min_area_rect(points);
    let center_x = corners.iter().map(|p| p.x as f64).sum::<f64>() / 4.0;
    let center_y = corners.iter().map(|p| p.y as f64).sum::<f64>() / 4.0;

    let side = |a: &Point<i32>, b: &Point<i32>| -> f64 {
        let dx = (a.x - b.x) as f64;
        let dy = (a.y - b.y) as f64;
        (dx * dx + dy * dy).sqrt()
    };

    EllipseFit {
        center_x,
        center_y,
        axis_a: side(&corners[0], &corners[1]),
        axis_b: side(&corners[1], &corners[2]),
    }
}

/// Median of a sample; averages the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Percentile with linear interpolation between adjacent samples.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let frac = rank - lower as f64;
    if lower + 1 < sorted.len() {
        Some(sorted[lower] + frac * (sorted[lower + 1] - sorted[lower]))
    } else {
        Some(sorted[lower])
    }
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ellipse_boundary(
        cx: f64,
        cy: f64,
        semi_x: f64,
        semi_y: f64,
        samples: usize,
    ) -> Vec<Point<i32>> {
        (0..samples)
            .map(|i| {
                let t = 2.0 * std::f64::consts::PI * i as f64 / samples as f64;
                Point::new(
                    (cx + semi_x * t.cos()).round() as i32,
                    (cy + semi_y * t.sin()).round() as i32,
                )
            })
            .collect()
    }

    #[test]
    fn shoelace_area_of_rectangle() {
        let points = vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 4),
            Point::new(0, 4),
        ];
        assert_eq!(contour_area(&points), 40.0);
        assert_eq!(contour_area(&points[..2]), 0.0);
    }

    #[test]
    fn ellipse_fit_recovers_axes() {
        let points = ellipse_boundary(300.0, 300.0, 200.0, 100.0, 720);
        let fit = fit_ellipse(&points).unwrap();

        let major = fit.axis_a.max(fit.axis_b);
        let minor = fit.axis_a.min(fit.axis_b);
        assert!((major - 400.0).abs() < 1.0, "major = {major}");
        assert!((minor - 200.0).abs() < 1.0, "minor = {minor}");
        assert!((fit.center_x - 300.0).abs() < 0.5);
        assert!((fit.center_y - 300.0).abs() < 0.5);
    }

    #[test]
    fn ellipse_fit_rejects_degenerate_input() {
        let collinear: Vec<Point<i32>> = (0..6).map(|i| Point::new(i, i)).collect();
        assert!(fit_ellipse(&collinear).is_none());
        assert!(fit_ellipse(&[Point::new(0, 0), Point::new(1, 1)]).is_none());
    }

    #[test]
    fn min_area_rect_fit_of_axis_aligned_box() {
        let points = vec![
            Point::new(10, 10),
            Point::new(30, 10),
            Point::new(30, 20),
            Point::new(10, 20),
        ];
        let fit = min_area_rect_fit(&points);
        let major = fit.axis_a.max(fit.axis_b);
        let minor = fit.axis_a.min(fit.axis_b);
        assert_eq!(major, 20.0);
        assert_eq!(minor, 10.0);
        assert_eq!(fit.center_x, 20.0);
        assert_eq!(fit.center_y, 15.0);
    }

    #[test]
    fn median_handles_odd_and_even_lengths() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [1.0, 2.0, 3.0, 4.0, 10.0];
        assert_eq!(percentile(&values, 75.0), Some(4.0));
        assert_eq!(percentile(&values, 25.0), Some(2.0));
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        assert_eq!(percentile(&values, 90.0), Some(7.6));
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(10.0));
    }

    #[test]
    fn rounding_helper() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(10.5004, 1), 10.5);
        assert!(round_to(f64::INFINITY, 3).is_infinite());
    }
}
