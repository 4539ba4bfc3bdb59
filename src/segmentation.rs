//! Seed isolation: mask construction, blob extraction, and splitting of
//! touching seeds via distance-transform markers and flooding.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_filled_circle_mut, draw_polygon_mut};
use imageproc::geometry::convex_hull;
use imageproc::morphology::{dilate, erode};
use imageproc::point::Point;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::error::AnalysisError;
use crate::geometry::{contour_area, fit_ellipse};
use crate::mask;
use crate::mask::LabelImage;

/// Outer boundary of one connected foreground blob, in discovery order.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub points: Vec<Point<i32>>,
}

impl Region {
    pub fn area_px(&self) -> f64 {
        contour_area(&self.points)
    }
}

/// Pixel-space size bounds derived from the calibration factor.
#[derive(Debug, Clone, Copy)]
struct SizeBounds {
    min_area_px: f64,
    max_single_area_px: f64,
    max_length_px: f64,
}

/// Detects and separates individual seeds from an image.
#[derive(Debug, Clone)]
pub struct SeedSegmenter {
    max_single_seed_area_mm2: f64,
    max_seed_length_mm: f64,
    max_split_depth: u32,
}

impl SeedSegmenter {
    pub fn new(max_single_seed_area_mm2: f64, max_seed_length_mm: f64, max_split_depth: u32) -> Self {
        Self {
            max_single_seed_area_mm2,
            max_seed_length_mm,
            max_split_depth,
        }
    }

    /// Segment seeds, splitting clusters of touching seeds into individuals.
    ///
    /// Each oversized cluster is split in place, so its pieces keep the
    /// cluster's position in contour-discovery order. Oversized blobs that
    /// cannot be split are dropped entirely rather than kept as one merged
    /// region; precision over recall. A cluster that is still oversized
    /// after `max_split_depth` rounds of splitting aborts the run with
    /// [`AnalysisError::SplitLimitExceeded`].
    pub fn segment(
        &self,
        image: &RgbImage,
        pixels_per_mm: f64,
        min_seed_area_mm2: f64,
        _max_seed_area_mm2: f64,
    ) -> Result<Vec<Region>, AnalysisError> {
        let bounds = SizeBounds {
            min_area_px: min_seed_area_mm2 * pixels_per_mm * pixels_per_mm,
            max_single_area_px: self.max_single_seed_area_mm2 * pixels_per_mm * pixels_per_mm,
            max_length_px: self.max_seed_length_mm * pixels_per_mm,
        };

        let seed_mask = build_seed_mask(image);

        let mut regions: Vec<Region> = Vec::new();
        for contour in find_contours::<i32>(&seed_mask) {
            if contour.border_type != BorderType::Outer {
                continue;
            }
            let area = contour_area(&contour.points);
            if area < bounds.min_area_px {
                continue;
            }
            if is_too_large(&contour.points, area, bounds) {
                self.split_into(
                    &mut regions,
                    seed_mask.dimensions(),
                    contour.points,
                    pixels_per_mm,
                    bounds,
                )?;
            } else if is_valid_seed_shape(&contour.points) {
                regions.push(Region {
                    points: contour.points,
                });
            }
        }

        Ok(regions)
    }

    /// Split one oversized cluster and append its accepted pieces.
    ///
    /// A per-cluster worklist replaces recursion so the split depth stays
    /// bounded; pieces that are still oversized re-enter with `depth + 1`.
    fn split_into(
        &self,
        regions: &mut Vec<Region>,
        dimensions: (u32, u32),
        points: Vec<Point<i32>>,
        pixels_per_mm: f64,
        bounds: SizeBounds,
    ) -> Result<(), AnalysisError> {
        let mut worklist = vec![(points, 0u32)];
        while let Some((cluster, depth)) = worklist.pop() {
            if depth >= self.max_split_depth {
                return Err(AnalysisError::SplitLimitExceeded {
                    max_depth: self.max_split_depth,
                });
            }
            let pieces = split_cluster(dimensions, &cluster, pixels_per_mm, bounds);
            if pieces.is_empty() {
                tracing::debug!(depth, "unsplittable oversized cluster dropped");
            }
            for piece in pieces {
                let area = contour_area(&piece);
                if is_too_large(&piece, area, bounds) {
                    worklist.push((piece, depth + 1));
                } else if area >= bounds.min_area_px
                    && area <= bounds.max_single_area_px
                    && is_valid_seed_shape(&piece)
                {
                    regions.push(Region { points: piece });
                }
            }
        }
        Ok(())
    }
}

/// Build the binary seed mask through the fixed stage sequence.
pub fn build_seed_mask(image: &RgbImage) -> GrayImage {
    let gray = mask::to_grayscale(image);
    let smoothed = mask::smooth(&gray);

    let combined = mask::combined_seed_threshold(&smoothed);
    let no_paper =
        mask::suppress_bright_background(&combined, &gray, mask::BRIGHT_BACKGROUND_CUTOFF);
    let no_lines = mask::remove_thin_lines(&no_paper);
    let denoised = mask::denoise(&no_lines);
    mask::fill_holes(&denoised)
}

/// A blob is too large for a single seed when its area exceeds the single
/// seed ceiling, or its fitted major axis exceeds the length bound.
fn is_too_large(points: &[Point<i32>], area: f64, bounds: SizeBounds) -> bool {
    if area > bounds.max_single_area_px {
        return true;
    }
    if points.len() >= 5 {
        if let Some(fit) = fit_ellipse(points) {
            return fit.axis_a.max(fit.axis_b) > bounds.max_length_px;
        }
    }
    false
}

/// Shape plausibility filter for a single seed.
fn is_valid_seed_shape(points: &[Point<i32>]) -> bool {
    let area = contour_area(points);
    if area < 10.0 {
        return false;
    }

    let hull = convex_hull(points);
    let hull_area = contour_area(&hull);
    if hull_area == 0.0 {
        return false;
    }
    // Low solidity means a concave outline: noise or an unsplit merge.
    if area / hull_area < 0.6 {
        return false;
    }

    if points.len() >= 5 {
        if let Some(fit) = fit_ellipse(points) {
            let major = fit.axis_a.max(fit.axis_b);
            let minor = fit.axis_a.min(fit.axis_b);
            if minor > 0.0 && major / minor > 5.0 {
                return false;
            }
        }
    }
    true
}

/// Split one oversized cluster into candidate sub-regions.
///
/// Markers come from thresholding the distance transform of the eroded
/// cluster; if that yields fewer than two centers the threshold is
/// loosened once, and finally local maxima of the distance map are used
/// as synthetic markers. Fewer than two centers means the cluster cannot
/// be split and an empty list is returned.
fn split_cluster(
    dimensions: (u32, u32),
    points: &[Point<i32>],
    pixels_per_mm: f64,
    bounds: SizeBounds,
) -> Vec<Vec<Point<i32>>> {
    if points.len() < 3 {
        return Vec::new();
    }
    let (width, height) = dimensions;

    let mut isolated = GrayImage::new(width, height);
    let polygon = open_polygon(points);
    draw_polygon_mut(&mut isolated, polygon, Luma([255]));

    // Pull touching seeds apart before distance analysis.
    let eroded = erode(&isolated, Norm::L1, 2);
    let dist = mask::distance_map(&eroded);
    let peak = mask::distance_peak(&dist);

    // Half a millimeter, floor 3 px: minimum plausible center-to-edge distance.
    let min_dist = (pixels_per_mm * 0.5).max(3.0);

    let threshold = (0.2 * peak).max(min_dist);
    let centers = mask::threshold_distance(&dist, threshold);
    let mut labels = connected_components(&centers, Connectivity::Eight, Luma([0u8]));
    let mut center_count = max_label(&labels);

    if center_count < 2 {
        // Looser threshold before giving up on the distance peaks.
        let threshold = (0.15 * peak).max(min_dist * 0.5);
        let centers = mask::threshold_distance(&dist, threshold);
        labels = connected_components(&centers, Connectivity::Eight, Luma([0u8]));
        center_count = max_label(&labels);
    }

    if center_count < 2 {
        // Synthesize markers at local maxima of the distance map, capped by
        // the seed count the cluster area suggests.
        let estimated = ((contour_area(points) / bounds.max_single_area_px) as usize + 1).max(2);
        let maxima = mask::local_maxima(&dist, min_dist, 3);
        if maxima.len() >= 2 {
            let mut marker_mask = GrayImage::new(width, height);
            for &(x, y) in maxima.iter().take((estimated * 2).min(20)) {
                draw_filled_circle_mut(
                    &mut marker_mask,
                    (x as i32, y as i32),
                    min_dist as i32,
                    Luma([255]),
                );
            }
            labels = connected_components(&marker_mask, Connectivity::Eight, Luma([0u8]));
            center_count = max_label(&labels);
        }
    }

    if center_count < 2 {
        return Vec::new();
    }

    // Sure background outside the dilated cluster; the band between it and
    // the centers is unknown and gets flooded.
    let sure_bg = dilate(&isolated, Norm::L1, 3);
    let mut markers = LabelImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let center_label = labels.get_pixel(x, y)[0];
            let value = if center_label != 0 {
                center_label + 1
            } else if sure_bg.get_pixel(x, y)[0] == 0 {
                1
            } else {
                0
            };
            markers.put_pixel(x, y, Luma([value]));
        }
    }

    let flooded = mask::flood_from_markers(&markers, &mask::distance_map(&isolated));

    let mut pieces = Vec::new();
    for label in 2..=center_count + 1 {
        let mut piece_mask = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                if flooded.get_pixel(x, y)[0] == label && isolated.get_pixel(x, y)[0] != 0 {
                    piece_mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        for contour in find_contours::<i32>(&piece_mask) {
            if contour.border_type == BorderType::Outer {
                pieces.push(contour.points);
            }
        }
    }
    pieces
}

fn max_label(labels: &LabelImage) -> u32 {
    labels.iter().copied().max().unwrap_or(0)
}

/// Contour points ready for polygon drawing (first must not equal last).
fn open_polygon(points: &[Point<i32>]) -> &[Point<i32>] {
    if points.len() > 1 && points.first() == points.last() {
        &points[..points.len() - 1]
    } else {
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_ellipse_mut;

    const SEED: Rgb<u8> = Rgb([60, 60, 60]);

    fn white_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
    }

    fn segmenter() -> SeedSegmenter {
        SeedSegmenter::new(12.0, 6.0, 8)
    }

    #[test]
    fn mask_isolates_dark_seeds() {
        let mut image = white_image(200, 200);
        draw_filled_ellipse_mut(&mut image, (60, 60), 20, 10, SEED);

        let mask = build_seed_mask(&image);
        assert_eq!(mask.get_pixel(60, 60)[0], 255);
        assert_eq!(mask.get_pixel(150, 150)[0], 0);
    }

    #[test]
    fn finds_separated_seeds() {
        let mut image = white_image(400, 400);
        draw_filled_ellipse_mut(&mut image, (100, 100), 20, 10, SEED);
        draw_filled_ellipse_mut(&mut image, (300, 300), 15, 15, SEED);

        // 20 px/mm: both blobs are within the single-seed bounds.
        let regions = segmenter().segment(&image, 20.0, 0.5, 100.0).unwrap();
        assert_eq!(regions.len(), 2);
        for region in &regions {
            let area_mm2 = region.area_px() / 400.0;
            assert!(area_mm2 >= 0.5 && area_mm2 <= 12.0, "area {area_mm2} mm2");
        }
    }

    #[test]
    fn ignores_specks_below_minimum_area() {
        let mut image = white_image(200, 200);
        draw_filled_ellipse_mut(&mut image, (100, 100), 4, 4, SEED);

        // 20 px/mm: the blob is ~50 px^2, well under 0.5 mm^2 = 200 px^2.
        let regions = segmenter().segment(&image, 20.0, 0.5, 100.0).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn splits_touching_seeds() {
        let mut image = white_image(300, 200);
        // Two overlapping circles form one blob over the single-seed area
        // ceiling at 10 px/mm (12 mm^2 = 1200 px^2), while each half stays
        // under it.
        draw_filled_ellipse_mut(&mut image, (130, 100), 18, 18, SEED);
        draw_filled_ellipse_mut(&mut image, (162, 100), 18, 18, SEED);

        let regions = segmenter().segment(&image, 10.0, 0.5, 100.0).unwrap();
        assert_eq!(regions.len(), 2, "expected the cluster to split in two");
        for region in &regions {
            let area = region.area_px();
            assert!(area > 500.0 && area < 1200.0, "piece area {area}");
        }
    }

    #[test]
    fn aborts_when_split_depth_is_exhausted() {
        let mut image = white_image(300, 150);
        // Two overlapping circles, each alone far above the single-seed
        // ceiling at 10 px/mm, so the first split's pieces are still
        // oversized and re-enter the worklist past the depth bound.
        draw_filled_ellipse_mut(&mut image, (100, 75), 30, 30, SEED);
        draw_filled_ellipse_mut(&mut image, (152, 75), 30, 30, SEED);

        let err = SeedSegmenter::new(12.0, 6.0, 1)
            .segment(&image, 10.0, 0.5, 100.0)
            .unwrap_err();
        assert_eq!(err, AnalysisError::SplitLimitExceeded { max_depth: 1 });
    }

    #[test]
    fn split_pieces_keep_their_cluster_position_in_discovery_order() {
        let mut image = white_image(300, 300);
        draw_filled_ellipse_mut(&mut image, (150, 40), 10, 10, SEED);
        draw_filled_ellipse_mut(&mut image, (130, 150), 18, 18, SEED);
        draw_filled_ellipse_mut(&mut image, (162, 150), 18, 18, SEED);
        draw_filled_ellipse_mut(&mut image, (150, 260), 10, 10, SEED);

        let regions = segmenter().segment(&image, 10.0, 0.5, 100.0).unwrap();
        assert_eq!(regions.len(), 4);

        // Contours are discovered top to bottom; the middle cluster's two
        // pieces must stay between the single seeds above and below it.
        let ys: Vec<f64> = regions.iter().map(mean_y).collect();
        assert!(ys[0] < 100.0, "first region y {}", ys[0]);
        assert!((100.0..200.0).contains(&ys[1]), "piece y {}", ys[1]);
        assert!((100.0..200.0).contains(&ys[2]), "piece y {}", ys[2]);
        assert!(ys[3] > 200.0, "last region y {}", ys[3]);
    }

    fn mean_y(region: &Region) -> f64 {
        region.points.iter().map(|p| p.y as f64).sum::<f64>() / region.points.len() as f64
    }

    #[test]
    fn drops_unsplittable_oversized_blob() {
        let mut image = white_image(400, 100);
        // A long thin bar: too large by length, no interior distance peaks.
        for y in 46..54 {
            for x in 50..350 {
                image.put_pixel(x, y, SEED);
            }
        }

        let regions = segmenter().segment(&image, 10.0, 0.5, 100.0).unwrap();
        assert!(regions.is_empty(), "cluster should be dropped, not kept");
    }

    #[test]
    fn segmentation_is_deterministic() {
        let mut image = white_image(400, 400);
        draw_filled_ellipse_mut(&mut image, (100, 100), 20, 10, SEED);
        draw_filled_ellipse_mut(&mut image, (250, 250), 20, 20, SEED);
        draw_filled_ellipse_mut(&mut image, (286, 250), 20, 20, SEED);

        let seg = segmenter();
        let first = seg.segment(&image, 10.0, 0.5, 100.0).unwrap();
        let second = seg.segment(&image, 10.0, 0.5, 100.0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_low_solidity_outline() {
        // A thin L of two arms has hull area far above its own.
        let mut points = Vec::new();
        for x in 0..40 {
            points.push(Point::new(x, 0));
        }
        for y in 1..40 {
            points.push(Point::new(39, y));
        }
        for y in (1..40).rev() {
            points.push(Point::new(37, y));
        }
        for x in (0..38).rev() {
            points.push(Point::new(x, 2));
        }
        assert!(!is_valid_seed_shape(&points));
    }
}
