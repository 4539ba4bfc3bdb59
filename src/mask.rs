//! Binary-mask construction and the raster primitives behind cluster
//! splitting.
//!
//! The seed mask is built as an ordered sequence of named stages so each
//! stage can be tested on its own: combined thresholding, bright-background
//! suppression, thin-line removal, denoising, and hole filling. Later in the
//! pipeline the distance map, local-maxima search, and marker flood drive
//! the separation of touching seeds.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{close, open};

/// Per-pixel distance to the nearest background pixel.
pub type DistanceMap = ImageBuffer<Luma<f64>, Vec<f64>>;
/// Connected-component / flood label raster. Zero is unassigned.
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Sigma matching a 5x5 Gaussian smoothing kernel.
const SMOOTHING_SIGMA: f32 = 1.1;

/// Intensity above which a pixel is treated as grid-paper background.
pub const BRIGHT_BACKGROUND_CUTOFF: u8 = 180;

pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Gaussian smoothing to suppress sensor noise before thresholding.
pub fn smooth(gray: &GrayImage) -> GrayImage {
    gaussian_blur_f32(gray, SMOOTHING_SIGMA)
}

/// Inverted local adaptive threshold: foreground where a pixel is at least
/// `bias` below the mean of its `block_size` x `block_size` neighborhood.
///
/// Written against an integral image because the ecosystem primitive has no
/// bias term, and uneven illumination needs one.
pub fn adaptive_threshold_inv(gray: &GrayImage, block_size: u32, bias: i32) -> GrayImage {
    debug_assert!(block_size % 2 == 1, "block size must be odd");
    let (width, height) = gray.dimensions();
    let radius = (block_size / 2) as i64;

    // Integral image with a zero row/column so window sums need no branches.
    let w1 = width as usize + 1;
    let mut integral = vec![0u64; w1 * (height as usize + 1)];
    for y in 0..height as usize {
        let mut row_sum = 0u64;
        for x in 0..width as usize {
            row_sum += gray.get_pixel(x as u32, y as u32)[0] as u64;
            integral[(y + 1) * w1 + x + 1] = integral[y * w1 + x + 1] + row_sum;
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..height as i64 {
        let y0 = (y - radius).max(0) as usize;
        let y1 = ((y + radius + 1).min(height as i64)) as usize;
        for x in 0..width as i64 {
            let x0 = (x - radius).max(0) as usize;
            let x1 = ((x + radius + 1).min(width as i64)) as usize;

            let sum = integral[y1 * w1 + x1] + integral[y0 * w1 + x0]
                - integral[y0 * w1 + x1]
                - integral[y1 * w1 + x0];
            let count = ((y1 - y0) * (x1 - x0)) as u64;
            let mean = (sum / count) as i32;

            let px = gray.get_pixel(x as u32, y as u32)[0] as i32;
            let value = if px <= mean - bias { 255 } else { 0 };
            out.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
    out
}

/// Inverted Otsu threshold: foreground at or below the automatic level.
pub fn otsu_threshold_inv(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    map_mask(gray, |px| px <= level)
}

/// Foreground where intensity exceeds `cutoff`.
pub fn binarize_above(gray: &GrayImage, cutoff: u8) -> GrayImage {
    map_mask(gray, |px| px > cutoff)
}

fn map_mask(gray: &GrayImage, predicate: impl Fn(u8) -> bool) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (dst, src) in out.iter_mut().zip(gray.iter()) {
        *dst = if predicate(*src) { 255 } else { 0 };
    }
    out
}

/// Stage 1: Otsu and adaptive thresholds combined with logical OR.
///
/// Otsu handles the bimodal seeds-vs-paper case; the adaptive mask picks up
/// seeds lost to uneven lighting.
pub fn combined_seed_threshold(smoothed: &GrayImage) -> GrayImage {
    let otsu_mask = otsu_threshold_inv(smoothed);
    let adaptive_mask = adaptive_threshold_inv(smoothed, 21, 5);

    let mut out = otsu_mask;
    for (dst, src) in out.iter_mut().zip(adaptive_mask.iter()) {
        *dst |= *src;
    }
    out
}

/// Stage 2: drop pixels that are bright in the unsmoothed grayscale
/// (grid paper), i.e. AND with the inverted bright mask.
pub fn suppress_bright_background(mask: &GrayImage, gray: &GrayImage, cutoff: u8) -> GrayImage {
    let bright = binarize_above(gray, cutoff);
    let mut out = mask.clone();
    for (dst, b) in out.iter_mut().zip(bright.iter()) {
        if *b != 0 {
            *dst = 0;
        }
    }
    out
}

/// Stage 3: opening with a small kernel to erase thin grid-line residue.
pub fn remove_thin_lines(mask: &GrayImage) -> GrayImage {
    open(mask, Norm::L1, 1)
}

/// Stage 4: opening with a 5x5-equivalent kernel to remove speckle noise.
pub fn denoise(mask: &GrayImage) -> GrayImage {
    open(mask, Norm::L1, 2)
}

/// Stage 5: closing with a 7x7-equivalent kernel to fill holes inside seeds.
pub fn fill_holes(mask: &GrayImage) -> GrayImage {
    close(mask, Norm::L1, 3)
}

/// Euclidean distance from each foreground pixel to the nearest background
/// pixel. Background pixels map to zero.
pub fn distance_map(mask: &GrayImage) -> DistanceMap {
    let inverted = map_mask(mask, |px| px == 0);
    let mut squared = euclidean_squared_distance_transform(&inverted);
    for px in squared.iter_mut() {
        *px = px.sqrt();
    }
    squared
}

/// Binarize a distance map at `threshold` (strictly above).
pub fn threshold_distance(dist: &DistanceMap, threshold: f64) -> GrayImage {
    let mut out = GrayImage::new(dist.width(), dist.height());
    for (dst, src) in out.iter_mut().zip(dist.iter()) {
        *dst = if *src > threshold { 255 } else { 0 };
    }
    out
}

/// Maximum value of a distance map.
pub fn distance_peak(dist: &DistanceMap) -> f64 {
    dist.iter().copied().fold(0.0, f64::max)
}

/// Local maxima of the distance map: pixels equal to the maximum of their
/// `(2r+1)` x `(2r+1)` window and strictly above `min_value`.
///
/// Returned in row-major scan order.
pub fn local_maxima(dist: &DistanceMap, min_value: f64, radius: u32) -> Vec<(u32, u32)> {
    let (width, height) = dist.dimensions();
    let r = radius as i64;
    let mut maxima = Vec::new();

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let value = dist.get_pixel(x as u32, y as u32)[0];
            if value <= min_value {
                continue;
            }
            let mut window_max = f64::MIN;
            for ny in (y - r).max(0)..=(y + r).min(height as i64 - 1) {
                for nx in (x - r).max(0)..=(x + r).min(width as i64 - 1) {
                    window_max = window_max.max(dist.get_pixel(nx as u32, ny as u32)[0]);
                }
            }
            if value == window_max {
                maxima.push((x as u32, y as u32));
            }
        }
    }
    maxima
}

/// Marker-guided flooding over a distance map (watershed).
///
/// Unassigned pixels (label zero) are claimed by whichever labeled front
/// reaches them first, fronts advancing from high distance values to low.
/// Ties resolve in insertion order, so the result is deterministic.
pub fn flood_from_markers(markers: &LabelImage, dist: &DistanceMap) -> LabelImage {
    let (width, height) = markers.dimensions();
    let mut labels = markers.clone();

    // Max-heap keyed on quantized distance, FIFO within equal keys.
    let mut heap: BinaryHeap<(i64, Reverse<u64>, u32, u32, u32)> = BinaryHeap::new();
    let mut seq = 0u64;

    let push_neighbors =
        |heap: &mut BinaryHeap<(i64, Reverse<u64>, u32, u32, u32)>,
         labels: &LabelImage,
         seq: &mut u64,
         x: u32,
         y: u32,
         label: u32| {
            let neighbors = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbors {
                if nx < width && ny < height && labels.get_pixel(nx, ny)[0] == 0 {
                    let key = (dist.get_pixel(nx, ny)[0] * 1e6) as i64;
                    heap.push((key, Reverse(*seq), nx, ny, label));
                    *seq += 1;
                }
            }
        };

    for y in 0..height {
        for x in 0..width {
            let label = labels.get_pixel(x, y)[0];
            if label != 0 {
                push_neighbors(&mut heap, &labels, &mut seq, x, y, label);
            }
        }
    }

    while let Some((_, _, x, y, label)) = heap.pop() {
        if labels.get_pixel(x, y)[0] != 0 {
            continue;
        }
        labels.put_pixel(x, y, Luma([label]));
        push_neighbors(&mut heap, &labels, &mut seq, x, y, label);
    }

    labels
}
