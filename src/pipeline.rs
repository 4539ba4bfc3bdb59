//! Orchestration of the fixed calibrate -> segment -> measure -> aggregate
//! sequence.

use std::time::Instant;

use image::RgbImage;

use crate::calibration::GridCalibrator;
use crate::config::ProcessingConfig;
use crate::error::AnalysisError;
use crate::measurement::SeedMeasurer;
use crate::models::{AnalysisResult, SeedMeasurement};
use crate::segmentation::SeedSegmenter;

/// Runs the complete seed analysis pipeline.
///
/// Stateless after construction; safe to share across concurrent callers,
/// each `analyze` call works on its own buffers.
#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    config: ProcessingConfig,
    calibrator: GridCalibrator,
    segmenter: SeedSegmenter,
    measurer: SeedMeasurer,
}

impl AnalysisPipeline {
    /// Build a pipeline, validating the configuration up front.
    pub fn new(config: ProcessingConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        let calibrator = GridCalibrator::new(config.grid_size_mm);
        let segmenter = SeedSegmenter::new(
            config.max_single_seed_area_mm2,
            config.max_seed_length_mm,
            config.max_split_depth,
        );
        Ok(Self {
            config,
            calibrator,
            segmenter,
            measurer: SeedMeasurer::new(),
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Analyze one image: calibration, segmentation, measurement of every
    /// region in discovery order with 1-based ids, then statistics, all
    /// wrapped with elapsed wall-clock milliseconds.
    pub fn analyze(&self, image: &RgbImage) -> Result<AnalysisResult, AnalysisError> {
        let start = Instant::now();
        tracing::info!(
            width = image.width(),
            height = image.height(),
            "starting seed analysis"
        );

        let calibration = self.calibrator.calibrate(image)?;
        tracing::info!(
            pixels_per_mm = calibration.pixels_per_mm,
            grid_lines = calibration.grid_lines_detected,
            confidence = calibration.confidence,
            "calibration complete"
        );

        let regions = self.segmenter.segment(
            image,
            calibration.pixels_per_mm,
            self.config.min_seed_area_mm2,
            self.config.max_seed_area_mm2,
        )?;
        if regions.is_empty() {
            return Err(AnalysisError::NoSeedsDetected);
        }
        tracing::info!(seed_count = regions.len(), "segmentation complete");

        let measurements: Vec<SeedMeasurement> = regions
            .iter()
            .enumerate()
            .map(|(i, region)| {
                self.measurer
                    .measure(region, calibration.pixels_per_mm, i + 1)
            })
            .collect();

        let statistics = self
            .measurer
            .calculate_statistics(
                &measurements,
                self.config.large_percentile,
                self.config.small_percentile,
            )
            .ok_or(AnalysisError::NoSeedsDetected)?;

        let processing_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(processing_time_ms, "analysis complete");

        Ok(AnalysisResult {
            calibration,
            measurements,
            statistics,
            processing_time_ms,
        })
    }
}
