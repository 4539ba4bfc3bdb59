//! Seed dimension analysis from millimeter-grid photographs.
//!
//! The pipeline runs three stages over a decoded RGB raster: grid-based
//! pixel-to-millimeter calibration, seed segmentation with splitting of
//! touching seeds, and per-seed measurement plus population statistics.

pub mod calibration;
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod measurement;
pub mod models;
pub mod pipeline;
pub mod segmentation;

// Main entry point
pub mod cli_main;

// Re-export commonly used items
pub use config::ProcessingConfig;
pub use error::AnalysisError;
pub use models::{AnalysisResult, CalibrationResult, SeedMeasurement, SeedShape, Statistics};
pub use pipeline::AnalysisPipeline;
