use anyhow::{Context, Result};
use clap::Parser;
use image::RgbImage;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use crate::calibration::GridCalibrator;
use crate::cli::{Cli, Commands};
use crate::config::ProcessingConfig;
use crate::error::AnalysisError;
use crate::pipeline::AnalysisPipeline;

pub fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ProcessingConfig::from_file(path)?,
        None => ProcessingConfig::default(),
    };

    match cli.command {
        Commands::Analyze { image, pretty } => {
            let raster = load_rgb(&image)?;
            let pipeline = AnalysisPipeline::new(config).map_err(report_failure)?;
            let result = pipeline.analyze(&raster).map_err(report_failure)?;

            let json = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            println!("{}", json);
        }
        Commands::Calibrate { image } => {
            let raster = load_rgb(&image)?;
            config.validate().map_err(report_failure)?;
            let calibrator = GridCalibrator::new(config.grid_size_mm);
            let result = calibrator.calibrate(&raster).map_err(report_failure)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::DefaultConfig => {
            let toml = toml_edit::ser::to_string_pretty(&ProcessingConfig::default())
                .context("Failed to serialize default configuration")?;
            print!("{}", toml);
        }
    }

    Ok(())
}

fn load_rgb(path: &Path) -> Result<RgbImage> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?;
    Ok(image.to_rgb8())
}

/// Surface a domain failure with its code and remediation hints.
fn report_failure(err: AnalysisError) -> anyhow::Error {
    for &suggestion in err.suggestions() {
        tracing::warn!(suggestion, "remediation hint");
    }
    let code = err.code();
    anyhow::Error::new(err).context(format!("analysis failed ({})", code))
}
