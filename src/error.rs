use serde_json::{json, Value};
use thiserror::Error;

/// Domain errors produced by the analysis core.
///
/// Calibration and no-seeds failures are expected, user-correctable outcomes
/// on a deterministic computation; there is no point retrying them on the
/// same input. `InvalidConfig` is a contract violation by the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("could not detect grid pattern in image")]
    GridNotDetected { lines_detected: usize },

    #[error("insufficient grid lines detected ({horizontal} horizontal, {vertical} vertical)")]
    InsufficientGridLines { horizontal: usize, vertical: usize },

    #[error("could not determine consistent grid spacing")]
    InconsistentGridSpacing {
        h_spacing: Option<f64>,
        v_spacing: Option<f64>,
    },

    #[error("no seeds detected in the image")]
    NoSeedsDetected,

    #[error("cluster splitting exceeded the maximum depth of {max_depth}")]
    SplitLimitExceeded { max_depth: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AnalysisError {
    /// Machine-readable error code for the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::GridNotDetected { .. }
            | AnalysisError::InsufficientGridLines { .. }
            | AnalysisError::InconsistentGridSpacing { .. } => "CALIBRATION_FAILED",
            AnalysisError::NoSeedsDetected => "NO_SEEDS_DETECTED",
            AnalysisError::SplitLimitExceeded { .. } => "SPLIT_LIMIT_EXCEEDED",
            AnalysisError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }

    /// Structured diagnostic details (line counts and the like).
    pub fn details(&self) -> Value {
        match self {
            AnalysisError::GridNotDetected { lines_detected } => {
                json!({ "lines_detected": lines_detected })
            }
            AnalysisError::InsufficientGridLines {
                horizontal,
                vertical,
            } => json!({
                "horizontal_lines": horizontal,
                "vertical_lines": vertical,
            }),
            AnalysisError::InconsistentGridSpacing {
                h_spacing,
                v_spacing,
            } => json!({
                "h_spacing": h_spacing,
                "v_spacing": v_spacing,
            }),
            AnalysisError::SplitLimitExceeded { max_depth } => {
                json!({ "max_depth": max_depth })
            }
            _ => json!({}),
        }
    }

    /// Actionable remediation suggestions for user-correctable failures.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            AnalysisError::GridNotDetected { .. }
            | AnalysisError::InsufficientGridLines { .. }
            | AnalysisError::InconsistentGridSpacing { .. } => &[
                "Ensure the entire grid is visible in the image",
                "Check that lighting is even across the image",
                "Verify the grid paper is flat, not wrinkled",
            ],
            AnalysisError::NoSeedsDetected => &[
                "Ensure seeds are visible and have good contrast with the background",
                "Check that seeds are not too small or too large for the detection range",
            ],
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_errors_share_a_code_and_carry_details() {
        let err = AnalysisError::GridNotDetected { lines_detected: 3 };
        assert_eq!(err.code(), "CALIBRATION_FAILED");
        assert_eq!(err.details()["lines_detected"], 3);
        assert_eq!(err.suggestions().len(), 3);

        let err = AnalysisError::InsufficientGridLines {
            horizontal: 2,
            vertical: 7,
        };
        assert_eq!(err.code(), "CALIBRATION_FAILED");
        assert_eq!(err.details()["horizontal_lines"], 2);
        assert_eq!(err.details()["vertical_lines"], 7);
    }

    #[test]
    fn inconsistent_spacing_reports_per_axis_estimates() {
        let err = AnalysisError::InconsistentGridSpacing {
            h_spacing: Some(24.5),
            v_spacing: None,
        };
        assert_eq!(err.code(), "CALIBRATION_FAILED");
        assert_eq!(err.details()["h_spacing"], 24.5);
        assert_eq!(err.details()["v_spacing"], Value::Null);
        assert_eq!(err.suggestions().len(), 3);
    }

    #[test]
    fn no_seeds_has_guidance_but_no_details() {
        let err = AnalysisError::NoSeedsDetected;
        assert_eq!(err.code(), "NO_SEEDS_DETECTED");
        assert_eq!(err.details(), json!({}));
        assert!(!err.suggestions().is_empty());
    }
}
