//! Custom error types for the shaper.
//!
//! This module defines the primary error type, `ShaperError`, for the whole crate.
//! Using the `thiserror` crate, it provides one consistent way to report the
//! failures that can occur while calibrating the shaper, building masks and
//! encoding waveforms.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidCalibration`**: the calibration polynomial is unusable (non-finite
//!   coefficients, not monotonic over the pixel range, or non-positive frequencies).
//! - **`CalibMaskLoad`**: the per-pixel correction file could not be read, parsed,
//!   or has the wrong length.
//! - **`OutOfCalibrationRange`**: a requested frequency lies outside the calibrated span.
//! - **`InvalidParameter`**: malformed pulse parameters or amplitude set points.
//! - **`NoCalibration`**: an operation needs a calibration but none has been set.
//! - **`ShapeMismatch`**: a mask does not fit the pixel grid or the other mask.
//! - **`Config`**: wraps errors from `figment` while extracting the configuration.
//!
//! Every failure is local and synchronous. A failing setter never leaves the
//! shaper half-updated.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the shaper error type.
pub type ShaperResult<T> = std::result::Result<T, ShaperError>;

/// Errors raised by the calibration model, mask generator and waveform encoder.
#[derive(Error, Debug)]
pub enum ShaperError {
    /// The calibration polynomial cannot be used.
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    /// The per-pixel correction file could not be loaded.
    #[error("Failed to load calibration mask '{}': {reason}", path.display())]
    CalibMaskLoad {
        /// File that was being loaded
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A frequency outside the calibrated span was requested.
    #[error("{value_thz:.3} THz is outside the calibrated range [{min_thz:.3}, {max_thz:.3}] THz")]
    OutOfCalibrationRange {
        /// Requested frequency in THz
        value_thz: f64,
        /// Lower edge of the calibrated span in THz
        min_thz: f64,
        /// Upper edge of the calibrated span in THz
        max_thz: f64,
    },

    /// A pulse or output parameter is malformed.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The operation requires a spectral calibration.
    #[error("Spectral calibration is required for this operation")]
    NoCalibration,

    /// Mask dimensions do not fit the pixel grid or each other.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Configuration could not be extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl ShaperError {
    pub(crate) fn calib_mask(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CalibMaskLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<figment::Error> for ShaperError {
    fn from(value: figment::Error) -> Self {
        Self::Config(Box::new(value))
    }
}
