//! Spectral calibration of the shaper.
//!
//! A [`Calibration`] maps a pixel index (DAC sample within one frame) to the
//! optical frequency that the AOM diffracts at that position:
//!
//! ```text
//! nu(pixel) = p1 * pixel^2 + p2 * pixel + p3      [THz]
//! ```
//!
//! The polynomial must be strictly monotonic over the pixel range so that the
//! inverse map is well defined. The frequency grid `nu` is computed once when
//! the calibration is built and never mutated afterwards.
//!
//! [`CorrectionMask`] holds the per-pixel correction factors read from a
//! calibration mask file.

use crate::error::{ShaperError, ShaperResult};
use crate::units::{cm_to_thz, nm_to_thz, thz_to_cm, thz_to_nm};
use ndarray::Array1;
use std::path::Path;
use tracing::{debug, info};

/// Quadratic pixel-to-frequency calibration with its precomputed grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    coefficients: [f64; 3],
    nu: Array1<f64>,
}

impl Calibration {
    /// Build and validate a calibration over `num_pixels` pixels.
    ///
    /// # Errors
    /// `InvalidCalibration` if a coefficient is not finite, the polynomial is
    /// not strictly monotonic on `[0, num_pixels - 1]`, or it reaches a
    /// non-positive frequency inside that range.
    pub fn new(coefficients: [f64; 3], num_pixels: usize) -> ShaperResult<Self> {
        if num_pixels < 2 {
            return Err(ShaperError::InvalidCalibration(format!(
                "need at least two pixels, got {num_pixels}"
            )));
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ShaperError::InvalidCalibration(format!(
                "coefficients must be finite: {coefficients:?}"
            )));
        }

        let [p1, p2, _] = coefficients;
        let last = (num_pixels - 1) as f64;
        // The derivative is linear, so checking both ends covers the range.
        let slope_start = p2;
        let slope_end = 2.0 * p1 * last + p2;
        let monotonic =
            (slope_start > 0.0 && slope_end > 0.0) || (slope_start < 0.0 && slope_end < 0.0);
        if !monotonic {
            return Err(ShaperError::InvalidCalibration(format!(
                "polynomial {coefficients:?} is not monotonic over pixels 0..{num_pixels}"
            )));
        }

        let first_nu = eval(coefficients, 0.0);
        let last_nu = eval(coefficients, last);
        if first_nu <= 0.0 || last_nu <= 0.0 {
            return Err(ShaperError::InvalidCalibration(format!(
                "frequencies must be positive, got {first_nu} THz .. {last_nu} THz"
            )));
        }

        let nu = Array1::from_shape_fn(num_pixels, |i| eval(coefficients, i as f64));
        debug!(num_pixels, first_nu, last_nu, "Calibration grid computed");

        Ok(Self { coefficients, nu })
    }

    /// Polynomial coefficients `(p1, p2, p3)`.
    pub fn coefficients(&self) -> [f64; 3] {
        self.coefficients
    }

    /// Number of calibrated pixels.
    pub fn num_pixels(&self) -> usize {
        self.nu.len()
    }

    /// Frequency of every pixel in THz.
    pub fn nu(&self) -> &Array1<f64> {
        &self.nu
    }

    /// Calibrated frequency span `(min, max)` in THz.
    pub fn frequency_range(&self) -> (f64, f64) {
        let first = self.nu[0];
        let last = self.nu[self.nu.len() - 1];
        (first.min(last), first.max(last))
    }

    /// Calibrated span `(min, max)` in cm⁻¹.
    pub fn wavenumber_range(&self) -> (f64, f64) {
        let (lo, hi) = self.frequency_range();
        (thz_to_cm(lo), thz_to_cm(hi))
    }

    /// Calibrated span `(min, max)` in nm.
    pub fn wavelength_range(&self) -> (f64, f64) {
        let (lo, hi) = self.frequency_range();
        (thz_to_nm(hi), thz_to_nm(lo))
    }

    /// Fail with `OutOfCalibrationRange` unless `nu_thz` lies in the span.
    ///
    /// The edges carry a relative tolerance of 1e-9 of the span so that values
    /// converted through wavelength or wavenumber still reach the end pixels.
    pub fn check_frequency(&self, nu_thz: f64) -> ShaperResult<()> {
        let (min_thz, max_thz) = self.frequency_range();
        let tol = 1e-9 * (max_thz - min_thz);
        if nu_thz.is_finite() && (min_thz - tol..=max_thz + tol).contains(&nu_thz) {
            Ok(())
        } else {
            Err(ShaperError::OutOfCalibrationRange {
                value_thz: nu_thz,
                min_thz,
                max_thz,
            })
        }
    }

    /// Frequency in THz at a (possibly fractional) pixel position.
    pub fn pixel_to_frequency(&self, pixel: f64) -> f64 {
        eval(self.coefficients, pixel)
    }

    /// Pixel position of a frequency in THz.
    ///
    /// Solves the calibration quadratic and returns the root that lies in the
    /// pixel range.
    pub fn frequency_to_pixel(&self, nu_thz: f64) -> ShaperResult<f64> {
        self.check_frequency(nu_thz)?;

        let [p1, p2, p3] = self.coefficients;
        let c = p3 - nu_thz;
        if p1 == 0.0 {
            return Ok(-c / p2);
        }

        let disc = (p2 * p2 - 4.0 * p1 * c).max(0.0);
        let q = -0.5 * (p2 + p2.signum() * disc.sqrt());
        let far = q / p1;
        let near = if q == 0.0 { far } else { c / q };

        let last = (self.num_pixels() - 1) as f64;
        let distance = |x: f64| {
            if x < 0.0 {
                -x
            } else if x > last {
                x - last
            } else {
                0.0
            }
        };
        Ok(if distance(near) <= distance(far) {
            near
        } else {
            far
        })
    }

    /// Vacuum wavelength in nm at a pixel position.
    pub fn pixel_to_wavelength(&self, pixel: f64) -> f64 {
        thz_to_nm(self.pixel_to_frequency(pixel))
    }

    /// Pixel position of a vacuum wavelength in nm.
    pub fn wavelength_to_pixel(&self, wavelength_nm: f64) -> ShaperResult<f64> {
        self.frequency_to_pixel(nm_to_thz(wavelength_nm))
    }

    /// Wavenumber in cm⁻¹ at a pixel position.
    pub fn pixel_to_wavenumber(&self, pixel: f64) -> f64 {
        thz_to_cm(self.pixel_to_frequency(pixel))
    }

    /// Pixel position of a wavenumber in cm⁻¹.
    pub fn wavenumber_to_pixel(&self, wavenumber: f64) -> ShaperResult<f64> {
        self.frequency_to_pixel(cm_to_thz(wavenumber))
    }

    /// Antiderivative of the calibration polynomial with zero constant term.
    ///
    /// This is the accumulated optical frequency along the pixel axis and
    /// sets the carrier phase of the Bragg waveform.
    pub fn antiderivative(&self, pixel: f64) -> f64 {
        let [p1, p2, p3] = self.coefficients;
        ((p1 / 3.0 * pixel + p2 / 2.0) * pixel + p3) * pixel
    }
}

fn eval(coefficients: [f64; 3], x: f64) -> f64 {
    let [p1, p2, p3] = coefficients;
    (p1 * x + p2) * x + p3
}

/// Per-pixel correction factors for the amplitude mask.
///
/// The default is all ones. A mask file replaces the factors wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionMask {
    values: Array1<f64>,
}

impl CorrectionMask {
    /// Flat correction (all ones).
    pub fn ones(num_pixels: usize) -> Self {
        Self {
            values: Array1::ones(num_pixels),
        }
    }

    /// Wrap correction factors, rejecting negative or non-finite values.
    pub fn from_values(values: Array1<f64>) -> ShaperResult<Self> {
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(ShaperError::InvalidParameter(format!(
                "correction factors must be finite and non-negative, found {bad}"
            )));
        }
        Ok(Self { values })
    }

    /// Load a correction file holding one value per pixel.
    ///
    /// The file is read as headerless CSV: values are separated by commas
    /// and newlines, rows may have any length, and lines starting with `#`
    /// are comments.
    ///
    /// # Errors
    /// `CalibMaskLoad` if the file is missing, a value does not parse, a value
    /// is negative or not finite, or the count differs from `num_pixels`.
    pub fn load(path: impl AsRef<Path>, num_pixels: usize) -> ShaperResult<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| ShaperError::calib_mask(path, e.to_string()))?;

        let mut values = Vec::with_capacity(num_pixels);
        for record in reader.records() {
            let record = record.map_err(|e| ShaperError::calib_mask(path, e.to_string()))?;
            let line = record.position().map_or(0, csv::Position::line);
            for field in record.iter().filter(|f| !f.is_empty()) {
                let value: f64 = field.parse().map_err(|_| {
                    ShaperError::calib_mask(
                        path,
                        format!("line {line}: '{field}' is not a number"),
                    )
                })?;
                if !value.is_finite() || value < 0.0 {
                    return Err(ShaperError::calib_mask(
                        path,
                        format!(
                            "line {line}: correction factor {value} must be finite and non-negative"
                        ),
                    ));
                }
                values.push(value);
            }
        }

        if values.len() != num_pixels {
            return Err(ShaperError::calib_mask(
                path,
                format!("expected {num_pixels} values, found {}", values.len()),
            ));
        }

        info!(path = %path.display(), num_pixels, "Loaded calibration mask");
        Ok(Self {
            values: Array1::from(values),
        })
    }

    /// Correction factor per pixel.
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Number of pixels covered.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the mask covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
