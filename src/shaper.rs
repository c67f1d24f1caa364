//! The pulse-shaper synthesizer.
//!
//! [`AomShaper`] owns everything the waveform depends on: the calibration,
//! the per-pixel correction mask, the installed amplitude/phase masks, the
//! dispersion compensation and the frame layout flags. It is a plain value
//! without interior mutability; every setter validates its input first and
//! only then replaces the old state, so a failed call leaves the shaper as it
//! was.
//!
//! # Example
//!
//! ```
//! use aom_shaper::masks::DoublePulseParams;
//! use aom_shaper::shaper::AomShaper;
//!
//! # fn main() -> Result<(), aom_shaper::error::ShaperError> {
//! let mut shaper = AomShaper::default();
//! shaper.set_calib([23.334e-9, -1.943e-3, 67.4])?;
//!
//! let masks = shaper.double_pulse(&DoublePulseParams::new(1.0, 0.1, 1600.0))?;
//! shaper.set_masks(masks)?;
//! let waveform = shaper.generate_waveform()?;
//! assert_eq!(waveform.num_pixels(), 4096 * 3);
//! # Ok(())
//! # }
//! ```

use crate::calibration::{Calibration, CorrectionMask};
use crate::config::ShaperConfig;
use crate::error::{ShaperError, ShaperResult};
use crate::masks::{
    calibration_pattern, delay_scan, dispersion_phase, double_pulse, full_carrier, CalibPattern,
    Dispersion, DoublePulseParams, Mask, MaskPair,
};
use crate::waveform::{bragg_wf, classic_wf, encode, Encoding, RfSettings, Waveform};
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Samples per frame on the shaper (three 4096-sample DAC blocks).
pub const PIXEL: usize = 4096 * 3;

/// Serializable summary of the shaper state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShaperState {
    /// Calibration coefficients, if set
    pub calib: Option<[f64; 3]>,
    /// Calibrated span in THz, if set
    pub frequency_range_thz: Option<(f64, f64)>,
    /// Calibrated span in cm⁻¹, if set
    pub wavenumber_range_cm: Option<(f64, f64)>,
    /// Pixels per frame
    pub pixels: usize,
    /// RF parameters
    pub rf: RfSettings,
    /// Encoding law
    pub mode: Encoding,
    /// Dark frame before each frame
    pub chopped: bool,
    /// Negated copy after the frames
    pub phase_cycle: bool,
    /// Dispersion compensation enabled
    pub do_dispersion_compensation: bool,
    /// Dispersion parameters
    pub dispersion: Dispersion,
}

/// Owned synthesizer state and the operations on it.
#[derive(Debug, Clone)]
pub struct AomShaper {
    num_pixels: usize,
    rf: RfSettings,
    calib: Option<Calibration>,
    correction: CorrectionMask,
    masks: MaskPair,
    dispersion: Dispersion,
    mode: Encoding,
    chopped: bool,
    phase_cycle: bool,
    do_dispersion_compensation: bool,
}

impl Default for AomShaper {
    fn default() -> Self {
        Self::new(PIXEL)
    }
}

impl AomShaper {
    /// Uncalibrated shaper with default RF settings and flat masks.
    pub fn new(num_pixels: usize) -> Self {
        Self {
            num_pixels,
            rf: RfSettings::default(),
            calib: None,
            correction: CorrectionMask::ones(num_pixels),
            masks: MaskPair::flat(),
            dispersion: Dispersion::default(),
            mode: Encoding::Bragg,
            chopped: true,
            phase_cycle: true,
            do_dispersion_compensation: true,
        }
    }

    /// Build a shaper from configuration, applying the calibration and the
    /// correction file when present.
    pub fn from_config(config: &ShaperConfig) -> ShaperResult<Self> {
        let settings = &config.shaper;
        let mut shaper = Self::new(settings.pixels);
        shaper.set_rf(settings.rf())?;
        shaper.mode = settings.mode;
        shaper.chopped = settings.chopped;
        shaper.phase_cycle = settings.phase_cycle;
        shaper.do_dispersion_compensation = settings.do_dispersion_compensation;
        shaper.dispersion = config.dispersion;

        if let Some(coefficients) = settings.calibration {
            shaper.set_calib(coefficients)?;
        }
        if let Some(path) = &settings.calib_mask {
            shaper.load_calib_mask(path)?;
        }
        Ok(shaper)
    }

    /// Pixels per frame.
    pub fn num_pixels(&self) -> usize {
        self.num_pixels
    }

    /// RF parameters.
    pub fn rf(&self) -> &RfSettings {
        &self.rf
    }

    /// Replace the RF parameters.
    pub fn set_rf(&mut self, rf: RfSettings) -> ShaperResult<()> {
        rf.validate()?;
        self.rf = rf;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Calibration
    // -------------------------------------------------------------------------

    /// Install a new calibration polynomial `(p1, p2, p3)`.
    ///
    /// # Errors
    /// `InvalidCalibration` if the polynomial is unusable. The previous
    /// calibration stays active in that case.
    pub fn set_calib(&mut self, coefficients: [f64; 3]) -> ShaperResult<()> {
        let calib = Calibration::new(coefficients, self.num_pixels)?;
        let (lo, hi) = calib.frequency_range();
        info!(
            p1 = coefficients[0],
            p2 = coefficients[1],
            p3 = coefficients[2],
            lo_thz = lo,
            hi_thz = hi,
            "Calibration changed"
        );
        self.calib = Some(calib);
        Ok(())
    }

    /// Current calibration, if any.
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calib.as_ref()
    }

    /// Current calibration or `NoCalibration`.
    pub fn require_calib(&self) -> ShaperResult<&Calibration> {
        self.calib.as_ref().ok_or(ShaperError::NoCalibration)
    }

    /// Frequency grid in THz, if calibrated.
    pub fn nu(&self) -> Option<&Array1<f64>> {
        self.calib.as_ref().map(Calibration::nu)
    }

    /// Replace the per-pixel correction with the contents of `path`.
    ///
    /// # Errors
    /// `CalibMaskLoad` on any read or validation failure; the previous
    /// correction stays active.
    pub fn load_calib_mask(&mut self, path: impl AsRef<Path>) -> ShaperResult<()> {
        self.correction = CorrectionMask::load(path, self.num_pixels)?;
        Ok(())
    }

    /// Restore the flat (all ones) correction.
    pub fn reset_calib_mask(&mut self) {
        self.correction = CorrectionMask::ones(self.num_pixels);
    }

    /// Per-pixel correction factors.
    pub fn calib_mask(&self) -> &CorrectionMask {
        &self.correction
    }

    // -------------------------------------------------------------------------
    // Masks
    // -------------------------------------------------------------------------

    /// Masks for a phase-cycled double-pulse sequence.
    ///
    /// Pure: the result is returned, not installed. See [`Self::set_masks`].
    pub fn double_pulse(&self, params: &DoublePulseParams) -> ShaperResult<MaskPair> {
        double_pulse(self.require_calib()?, &self.correction, params)
    }

    /// Masks for a delay scan with optional per-pixel phase offset.
    pub fn delay_scan(
        &self,
        taus_ps: &[f64],
        phi: Option<&Array1<f64>>,
    ) -> ShaperResult<MaskPair> {
        delay_scan(self.require_calib()?, taus_ps, phi)
    }

    /// Install the masks used by [`Self::generate_waveform`].
    ///
    /// # Errors
    /// `ShapeMismatch` if a mask does not have one row per pixel or the two
    /// masks disagree on their frame count.
    pub fn set_masks(&mut self, masks: MaskPair) -> ShaperResult<()> {
        let frames = masks.frames(self.num_pixels)?;
        debug!(frames, "Installing masks");
        self.masks = masks;
        Ok(())
    }

    /// Installed masks.
    pub fn masks(&self) -> &MaskPair {
        &self.masks
    }

    // -------------------------------------------------------------------------
    // Dispersion and flags
    // -------------------------------------------------------------------------

    /// Set the dispersion to compensate and switch compensation on.
    pub fn set_dispersion(&mut self, dispersion: Dispersion) {
        info!(
            nu0_thz = self.rf.nu0_thz,
            delay = dispersion.delay,
            gvd = dispersion.gvd,
            tod = dispersion.tod,
            fod = dispersion.fod,
            "Updating dispersion compensation"
        );
        self.dispersion = dispersion;
        self.do_dispersion_compensation = true;
    }

    /// Dispersion parameters.
    pub fn dispersion(&self) -> &Dispersion {
        &self.dispersion
    }

    /// Enable or disable dispersion compensation.
    pub fn set_dispersion_compensation(&mut self, enabled: bool) {
        self.do_dispersion_compensation = enabled;
    }

    /// Compensation phase added to the installed phase mask, if any applies.
    pub fn compensation_phase(&self) -> ShaperResult<Option<Array1<f64>>> {
        if !self.do_dispersion_compensation || self.dispersion.is_zero() {
            return Ok(None);
        }
        let nu = self.require_calib()?.nu();
        Ok(Some(dispersion_phase(nu, self.rf.nu0_thz, &self.dispersion)))
    }

    /// Select the encoding law.
    pub fn set_mode(&mut self, mode: Encoding) {
        self.mode = mode;
    }

    /// Encoding law.
    pub fn mode(&self) -> Encoding {
        self.mode
    }

    /// Enable or disable the dark frame before each frame.
    pub fn set_chopped(&mut self, chopped: bool) {
        self.chopped = chopped;
    }

    /// Enable or disable the negated frame copy.
    pub fn set_phase_cycle(&mut self, phase_cycle: bool) {
        self.phase_cycle = phase_cycle;
    }

    // -------------------------------------------------------------------------
    // Encoding
    // -------------------------------------------------------------------------

    /// Bragg-encoded waveform of arbitrary masks.
    pub fn bragg_wf(
        &self,
        amplitude: impl Into<Mask>,
        phase: impl Into<Mask>,
    ) -> ShaperResult<Waveform> {
        bragg_wf(
            self.require_calib()?,
            &self.rf,
            &amplitude.into(),
            &phase.into(),
        )
    }

    /// Classic-encoded waveform of arbitrary masks.
    pub fn classic_wf(
        &self,
        amplitude: impl Into<Mask>,
        phase: impl Into<Mask>,
    ) -> ShaperResult<Waveform> {
        classic_wf(self.num_pixels, &self.rf, &amplitude.into(), &phase.into())
    }

    /// Installed phase mask plus the compensation phase.
    pub fn total_phase(&self) -> ShaperResult<Mask> {
        let Some(extra) = self.compensation_phase()? else {
            return Ok(self.masks.phase.clone());
        };
        let frames = self.masks.phase.frames().unwrap_or(1);
        let phase = &self.masks.phase;
        Ok(Mask::Array(Array2::from_shape_fn(
            (self.num_pixels, frames),
            |(i, k)| phase.value(i, k) + extra[i],
        )))
    }

    /// Waveform for the current state.
    ///
    /// Encodes the installed masks (with compensation phase) using the selected
    /// law, then applies chopping and phase cycling. The result depends only on
    /// the state, so repeated calls return identical waveforms.
    pub fn generate_waveform(&self) -> ShaperResult<Waveform> {
        let masks = MaskPair {
            amplitude: self.masks.amplitude.clone(),
            phase: self.total_phase()?,
        };
        let waveform = encode(
            self.mode,
            self.calib.as_ref(),
            self.num_pixels,
            &self.rf,
            &masks,
        )?;
        let waveform = waveform.assemble(self.chopped, self.phase_cycle);
        debug!(
            mode = %self.mode,
            frames = waveform.num_frames(),
            "Waveform generated"
        );
        Ok(waveform)
    }

    /// Spectrometer calibration frames (pulse train, single line, carrier).
    pub fn calibration_pattern(&self, pattern: &CalibPattern) -> ShaperResult<Waveform> {
        let frames = calibration_pattern(self.num_pixels, self.rf.carrier_period(), pattern)?;
        Ok(Waveform::new(frames))
    }

    /// The bare carrier as a single frame.
    pub fn full_carrier(&self) -> Waveform {
        let carrier = full_carrier(self.num_pixels, self.rf.carrier_period());
        Waveform::new(carrier.insert_axis(Axis(1)))
    }

    /// Snapshot of the settings for display or logging.
    pub fn state(&self) -> ShaperState {
        ShaperState {
            calib: self.calib.as_ref().map(Calibration::coefficients),
            frequency_range_thz: self.calib.as_ref().map(Calibration::frequency_range),
            wavenumber_range_cm: self.calib.as_ref().map(Calibration::wavenumber_range),
            pixels: self.num_pixels,
            rf: self.rf,
            mode: self.mode,
            chopped: self.chopped,
            phase_cycle: self.phase_cycle,
            do_dispersion_compensation: self.do_dispersion_compensation,
            dispersion: self.dispersion,
        }
    }
}
