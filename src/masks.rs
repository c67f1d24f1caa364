//! Spectral masks for the shaper.
//!
//! A mask assigns a value to every (pixel, frame) position. Amplitude masks
//! scale the diffraction efficiency, phase masks shift the carrier. Both are
//! either a full `(num_pixels, num_frames)` array or a constant that
//! broadcasts to any shape, so a flat request such as `(1, 1)` is expressed
//! as `Mask::Constant` instead of relying on implicit scalar promotion.
//!
//! The generators in this module are pure functions of the calibration and
//! their parameters:
//!
//! - [`double_pulse`] - phase-cycled double pulses over a list of delays
//! - [`delay_scan`] - single pulses shifted by a list of delays
//! - [`dispersion_phase`] - spectral phase of a delay/GVD/TOD/FOD expansion
//! - [`calibration_pattern`] - pulse train / single line / full carrier frames

use crate::calibration::{Calibration, CorrectionMask};
use crate::error::{ShaperError, ShaperResult};
use crate::units::cm_to_thz;
use ndarray::{Array1, Array2, Axis};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use tracing::debug;

/// Amplitude or phase mask, either per (pixel, frame) or constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Mask {
    /// Values shaped `(num_pixels, num_frames)`.
    Array(Array2<f64>),
    /// The same value everywhere.
    Constant(f64),
}

impl Mask {
    /// Number of frames, or `None` for a constant.
    pub fn frames(&self) -> Option<usize> {
        match self {
            Self::Array(a) => Some(a.ncols()),
            Self::Constant(_) => None,
        }
    }

    /// Value at `(pixel, frame)`.
    ///
    /// Single-column arrays broadcast along the frame axis. Indices must lie
    /// inside the shape negotiated by [`frame_count`].
    pub fn value(&self, pixel: usize, frame: usize) -> f64 {
        match self {
            Self::Array(a) if a.ncols() == 1 => a[[pixel, 0]],
            Self::Array(a) => a[[pixel, frame]],
            Self::Constant(v) => *v,
        }
    }

    /// Materialize the mask as a `(num_pixels, num_frames)` array.
    pub fn to_array(&self, num_pixels: usize, num_frames: usize) -> Array2<f64> {
        Array2::from_shape_fn((num_pixels, num_frames), |(i, k)| self.value(i, k))
    }

    /// True when every entry is zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Array(a) => a.iter().all(|v| *v == 0.0),
            Self::Constant(v) => *v == 0.0,
        }
    }

    fn check_rows(&self, num_pixels: usize, name: &str) -> ShaperResult<()> {
        match self {
            Self::Array(a) if a.nrows() != num_pixels => Err(ShaperError::ShapeMismatch(format!(
                "{name} mask has {} rows, expected {num_pixels} pixels",
                a.nrows()
            ))),
            Self::Array(a) if a.ncols() == 0 => Err(ShaperError::ShapeMismatch(format!(
                "{name} mask has no frames"
            ))),
            _ => Ok(()),
        }
    }
}

impl From<f64> for Mask {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl From<Array2<f64>> for Mask {
    fn from(value: Array2<f64>) -> Self {
        Self::Array(value)
    }
}

impl From<Array1<f64>> for Mask {
    /// A per-pixel vector becomes a single-frame mask.
    fn from(value: Array1<f64>) -> Self {
        Self::Array(value.insert_axis(Axis(1)))
    }
}

/// Number of frames produced by combining two masks over `num_pixels` pixels.
///
/// Arrays must have `num_pixels` rows. Two arrays must agree on their frame
/// count unless one of them has a single frame. Two constants give one frame.
pub fn frame_count(amplitude: &Mask, phase: &Mask, num_pixels: usize) -> ShaperResult<usize> {
    amplitude.check_rows(num_pixels, "amplitude")?;
    phase.check_rows(num_pixels, "phase")?;

    match (amplitude.frames(), phase.frames()) {
        (None, None) => Ok(1),
        (Some(n), None) | (None, Some(n)) => Ok(n),
        (Some(a), Some(p)) if a == p || p == 1 => Ok(a),
        (Some(1), Some(p)) => Ok(p),
        (Some(a), Some(p)) => Err(ShaperError::ShapeMismatch(format!(
            "amplitude mask has {a} frames but phase mask has {p}"
        ))),
    }
}

/// Amplitude and phase masks that are encoded together.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskPair {
    /// Relative amplitude per pixel and frame.
    pub amplitude: Mask,
    /// Phase in radians per pixel and frame.
    pub phase: Mask,
}

impl MaskPair {
    /// Build a pair from anything convertible to masks.
    pub fn new(amplitude: impl Into<Mask>, phase: impl Into<Mask>) -> Self {
        Self {
            amplitude: amplitude.into(),
            phase: phase.into(),
        }
    }

    /// Unit amplitude, zero phase.
    pub fn flat() -> Self {
        Self::new(1.0, 0.0)
    }

    /// Frame count of the pair, see [`frame_count`].
    pub fn frames(&self, num_pixels: usize) -> ShaperResult<usize> {
        frame_count(&self.amplitude, &self.phase, num_pixels)
    }
}

impl Default for MaskPair {
    fn default() -> Self {
        Self::flat()
    }
}

/// Phase-cycling depth of a double-pulse sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PhaseFrames {
    /// No phase cycling.
    One,
    /// Two-step cycling.
    Two,
    /// Full four-step cycling.
    #[default]
    Four,
}

impl PhaseFrames {
    /// Number of frames per delay.
    pub fn count(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
        }
    }
}

impl TryFrom<usize> for PhaseFrames {
    type Error = ShaperError;

    fn try_from(value: usize) -> ShaperResult<Self> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            other => Err(ShaperError::InvalidParameter(format!(
                "phase frames must be 1, 2 or 4, got {other}"
            ))),
        }
    }
}

/// (phase of scanned pulse, phase of fixed pulse) for each cycling step.
const PHASE_CYCLE: [(f64, f64); 4] = [(PI, PI), (PI, 0.0), (0.0, 0.0), (0.0, PI)];

/// Largest number of delays accepted in one double-pulse sequence.
///
/// With four phase frames on 12288 pixels this is already 4096 frames.
pub const MAX_DELAYS: usize = 1024;

/// Parameters of a double-pulse delay sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoublePulseParams {
    /// Largest inter-pulse delay in ps.
    pub max_delay_ps: f64,
    /// Delay increment in ps.
    pub step_ps: f64,
    /// Rotating-frame frequency in cm⁻¹. Must lie in the calibrated span.
    pub rot_frame_cm: f64,
    /// Phase-cycling frames per delay.
    pub phase_frames: PhaseFrames,
}

impl DoublePulseParams {
    /// Four-frame phase cycled sequence from 0 to `max_delay_ps`.
    pub fn new(max_delay_ps: f64, step_ps: f64, rot_frame_cm: f64) -> Self {
        Self {
            max_delay_ps,
            step_ps,
            rot_frame_cm,
            phase_frames: PhaseFrames::default(),
        }
    }

    /// Set the phase-cycling depth.
    pub fn with_phase_frames(mut self, phase_frames: PhaseFrames) -> Self {
        self.phase_frames = phase_frames;
        self
    }

    /// Check that delays and frequency are usable.
    pub fn validate(&self) -> ShaperResult<()> {
        if !(self.max_delay_ps.is_finite() && self.max_delay_ps > 0.0) {
            return Err(ShaperError::InvalidParameter(format!(
                "max delay must be positive, got {} ps",
                self.max_delay_ps
            )));
        }
        if !(self.step_ps.is_finite() && self.step_ps > 0.0) {
            return Err(ShaperError::InvalidParameter(format!(
                "delay step must be positive, got {} ps",
                self.step_ps
            )));
        }
        let ratio = self.max_delay_ps / self.step_ps;
        if !ratio.is_finite() || ratio >= MAX_DELAYS as f64 {
            return Err(ShaperError::InvalidParameter(format!(
                "{} ps in steps of {} ps exceeds {MAX_DELAYS} delays",
                self.max_delay_ps, self.step_ps
            )));
        }
        if !self.rot_frame_cm.is_finite() {
            return Err(ShaperError::InvalidParameter(format!(
                "rotating frame must be finite, got {}",
                self.rot_frame_cm
            )));
        }
        Ok(())
    }

    /// Delays `0, step, 2*step, ...` up to and including `max_delay_ps`.
    ///
    /// Never more than [`MAX_DELAYS`]; unvalidated parameters with a NaN or
    /// negative ratio give the zero delay only.
    pub fn delays(&self) -> Vec<f64> {
        let ratio = (self.max_delay_ps / self.step_ps + 1e-9).floor();
        let n = if ratio >= 0.0 {
            (ratio.min((MAX_DELAYS - 1) as f64) as usize).saturating_add(1)
        } else {
            1
        };
        (0..n).map(|k| k as f64 * self.step_ps).collect()
    }

    /// Frames produced by [`double_pulse`]: delays times phase frames.
    pub fn num_samples(&self) -> usize {
        self.delays().len() * self.phase_frames.count()
    }
}

/// Masks for a phase-cycled series of double pulses.
///
/// Frame `k` holds delay `k / phase_frames` with cycling step
/// `k % phase_frames`. Per pixel the complex transmission is
///
/// ```text
/// 0.5 * (exp(-i (nu - nu_rf) 2 pi tau) exp(i phi1) + exp(i phi2))
/// ```
///
/// whose modulus (scaled by the correction mask) and argument are returned as
/// amplitude and phase masks.
pub fn double_pulse(
    calib: &Calibration,
    correction: &CorrectionMask,
    params: &DoublePulseParams,
) -> ShaperResult<MaskPair> {
    params.validate()?;
    let nu_rf = cm_to_thz(params.rot_frame_cm);
    calib.check_frequency(nu_rf)?;

    let nu = calib.nu();
    if correction.len() != nu.len() {
        return Err(ShaperError::ShapeMismatch(format!(
            "correction mask covers {} pixels, calibration {}",
            correction.len(),
            nu.len()
        )));
    }

    let taus = params.delays();
    let frames = params.phase_frames.count();
    let shape = (nu.len(), taus.len() * frames);

    let field = Array2::from_shape_fn(shape, |(i, k)| {
        let tau = taus[k / frames];
        let (phi1, phi2) = PHASE_CYCLE[k % frames];
        let scanned = Complex64::from_polar(1.0, -(nu[i] - nu_rf) * TAU * tau + phi1);
        let fixed = Complex64::from_polar(1.0, phi2);
        0.5 * (scanned + fixed)
    });

    let correction = correction.values();
    let amplitude = Array2::from_shape_fn(shape, |(i, k)| field[[i, k]].norm() * correction[i]);
    let phase = field.mapv(|z| z.arg());

    debug!(
        delays = taus.len(),
        frames,
        shape = ?shape,
        nu_rf,
        "Double pulse masks computed"
    );
    Ok(MaskPair::new(amplitude, phase))
}

/// Masks shifting the pulse by each delay in `taus_ps`.
///
/// `phi` adds a fixed spectral phase per pixel. The amplitude is flat.
pub fn delay_scan(
    calib: &Calibration,
    taus_ps: &[f64],
    phi: Option<&Array1<f64>>,
) -> ShaperResult<MaskPair> {
    if taus_ps.is_empty() {
        return Err(ShaperError::InvalidParameter(
            "delay scan needs at least one delay".into(),
        ));
    }
    if let Some(bad) = taus_ps.iter().find(|t| !t.is_finite()) {
        return Err(ShaperError::InvalidParameter(format!(
            "delays must be finite, got {bad}"
        )));
    }

    let nu = calib.nu();
    if let Some(phi) = phi {
        if phi.len() != nu.len() {
            return Err(ShaperError::ShapeMismatch(format!(
                "phase offset has {} entries, expected {}",
                phi.len(),
                nu.len()
            )));
        }
    }

    let phase = Array2::from_shape_fn((nu.len(), taus_ps.len()), |(i, k)| {
        let offset = phi.map_or(0.0, |p| p[i]);
        Complex64::from_polar(1.0, -nu[i] * TAU * taus_ps[k] + offset).arg()
    });
    Ok(MaskPair::new(1.0, phase))
}

/// Spectral dispersion expressed as a Taylor expansion around `nu0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dispersion {
    /// Group delay in fs.
    #[serde(default)]
    pub delay: f64,
    /// Group-velocity dispersion in fs².
    #[serde(default)]
    pub gvd: f64,
    /// Third-order dispersion in fs³.
    #[serde(default)]
    pub tod: f64,
    /// Fourth-order dispersion in fs⁴.
    #[serde(default)]
    pub fod: f64,
}

impl Dispersion {
    /// True if every order is zero.
    pub fn is_zero(&self) -> bool {
        self.delay == 0.0 && self.gvd == 0.0 && self.tod == 0.0 && self.fod == 0.0
    }
}

/// Spectral phase of `dispersion` at each frequency of `nu` (THz).
///
/// `x = 2 pi (nu - nu0) / 1000` is the angular frequency offset in rad/fs, and
/// `phase = delay x + gvd x²/2 + tod x³/6 + fod x⁴/24`.
pub fn dispersion_phase(nu: &Array1<f64>, nu0_thz: f64, dispersion: &Dispersion) -> Array1<f64> {
    let coef = [
        dispersion.delay,
        dispersion.gvd / 2.0,
        dispersion.tod / 6.0,
        dispersion.fod / 24.0,
    ];
    nu.mapv(|f| {
        let x = (f - nu0_thz) * TAU / 1000.0;
        x * (coef[0] + x * (coef[1] + x * (coef[2] + x * coef[3])))
    })
}

/// Geometry of the calibration pattern, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibPattern {
    /// Gaussian width (standard deviation) of each line.
    pub width: f64,
    /// Distance between lines of the pulse train.
    pub separation: f64,
    /// Center of the single line; the train is anchored here as well.
    pub single: f64,
}

impl Default for CalibPattern {
    fn default() -> Self {
        Self {
            width: 40.0,
            separation: 350.0,
            single: 6000.0,
        }
    }
}

/// Bare carrier `cos(2 pi i / period)` over `num_pixels` samples.
pub fn full_carrier(num_pixels: usize, period: f64) -> Array1<f64> {
    Array1::from_shape_fn(num_pixels, |i| (TAU * i as f64 / period).cos())
}

/// Three frames used to calibrate the pixel-to-frequency map on a spectrometer.
///
/// Frame 0 is a train of Gaussian lines every `separation` pixels through
/// `single`, frame 1 the single line at `single`, frame 2 the full carrier.
pub fn calibration_pattern(
    num_pixels: usize,
    period: f64,
    pattern: &CalibPattern,
) -> ShaperResult<Array2<f64>> {
    if !(pattern.width > 0.0 && pattern.separation > 0.0) {
        return Err(ShaperError::InvalidParameter(format!(
            "width and separation must be positive, got {} and {}",
            pattern.width, pattern.separation
        )));
    }
    if !(0.0..num_pixels as f64).contains(&pattern.single) {
        return Err(ShaperError::InvalidParameter(format!(
            "single line at {} is outside 0..{num_pixels}",
            pattern.single
        )));
    }

    let n = num_pixels as f64;
    let mut centers = Vec::new();
    let mut pos = pattern.single;
    while pos < n {
        centers.push(pos);
        pos += pattern.separation;
    }
    pos = pattern.single - pattern.separation;
    while pos > 0.0 {
        centers.push(pos);
        pos -= pattern.separation;
    }

    let gauss = |x: f64, c: f64| (-0.5 * (x - c).powi(2) / pattern.width.powi(2)).exp();
    let carrier = full_carrier(num_pixels, period);

    let mut out = Array2::zeros((num_pixels, 3));
    for i in 0..num_pixels {
        let x = i as f64;
        let train: f64 = centers.iter().map(|c| gauss(x, *c)).sum();
        out[[i, 0]] = train * carrier[i];
        out[[i, 1]] = gauss(x, pattern.single) * carrier[i];
        out[[i, 2]] = carrier[i];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXELS: usize = 4096 * 3;

    fn reference() -> Calibration {
        Calibration::new([23.334e-9, -1.943e-3, 67.4], PIXELS).unwrap()
    }

    #[test]
    fn test_double_pulse_reference_shape() {
        let calib = reference();
        let params = DoublePulseParams::new(1.0, 0.1, 1600.0);
        assert_eq!(params.delays().len(), 11);
        assert_eq!(params.num_samples(), 44);

        let masks = double_pulse(&calib, &CorrectionMask::ones(PIXELS), &params).unwrap();
        let Mask::Array(amp) = &masks.amplitude else {
            panic!("expected array amplitude");
        };
        let Mask::Array(phase) = &masks.phase else {
            panic!("expected array phase");
        };
        assert_eq!(amp.dim(), (calib.nu().len(), 44));
        assert_eq!(phase.dim(), (calib.nu().len(), 44));
    }

    #[test]
    fn test_double_pulse_zero_delay_cycle() {
        let calib = reference();
        let params = DoublePulseParams::new(0.5, 0.5, 1600.0);
        let masks = double_pulse(&calib, &CorrectionMask::ones(PIXELS), &params).unwrap();

        // tau = 0: (pi, pi) -> both pulses in phase -> full amplitude, phase pi
        assert!((masks.amplitude.value(100, 0) - 1.0).abs() < 1e-12);
        assert!((masks.phase.value(100, 0).abs() - PI).abs() < 1e-12);
        // (pi, 0) -> destructive interference
        assert!(masks.amplitude.value(100, 1) < 1e-12);
        // (0, 0) -> full amplitude, zero phase
        assert!((masks.amplitude.value(100, 2) - 1.0).abs() < 1e-12);
        assert!(masks.phase.value(100, 2).abs() < 1e-12);
    }

    #[test]
    fn test_double_pulse_amplitude_bounded_and_corrected() {
        let calib = reference();
        let mut values = Array1::ones(PIXELS);
        values[7] = 0.5;
        let correction = CorrectionMask::from_values(values).unwrap();
        let params = DoublePulseParams::new(1.0, 0.25, 2000.0);
        let masks = double_pulse(&calib, &correction, &params).unwrap();

        let frames = masks.frames(PIXELS).unwrap();
        assert_eq!(frames, 5 * 4);
        for k in 0..frames {
            assert!(masks.amplitude.value(7, k) <= 0.5 + 1e-12);
            assert!(masks.amplitude.value(8, k) <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn test_double_pulse_phase_frames() {
        let calib = reference();
        let params =
            DoublePulseParams::new(1.0, 0.1, 1600.0).with_phase_frames(PhaseFrames::Two);
        let masks = double_pulse(&calib, &CorrectionMask::ones(PIXELS), &params).unwrap();
        assert_eq!(masks.frames(PIXELS).unwrap(), 22);
        assert!(PhaseFrames::try_from(3usize).is_err());
    }

    #[test]
    fn test_double_pulse_errors() {
        let calib = reference();
        let ones = CorrectionMask::ones(PIXELS);

        for bad in [0.0, -1.0, f64::NAN] {
            let err = double_pulse(&calib, &ones, &DoublePulseParams::new(bad, 0.1, 1600.0))
                .unwrap_err();
            assert!(matches!(err, ShaperError::InvalidParameter(_)));
        }
        let err =
            double_pulse(&calib, &ones, &DoublePulseParams::new(1.0, 0.0, 1600.0)).unwrap_err();
        assert!(matches!(err, ShaperError::InvalidParameter(_)));

        // Span is ~1569..2248 cm⁻¹
        for rot in [1500.0, 2300.0] {
            let err =
                double_pulse(&calib, &ones, &DoublePulseParams::new(1.0, 0.1, rot)).unwrap_err();
            assert!(matches!(err, ShaperError::OutOfCalibrationRange { .. }));
        }

        let short = CorrectionMask::ones(10);
        let err =
            double_pulse(&calib, &short, &DoublePulseParams::new(1.0, 0.1, 1600.0)).unwrap_err();
        assert!(matches!(err, ShaperError::ShapeMismatch(_)));
    }

    #[test]
    fn test_delay_count_is_bounded() {
        let calib = reference();
        let ones = CorrectionMask::ones(PIXELS);

        // Ratio overflows to infinity
        let tiny = DoublePulseParams::new(1.0, 1e-310, 1600.0);
        assert!(matches!(tiny.validate(), Err(ShaperError::InvalidParameter(_))));
        assert_eq!(tiny.delays().len(), MAX_DELAYS);
        let err = double_pulse(&calib, &ones, &tiny).unwrap_err();
        assert!(matches!(err, ShaperError::InvalidParameter(_)));

        // Finite but far too many frames
        let huge = DoublePulseParams::new(1e3, 1e-6, 1600.0);
        assert!(matches!(huge.validate(), Err(ShaperError::InvalidParameter(_))));
        assert_eq!(huge.num_samples(), MAX_DELAYS * 4);

        let limit = DoublePulseParams::new((MAX_DELAYS - 1) as f64, 1.0, 1600.0);
        assert!(limit.validate().is_ok());
        assert_eq!(limit.delays().len(), MAX_DELAYS);

        // Unvalidated negative ratio still yields a usable sequence
        assert_eq!(DoublePulseParams::new(-1.0, 0.1, 1600.0).delays(), vec![0.0]);
    }

    #[test]
    fn test_frame_count_broadcasting() {
        let a = Mask::Array(Array2::ones((4, 3)));
        let col = Mask::from(Array1::zeros(4));
        assert_eq!(frame_count(&a, &Mask::Constant(0.0), 4).unwrap(), 3);
        assert_eq!(frame_count(&col, &a, 4).unwrap(), 3);
        assert_eq!(frame_count(&a, &col, 4).unwrap(), 3);
        assert_eq!(frame_count(&1.0.into(), &1.0.into(), 4).unwrap(), 1);

        let b = Mask::Array(Array2::ones((4, 2)));
        assert!(frame_count(&a, &b, 4).is_err());
        assert!(frame_count(&a, &Mask::Constant(0.0), 5).is_err());
    }

    #[test]
    fn test_delay_scan() {
        let calib = reference();
        let masks = delay_scan(&calib, &[0.0, 0.2], None).unwrap();
        assert_eq!(masks.amplitude, Mask::Constant(1.0));
        assert_eq!(masks.frames(PIXELS).unwrap(), 2);
        assert_eq!(masks.phase.value(42, 0), 0.0);
        assert!(delay_scan(&calib, &[], None).is_err());
    }

    #[test]
    fn test_dispersion_phase() {
        let nu = Array1::from(vec![55.0, 56.0]);
        let zero = dispersion_phase(&nu, 55.0, &Dispersion::default());
        assert!(zero.iter().all(|p| *p == 0.0));

        let gvd = Dispersion {
            gvd: 1000.0,
            ..Default::default()
        };
        let phase = dispersion_phase(&nu, 55.0, &gvd);
        assert_eq!(phase[0], 0.0);
        let x = TAU / 1000.0;
        assert!((phase[1] - 500.0 * x * x).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_pattern() {
        let pattern = calibration_pattern(PIXELS, 16.0, &CalibPattern::default()).unwrap();
        assert_eq!(pattern.dim(), (PIXELS, 3));
        // Carrier peak at the single line
        assert!((pattern[[6000, 1]] - 1.0).abs() < 1e-12);
        assert!((pattern[[6350, 0]] - (TAU * 6350.0 / 16.0).cos()).abs() < 1e-3);
        assert!(pattern[[6175, 1]].abs() < 1e-3);
        assert_eq!(pattern[[0, 2]], 1.0);

        let bad = CalibPattern {
            single: PIXELS as f64,
            ..Default::default()
        };
        assert!(calibration_pattern(PIXELS, 16.0, &bad).is_err());
    }
}
