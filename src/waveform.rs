//! RF waveform encoding.
//!
//! Turns an amplitude/phase [`MaskPair`] into the real-valued drive signal of
//! the AOM. Two encoding laws are supported and always selected explicitly:
//!
//! - **Bragg**: the carrier phase follows the integrated calibration, so each
//!   pixel is driven at the acoustic frequency that Bragg-matches its optical
//!   frequency. Amplitude and phase are carried jointly; amplitudes outside
//!   `[0, 1]` saturate.
//! - **Classic**: a fixed carrier at `rf_freq_mhz`, amplitude applied linearly
//!   and phase added as a carrier delay.
//!
//! A [`Waveform`] keeps one column per playback frame. [`DacBuffer`] is the
//! quantized, two-channel interleaved form loaded into DAC memory.

use crate::calibration::Calibration;
use crate::error::{ShaperError, ShaperResult};
use crate::masks::{frame_count, Mask, MaskPair};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Full-scale DAC code used when quantizing a waveform.
pub const MAX_16_BIT: i16 = (1 << 13) - 1;

/// Encoding law used to turn masks into an RF waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Calibration-matched carrier, joint amplitude and phase.
    #[default]
    Bragg,
    /// Fixed carrier, linear amplitude, phase as delay.
    Classic,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bragg => write!(f, "bragg"),
            Self::Classic => write!(f, "classic"),
        }
    }
}

impl FromStr for Encoding {
    type Err = ShaperError;

    fn from_str(s: &str) -> ShaperResult<Self> {
        match s.to_lowercase().as_str() {
            "bragg" => Ok(Self::Bragg),
            "classic" => Ok(Self::Classic),
            other => Err(ShaperError::InvalidParameter(format!(
                "unknown encoding '{other}', expected 'bragg' or 'classic'"
            ))),
        }
    }
}

/// RF parameters of the AOM drive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RfSettings {
    /// Optical frequency in THz that is Bragg matched at `rf_freq_mhz`.
    pub nu0_thz: f64,
    /// DAC sample clock in MHz.
    pub dac_freq_mhz: f64,
    /// Acoustic carrier frequency in MHz.
    pub rf_freq_mhz: f64,
}

impl Default for RfSettings {
    fn default() -> Self {
        Self {
            nu0_thz: 55.0,
            dac_freq_mhz: 1200.0,
            rf_freq_mhz: 75.0,
        }
    }
}

impl RfSettings {
    /// Carrier period in DAC samples (16 for 1200 MHz / 75 MHz).
    pub fn carrier_period(&self) -> f64 {
        self.dac_freq_mhz / self.rf_freq_mhz
    }

    /// Check that all frequencies are positive and finite.
    pub fn validate(&self) -> ShaperResult<()> {
        for (name, value) in [
            ("nu0_thz", self.nu0_thz),
            ("dac_freq_mhz", self.dac_freq_mhz),
            ("rf_freq_mhz", self.rf_freq_mhz),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ShaperError::InvalidParameter(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Real-valued drive signal, one column per playback frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    frames: Array2<f64>,
}

impl Waveform {
    /// Wrap a `(num_pixels, num_frames)` array.
    pub fn new(frames: Array2<f64>) -> Self {
        Self { frames }
    }

    /// Samples per frame.
    pub fn num_pixels(&self) -> usize {
        self.frames.nrows()
    }

    /// Number of frames.
    pub fn num_frames(&self) -> usize {
        self.frames.ncols()
    }

    /// The frames as an array.
    pub fn frames(&self) -> &Array2<f64> {
        &self.frames
    }

    /// Samples in playback order (frame after frame).
    pub fn samples(&self) -> Vec<f64> {
        self.frames.t().iter().copied().collect()
    }

    /// Frame layout used on the shaper: optional chopping and phase cycling.
    ///
    /// Chopping prepends an all-zero copy (`[0, W]`), phase cycling appends
    /// the negated copy (`[W, -W]`). Both together give `[0, W, 0, -W]`.
    pub fn assemble(self, chopped: bool, phase_cycle: bool) -> Self {
        let mut frames = self.frames;
        if chopped {
            frames = doubled(&frames, |_| 0.0, |v| v);
        }
        if phase_cycle {
            frames = doubled(&frames, |v| v, |v| -v);
        }
        Self { frames }
    }
}

/// Twice as many frames: `first` applied to the input frames, then `second`.
fn doubled(
    frames: &Array2<f64>,
    first: impl Fn(f64) -> f64,
    second: impl Fn(f64) -> f64,
) -> Array2<f64> {
    let (rows, cols) = frames.dim();
    Array2::from_shape_fn((rows, 2 * cols), |(i, k)| {
        if k < cols {
            first(frames[[i, k]])
        } else {
            second(frames[[i, k - cols]])
        }
    })
}

/// Bragg-matched waveform for the given masks.
///
/// ```text
/// carrier_i = 2 pi F(i) / nu0 * rf / dac
/// out[i, k] = clamp(amp[i, k], 0, 1) * cos(phase[i, k] + carrier_i)
/// ```
///
/// where `F` is the antiderivative of the calibration polynomial.
pub fn bragg_wf(
    calib: &Calibration,
    rf: &RfSettings,
    amplitude: &Mask,
    phase: &Mask,
) -> ShaperResult<Waveform> {
    let num_pixels = calib.num_pixels();
    let num_frames = frame_count(amplitude, phase, num_pixels)?;

    let scale = TAU / rf.nu0_thz * rf.rf_freq_mhz / rf.dac_freq_mhz;
    let carrier = Array1::from_shape_fn(num_pixels, |i| scale * calib.antiderivative(i as f64));

    let mut saturated = 0usize;
    let frames = Array2::from_shape_fn((num_pixels, num_frames), |(i, k)| {
        let a = amplitude.value(i, k);
        let clamped = a.clamp(0.0, 1.0);
        if clamped != a {
            saturated += 1;
        }
        clamped * (phase.value(i, k) + carrier[i]).cos()
    });
    if saturated > 0 {
        warn!(saturated, "Amplitude mask saturated in Bragg encoding");
    }

    debug!(num_pixels, num_frames, "Bragg waveform encoded");
    Ok(Waveform::new(frames))
}

/// Fixed-carrier waveform for the given masks.
///
/// ```text
/// out[i, k] = amp[i, k] * cos(2 pi i / (dac / rf) + phase[i, k])
/// ```
pub fn classic_wf(
    num_pixels: usize,
    rf: &RfSettings,
    amplitude: &Mask,
    phase: &Mask,
) -> ShaperResult<Waveform> {
    let num_frames = frame_count(amplitude, phase, num_pixels)?;
    let period = rf.carrier_period();

    let frames = Array2::from_shape_fn((num_pixels, num_frames), |(i, k)| {
        amplitude.value(i, k) * (i as f64 / period * TAU + phase.value(i, k)).cos()
    });

    debug!(num_pixels, num_frames, "Classic waveform encoded");
    Ok(Waveform::new(frames))
}

/// Encode `masks` with the chosen law.
///
/// Bragg encoding needs a calibration; classic encoding only uses the pixel
/// count.
pub fn encode(
    encoding: Encoding,
    calib: Option<&Calibration>,
    num_pixels: usize,
    rf: &RfSettings,
    masks: &MaskPair,
) -> ShaperResult<Waveform> {
    match encoding {
        Encoding::Bragg => {
            let calib = calib.ok_or(ShaperError::NoCalibration)?;
            bragg_wf(calib, rf, &masks.amplitude, &masks.phase)
        }
        Encoding::Classic => classic_wf(num_pixels, rf, &masks.amplitude, &masks.phase),
    }
}

/// Quantized two-channel sample buffer in DAC memory layout.
///
/// Even indices carry the waveform on channel 1. Odd indices carry the sync
/// marker on channel 2: full scale during the first frame, zero afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DacBuffer {
    samples: Vec<i16>,
    frame_len: usize,
}

impl DacBuffer {
    /// Quantize `waveform` scaled by `amp_fac`.
    ///
    /// Codes are truncated toward zero and saturate at the `i16` limits.
    pub fn from_waveform(waveform: &Waveform, amp_fac: f64) -> Self {
        let frame_len = waveform.num_pixels();
        let scale = amp_fac * f64::from(MAX_16_BIT);
        let mut samples = Vec::with_capacity(2 * frame_len * waveform.num_frames());
        for (n, value) in waveform.frames.t().iter().enumerate() {
            samples.push((scale * value) as i16);
            samples.push(if n < frame_len { MAX_16_BIT } else { 0 });
        }
        Self { samples, frame_len }
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> Vec<i16> {
        self.samples.iter().skip(index).step_by(2).copied().collect()
    }

    /// Samples per channel and frame.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Number of frames.
    pub fn num_frames(&self) -> usize {
        if self.frame_len == 0 {
            0
        } else {
            self.samples.len() / (2 * self.frame_len)
        }
    }

    /// Buffer size in bytes.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }

    /// Bytes per playback segment (one frame on both channels).
    pub fn segment_bytes(&self) -> usize {
        self.frame_len * 2 * std::mem::size_of::<i16>()
    }

    /// Little-endian byte image of the buffer.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CorrectionMask;
    use crate::masks::{double_pulse, DoublePulseParams};

    const PIXELS: usize = 4096 * 3;

    fn reference() -> Calibration {
        Calibration::new([23.334e-9, -1.943e-3, 67.4], PIXELS).unwrap()
    }

    #[test]
    fn test_flat_inputs_accepted() {
        let calib = reference();
        let rf = RfSettings::default();
        let one = Mask::Constant(1.0);

        let bragg = bragg_wf(&calib, &rf, &one, &one).unwrap();
        assert_eq!(bragg.frames().dim(), (PIXELS, 1));
        let classic = classic_wf(PIXELS, &rf, &one, &one).unwrap();
        assert_eq!(classic.frames().dim(), (PIXELS, 1));
        assert!(classic.frames().iter().all(|v| v.abs() <= 1.0));
        assert!((classic.frames()[[0, 0]] - 1.0_f64.cos()).abs() < 1e-12);
    }

    #[test]
    fn test_classic_carrier_period() {
        let rf = RfSettings::default();
        let wf = classic_wf(64, &rf, &Mask::Constant(1.0), &Mask::Constant(0.0)).unwrap();
        let f = wf.frames();
        assert!((f[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((f[[16, 0]] - 1.0).abs() < 1e-12);
        assert!((f[[8, 0]] + 1.0).abs() < 1e-12);
        assert!(f[[4, 0]].abs() < 1e-12);
    }

    #[test]
    fn test_encodings_differ() {
        let calib = reference();
        let rf = RfSettings::default();
        let params = DoublePulseParams::new(1.0, 0.1, 1600.0);
        let masks = double_pulse(&calib, &CorrectionMask::ones(PIXELS), &params).unwrap();

        let bragg = encode(Encoding::Bragg, Some(&calib), PIXELS, &rf, &masks).unwrap();
        let classic = encode(Encoding::Classic, Some(&calib), PIXELS, &rf, &masks).unwrap();
        assert_eq!(bragg.frames().dim(), classic.frames().dim());
        assert_ne!(bragg, classic);
    }

    #[test]
    fn test_encodings_coincide_for_zero_amplitude() {
        let calib = reference();
        let rf = RfSettings::default();
        let masks = MaskPair::new(0.0, 0.0);
        let bragg = encode(Encoding::Bragg, Some(&calib), PIXELS, &rf, &masks).unwrap();
        let classic = encode(Encoding::Classic, Some(&calib), PIXELS, &rf, &masks).unwrap();
        assert!(bragg.frames().iter().all(|v| *v == 0.0));
        assert_eq!(bragg, classic);
    }

    #[test]
    fn test_bragg_saturates() {
        let calib = reference();
        let rf = RfSettings::default();
        let wf = bragg_wf(&calib, &rf, &Mask::Constant(3.0), &Mask::Constant(0.0)).unwrap();
        assert!(wf.frames().iter().all(|v| v.abs() <= 1.0));
        assert!((wf.frames()[[0, 0]] - 1.0).abs() < 1e-12);

        let neg = bragg_wf(&calib, &rf, &Mask::Constant(-1.0), &Mask::Constant(0.0)).unwrap();
        assert!(neg.frames().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_bragg_requires_calibration() {
        let rf = RfSettings::default();
        let err = encode(Encoding::Bragg, None, PIXELS, &rf, &MaskPair::flat()).unwrap_err();
        assert!(matches!(err, ShaperError::NoCalibration));
        assert!(encode(Encoding::Classic, None, PIXELS, &rf, &MaskPair::flat()).is_ok());
    }

    #[test]
    fn test_row_mismatch_rejected() {
        let rf = RfSettings::default();
        let amp = Mask::Array(Array2::ones((10, 2)));
        let err = classic_wf(PIXELS, &rf, &amp, &Mask::Constant(0.0)).unwrap_err();
        assert!(matches!(err, ShaperError::ShapeMismatch(_)));
    }

    #[test]
    fn test_assemble_frames() {
        let wf = Waveform::new(Array2::from_elem((4, 1), 0.5));
        let out = wf.clone().assemble(true, true);
        assert_eq!(out.num_frames(), 4);
        let col = |k: usize| out.frames()[[0, k]];
        assert_eq!((col(0), col(1), col(2), col(3)), (0.0, 0.5, 0.0, -0.5));

        assert_eq!(wf.clone().assemble(false, false), wf);
        assert_eq!(wf.clone().assemble(false, true).num_frames(), 2);
        assert_eq!(wf.assemble(true, false).num_frames(), 2);
    }

    #[test]
    fn test_dac_buffer_layout() {
        let frames = Array2::from_shape_vec((3, 2), vec![1.0, -1.0, 0.5, 0.25, 2.0, 0.0]).unwrap();
        let wf = Waveform::new(frames);
        assert_eq!(wf.samples(), vec![1.0, 0.5, 2.0, -1.0, 0.25, 0.0]);

        let buf = DacBuffer::from_waveform(&wf, 1.0);
        assert_eq!(buf.frame_len(), 3);
        assert_eq!(buf.num_frames(), 2);
        assert_eq!(
            buf.channel(0),
            vec![8191, 4095, 16382, -8191, 2047, 0]
        );
        assert_eq!(buf.channel(1), vec![8191, 8191, 8191, 0, 0, 0]);
        assert_eq!(buf.byte_len(), 24);
        assert_eq!(buf.segment_bytes(), 12);
        assert_eq!(buf.to_le_bytes().len(), 24);

        let half = DacBuffer::from_waveform(&wf, 0.5);
        assert_eq!(half.channel(0)[0], 4095);
    }

    #[test]
    fn test_encoding_parse() {
        assert_eq!("Bragg".parse::<Encoding>().unwrap(), Encoding::Bragg);
        assert_eq!("classic".parse::<Encoding>().unwrap(), Encoding::Classic);
        assert!("fancy".parse::<Encoding>().is_err());
        assert_eq!(Encoding::Classic.to_string(), "classic");
    }
}
