//! AOM device: the synthesizer bound to a DAC.
//!
//! [`AomDevice`] owns an [`AomShaper`] behind an async `RwLock` and drives any
//! [`WaveformOutput`]. Mutations go through [`AomDevice::update`], so a waveform
//! generated by [`AomDevice::apply`] always sees one consistent calibration and
//! mask set. Sequences of DAC calls (upload, amplitude change, playback
//! control) hold one mutex so they never interleave.
//!
//! The RF amplitude is set in two stages. Above the voltage floor the DAC
//! output voltage is adjusted and samples use full scale; below it the voltage
//! is parked at zero and the samples are scaled instead.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument};

use crate::error::{ShaperError, ShaperResult};
use crate::hardware::capabilities::{DacSetup, OutputChannel, WaveformOutput, MAX_VOLTAGE_CODE};
use crate::masks::CalibPattern;
use crate::shaper::{AomShaper, ShaperState};
use crate::waveform::{DacBuffer, Waveform};

/// Peak RF voltage at `amp = 1`.
const FULL_SCALE_VOLTS: f64 = 1.4;
/// Lowest voltage reachable through the output voltage setting.
const VOLTAGE_FLOOR: f64 = 0.4;
/// RF amplitude programmed by [`AomDevice::setup`] until changed.
pub const DEFAULT_WAVE_AMP: f64 = 0.4;

/// Voltage code and sample scale realising an RF amplitude set point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveAmplitude {
    /// Requested amplitude in `[0, 1]`
    pub amp: f64,
    /// RF channel voltage code
    pub voltage_code: u16,
    /// Factor applied to the samples before quantization
    pub amp_fac: f64,
}

impl WaveAmplitude {
    /// Split `amp` into voltage code and sample scale.
    pub fn new(amp: f64) -> ShaperResult<Self> {
        if !(0.0..=1.0).contains(&amp) {
            return Err(ShaperError::InvalidParameter(format!(
                "wave amplitude {} must be between 0 and 1",
                amp
            )));
        }
        Ok(Self::split(amp))
    }

    fn split(amp: f64) -> Self {
        let volts = FULL_SCALE_VOLTS * amp;
        let (voltage_code, amp_fac) = if volts > VOLTAGE_FLOOR {
            let code = ((volts - VOLTAGE_FLOOR) * f64::from(MAX_VOLTAGE_CODE)) as u16;
            (code.min(MAX_VOLTAGE_CODE), 1.0)
        } else {
            (0, volts / VOLTAGE_FLOOR)
        };
        Self {
            amp,
            voltage_code,
            amp_fac,
        }
    }
}

impl Default for WaveAmplitude {
    fn default() -> Self {
        Self::split(DEFAULT_WAVE_AMP)
    }
}

/// Synthesizer and DAC driven together.
pub struct AomDevice<D: WaveformOutput> {
    shaper: RwLock<AomShaper>,
    dac: Arc<D>,
    wave_amp: RwLock<WaveAmplitude>,
    loaded: RwLock<Option<Waveform>>,
    /// Held across every sequence of DAC calls that must not interleave.
    upload_lock: Mutex<()>,
}

impl<D: WaveformOutput> AomDevice<D> {
    /// Bind `shaper` to `dac` at [`DEFAULT_WAVE_AMP`]. Nothing is sent to the
    /// hardware until [`setup`](Self::setup).
    pub fn new(shaper: AomShaper, dac: Arc<D>) -> Self {
        Self {
            shaper: RwLock::new(shaper),
            dac,
            wave_amp: RwLock::new(WaveAmplitude::default()),
            loaded: RwLock::new(None),
            upload_lock: Mutex::new(()),
        }
    }

    /// The DAC.
    pub fn dac(&self) -> &Arc<D> {
        &self.dac
    }

    /// Configure triggering, active channels and output voltages.
    ///
    /// The RF voltage is taken from the current wave amplitude.
    #[instrument(skip(self))]
    pub async fn setup(&self) -> Result<()> {
        let _guard = self.upload_lock.lock().await;
        let setup = DacSetup {
            rf_voltage: self.wave_amp.read().await.voltage_code,
            ..DacSetup::default()
        };
        self.dac
            .configure(&setup)
            .await
            .context("Failed to configure DAC")?;
        info!(
            rf_voltage = setup.rf_voltage,
            sync_voltage = setup.sync_voltage,
            "DAC configured"
        );
        Ok(())
    }

    /// Set the RF amplitude and re-upload the loaded waveform with the new
    /// sample scale.
    #[instrument(skip(self))]
    pub async fn set_wave_amp(&self, amp: f64) -> Result<WaveAmplitude> {
        let wave = WaveAmplitude::new(amp)?;
        let _guard = self.upload_lock.lock().await;
        self.dac
            .set_output_voltage(OutputChannel::Rf, wave.voltage_code)
            .await
            .context("Failed to set RF output voltage")?;
        *self.wave_amp.write().await = wave;

        let loaded = self.loaded.read().await.clone();
        if let Some(waveform) = loaded {
            self.upload_locked(waveform).await?;
        }
        info!(amp, code = wave.voltage_code, amp_fac = wave.amp_fac, "Wave amplitude set");
        Ok(wave)
    }

    /// Current RF amplitude setting.
    pub async fn wave_amp(&self) -> WaveAmplitude {
        *self.wave_amp.read().await
    }

    /// Generate the waveform for the current shaper state and upload it.
    ///
    /// Returns the number of interleaved samples written to the DAC.
    pub async fn apply(&self) -> Result<usize> {
        let waveform = self
            .shaper
            .read()
            .await
            .generate_waveform()
            .context("Failed to generate waveform")?;
        self.upload(waveform).await
    }

    /// Upload the spectrometer calibration frames.
    pub async fn load_calib_pattern(&self, pattern: &CalibPattern) -> Result<usize> {
        let waveform = self.shaper.read().await.calibration_pattern(pattern)?;
        self.upload(waveform).await
    }

    /// Upload the bare carrier.
    pub async fn load_full_carrier(&self) -> Result<usize> {
        let waveform = self.shaper.read().await.full_carrier();
        self.upload(waveform).await
    }

    /// Restart playback of the loaded buffer.
    pub async fn start_playback(&self) -> Result<()> {
        let _guard = self.upload_lock.lock().await;
        let loaded = self.loaded.read().await;
        let Some(waveform) = loaded.as_ref() else {
            anyhow::bail!("No waveform loaded");
        };
        let segment_bytes = waveform.num_pixels() * 2 * std::mem::size_of::<i16>();
        self.dac.begin_playback(segment_bytes).await
    }

    /// Stop playback.
    pub async fn end_playback(&self) -> Result<()> {
        let _guard = self.upload_lock.lock().await;
        self.dac.end_playback().await
    }

    /// Mutate the shaper. Calls are serialized against each other and against
    /// waveform generation.
    pub async fn update<R>(
        &self,
        f: impl FnOnce(&mut AomShaper) -> ShaperResult<R>,
    ) -> ShaperResult<R> {
        let mut shaper = self.shaper.write().await;
        f(&mut shaper)
    }

    /// Snapshot of the shaper settings.
    pub async fn state(&self) -> ShaperState {
        self.shaper.read().await.state()
    }

    async fn upload(&self, waveform: Waveform) -> Result<usize> {
        let _guard = self.upload_lock.lock().await;
        self.upload_locked(waveform).await
    }

    /// Stop, load, restart. Callers hold `upload_lock`.
    async fn upload_locked(&self, waveform: Waveform) -> Result<usize> {
        let amp_fac = self.wave_amp.read().await.amp_fac;
        let buffer = DacBuffer::from_waveform(&waveform, amp_fac);

        self.dac.end_playback().await?;
        self.dac
            .load_buffer(&buffer)
            .await
            .context("Failed to load DAC buffer")?;
        self.dac.begin_playback(buffer.segment_bytes()).await?;
        *self.loaded.write().await = Some(waveform);

        info!(
            frames = buffer.num_frames(),
            samples = buffer.samples().len(),
            amp_fac,
            "Waveform uploaded"
        );
        Ok(buffer.samples().len())
    }
}
