//! Hardware Capabilities
//!
//! Capability traits that waveform hardware implements. The shaper only ever
//! needs one: a DAC that plays an interleaved 16-bit buffer out of on-board
//! RAM on every external trigger.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! async fn upload<T: WaveformOutput>(dac: &T, buffer: &DacBuffer) -> Result<()> {
//!     dac.end_playback().await?;
//!     dac.load_buffer(buffer).await?;
//!     dac.begin_playback(buffer.segment_bytes()).await
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::waveform::DacBuffer;

/// Highest code accepted by `set_output_voltage`.
pub const MAX_VOLTAGE_CODE: u16 = 1023;

/// Analog output channel of a two-channel DAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputChannel {
    /// Channel 1, drives the AOM RF amplifier
    Rf,
    /// Channel 2, carries the frame sync pulse
    Sync,
}

impl OutputChannel {
    /// Bit of this channel in the active-channel mask.
    pub fn mask_bit(self) -> u32 {
        match self {
            OutputChannel::Rf => 0x1,
            OutputChannel::Sync => 0x2,
        }
    }
}

/// Static DAC configuration applied once before any upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DacSetup {
    /// Start playback on the external trigger input
    pub external_trigger: bool,
    /// Vendor trigger mode, 0 = single shot per trigger
    pub trigger_mode: u32,
    /// Active channels, OR of `OutputChannel::mask_bit`
    pub channel_mask: u32,
    /// Output voltage code of the RF channel
    pub rf_voltage: u16,
    /// Output voltage code of the sync channel
    pub sync_voltage: u16,
}

impl Default for DacSetup {
    fn default() -> Self {
        Self {
            external_trigger: true,
            trigger_mode: 0,
            channel_mask: OutputChannel::Rf.mask_bit() | OutputChannel::Sync.mask_bit(),
            rf_voltage: 200,
            sync_voltage: 1000,
        }
    }
}

/// Capability: Arbitrary Waveform Playback
///
/// Devices that stream a pre-computed sample buffer out of on-board memory
/// (PCIe DAC boards, file sinks for offline inspection).
///
/// # Contract
/// - `configure` must be called before the first `load_buffer`
/// - `load_buffer` replaces the whole playback memory
/// - `begin_playback` starts triggered playback of the loaded buffer, one
///   segment of `segment_bytes` per trigger
/// - `end_playback` is a no-op when nothing is playing
///
/// # Thread Safety
/// - All methods take `&self`; implementors use interior mutability
#[async_trait]
pub trait WaveformOutput: Send + Sync {
    /// Apply trigger, channel and voltage configuration
    async fn configure(&self, setup: &DacSetup) -> Result<()>;

    /// Set the analog output voltage code (`0..=MAX_VOLTAGE_CODE`) of a channel
    async fn set_output_voltage(&self, channel: OutputChannel, code: u16) -> Result<()>;

    /// Copy an interleaved buffer into playback memory
    async fn load_buffer(&self, buffer: &DacBuffer) -> Result<()>;

    /// Start triggered playback
    ///
    /// # Arguments
    /// * `segment_bytes` - Bytes played per trigger (both channels)
    async fn begin_playback(&self, segment_bytes: usize) -> Result<()>;

    /// Stop playback
    async fn end_playback(&self) -> Result<()>;

    /// Whether playback is currently running
    async fn is_playing(&self) -> Result<bool>;
}
