//! Mock Hardware Implementations
//!
//! Provides a simulated DAC for testing without physical hardware.
//! All mock devices use async-safe state (tokio::sync::RwLock).
//!
//! # Available Mocks
//!
//! - `MockDac` - Records configuration, voltages and uploaded buffers and
//!   enforces the configure → load → play ordering of real boards

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::hardware::capabilities::{DacSetup, OutputChannel, WaveformOutput, MAX_VOLTAGE_CODE};
use crate::waveform::DacBuffer;

// =============================================================================
// MockDac - Simulated Waveform DAC
// =============================================================================

/// Mock two-channel DAC with on-board playback memory
///
/// Simulates a DAC that:
/// - Rejects uploads before `configure`
/// - Rejects uploads while playing
/// - Plays the loaded buffer in segments of a fixed byte size
///
/// # Example
///
/// ```rust,ignore
/// let dac = MockDac::new();
/// dac.configure(&DacSetup::default()).await?;
/// dac.load_buffer(&buffer).await?;
/// dac.begin_playback(buffer.segment_bytes()).await?;
/// ```
#[derive(Default)]
pub struct MockDac {
    setup: Arc<RwLock<Option<DacSetup>>>,
    voltages: Arc<RwLock<HashMap<OutputChannel, u16>>>,
    buffer: Arc<RwLock<Option<DacBuffer>>>,
    segment_bytes: Arc<RwLock<Option<usize>>>,
    upload_count: AtomicU64,
}

impl MockDac {
    /// Create an unconfigured mock DAC
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration applied by the last `configure` call
    pub async fn setup(&self) -> Option<DacSetup> {
        *self.setup.read().await
    }

    /// Current voltage code of a channel
    pub async fn voltage(&self, channel: OutputChannel) -> Option<u16> {
        self.voltages.read().await.get(&channel).copied()
    }

    /// Copy of the buffer in playback memory
    pub async fn buffer(&self) -> Option<DacBuffer> {
        self.buffer.read().await.clone()
    }

    /// Segment size of the running playback
    pub async fn segment_bytes(&self) -> Option<usize> {
        *self.segment_bytes.read().await
    }

    /// Number of buffers loaded so far
    pub fn upload_count(&self) -> u64 {
        self.upload_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WaveformOutput for MockDac {
    async fn configure(&self, setup: &DacSetup) -> Result<()> {
        let mut voltages = self.voltages.write().await;
        voltages.insert(OutputChannel::Rf, setup.rf_voltage);
        voltages.insert(OutputChannel::Sync, setup.sync_voltage);
        *self.setup.write().await = Some(*setup);
        debug!(?setup, "MockDac configured");
        Ok(())
    }

    async fn set_output_voltage(&self, channel: OutputChannel, code: u16) -> Result<()> {
        if code > MAX_VOLTAGE_CODE {
            bail!("Voltage code {} exceeds {}", code, MAX_VOLTAGE_CODE);
        }
        self.voltages.write().await.insert(channel, code);
        debug!(?channel, code, "MockDac output voltage set");
        Ok(())
    }

    async fn load_buffer(&self, buffer: &DacBuffer) -> Result<()> {
        if self.setup.read().await.is_none() {
            bail!("MockDac not configured");
        }
        if self.segment_bytes.read().await.is_some() {
            bail!("Cannot load buffer while playing");
        }
        *self.buffer.write().await = Some(buffer.clone());
        self.upload_count.fetch_add(1, Ordering::SeqCst);
        debug!(bytes = buffer.byte_len(), "MockDac buffer loaded");
        Ok(())
    }

    async fn begin_playback(&self, segment_bytes: usize) -> Result<()> {
        let loaded = self.buffer.read().await;
        let buffer = loaded.as_ref().ok_or_else(|| anyhow!("No buffer loaded"))?;
        if segment_bytes == 0 || buffer.byte_len() % segment_bytes != 0 {
            bail!(
                "Segment size {} does not divide buffer of {} bytes",
                segment_bytes,
                buffer.byte_len()
            );
        }
        *self.segment_bytes.write().await = Some(segment_bytes);
        Ok(())
    }

    async fn end_playback(&self) -> Result<()> {
        *self.segment_bytes.write().await = None;
        Ok(())
    }

    async fn is_playing(&self) -> Result<bool> {
        Ok(self.segment_bytes.read().await.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::Waveform;
    use ndarray::Array2;

    fn small_buffer() -> DacBuffer {
        DacBuffer::from_waveform(&Waveform::new(Array2::from_elem((4, 2), 0.5)), 1.0)
    }

    #[tokio::test]
    async fn test_mock_dac_requires_configure() {
        let dac = MockDac::new();
        assert!(dac.load_buffer(&small_buffer()).await.is_err());

        dac.configure(&DacSetup::default()).await.unwrap();
        dac.load_buffer(&small_buffer()).await.unwrap();
        assert_eq!(dac.upload_count(), 1);
        assert_eq!(dac.voltage(OutputChannel::Sync).await, Some(1000));
    }

    #[tokio::test]
    async fn test_mock_dac_playback_cycle() {
        let dac = MockDac::new();
        dac.configure(&DacSetup::default()).await.unwrap();

        // Nothing loaded yet
        assert!(dac.begin_playback(16).await.is_err());

        let buffer = small_buffer();
        dac.load_buffer(&buffer).await.unwrap();
        dac.begin_playback(buffer.segment_bytes()).await.unwrap();
        assert!(dac.is_playing().await.unwrap());

        // Cannot reload while playing
        assert!(dac.load_buffer(&buffer).await.is_err());

        dac.end_playback().await.unwrap();
        assert!(!dac.is_playing().await.unwrap());

        // Idempotent
        dac.end_playback().await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_dac_rejects_bad_segment() {
        let dac = MockDac::new();
        dac.configure(&DacSetup::default()).await.unwrap();
        dac.load_buffer(&small_buffer()).await.unwrap();

        // Buffer is 32 bytes
        assert!(dac.begin_playback(0).await.is_err());
        assert!(dac.begin_playback(12).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_dac_voltage_range() {
        let dac = MockDac::new();
        dac.set_output_voltage(OutputChannel::Rf, 1023).await.unwrap();
        assert_eq!(dac.voltage(OutputChannel::Rf).await, Some(1023));
        assert!(dac.set_output_voltage(OutputChannel::Rf, 1024).await.is_err());
    }
}
