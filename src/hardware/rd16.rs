//! File-backed DAC
//!
//! Writes every uploaded buffer as a raw `.rd16` image: interleaved
//! little-endian `i16` samples, RF channel first, the same byte layout the
//! board's RAM loader consumes. Used by the CLI for offline generation.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::hardware::capabilities::{DacSetup, OutputChannel, WaveformOutput, MAX_VOLTAGE_CODE};
use crate::waveform::DacBuffer;

/// DAC sink writing uploads to a file
pub struct Rd16FileDac {
    path: PathBuf,
    setup: RwLock<Option<DacSetup>>,
    rf_voltage: RwLock<u16>,
    playing: AtomicBool,
}

impl Rd16FileDac {
    /// Create a sink for `path`; the file is written on the first upload
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            setup: RwLock::new(None),
            rf_voltage: RwLock::new(0),
            playing: AtomicBool::new(false),
        }
    }

    /// Output file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last RF voltage code
    pub async fn rf_voltage(&self) -> u16 {
        *self.rf_voltage.read().await
    }
}

#[async_trait]
impl WaveformOutput for Rd16FileDac {
    async fn configure(&self, setup: &DacSetup) -> Result<()> {
        *self.setup.write().await = Some(*setup);
        *self.rf_voltage.write().await = setup.rf_voltage;
        Ok(())
    }

    async fn set_output_voltage(&self, channel: OutputChannel, code: u16) -> Result<()> {
        if code > MAX_VOLTAGE_CODE {
            bail!("Voltage code {} exceeds {}", code, MAX_VOLTAGE_CODE);
        }
        if channel == OutputChannel::Rf {
            *self.rf_voltage.write().await = code;
        }
        debug!(?channel, code, "Output voltage set");
        Ok(())
    }

    async fn load_buffer(&self, buffer: &DacBuffer) -> Result<()> {
        if self.setup.read().await.is_none() {
            bail!("DAC not configured");
        }
        tokio::fs::write(&self.path, buffer.to_le_bytes())
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        info!(
            path = %self.path.display(),
            frames = buffer.num_frames(),
            bytes = buffer.byte_len(),
            "Wrote DAC buffer"
        );
        Ok(())
    }

    async fn begin_playback(&self, segment_bytes: usize) -> Result<()> {
        if segment_bytes == 0 {
            bail!("Segment size must be positive");
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn end_playback(&self) -> Result<()> {
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_playing(&self) -> Result<bool> {
        Ok(self.playing.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::Waveform;
    use ndarray::Array2;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_writes_le_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flat.rd16");
        let dac = Rd16FileDac::new(&path);

        let buffer = DacBuffer::from_waveform(&Waveform::new(Array2::from_elem((3, 1), 1.0)), 1.0);
        assert!(dac.load_buffer(&buffer).await.is_err());

        dac.configure(&DacSetup::default()).await.unwrap();
        dac.load_buffer(&buffer).await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), buffer.byte_len());
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 8191);
    }
}
