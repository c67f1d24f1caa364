//! # AOM Shaper Library
//!
//! Waveform synthesis for an acousto-optic (AOM) femtosecond pulse shaper.
//! A DAC drives an acoustic wave through the modulator crystal; each DAC
//! sample addresses one spectral pixel. The library turns spectral
//! amplitude/phase masks into the 16-bit sample buffer that plays them.
//!
//! ## Crate Structure
//!
//! - **`units`**: Conversions between THz, cm⁻¹ and nm.
//! - **`calibration`**: The pixel → frequency polynomial and the per-pixel
//!   correction mask loaded from file.
//! - **`masks`**: Amplitude/phase mask types and generators (double pulse,
//!   delay scan, dispersion phase, spectrometer calibration frames).
//! - **`waveform`**: Bragg and classic encoding laws, frame assembly
//!   (chopping, phase cycling) and DAC quantization.
//! - **`shaper`**: `AomShaper`, the owned synthesizer state with
//!   `generate_waveform`.
//! - **`device`**: `AomDevice`, a shaper bound to an async DAC with the RF
//!   amplitude law.
//! - **`hardware`**: The `WaveformOutput` capability plus mock and file DACs.
//! - **`config`**: Figment-based TOML/environment configuration.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: The `ShaperError` enum.

pub mod calibration;
pub mod config;
pub mod device;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod masks;
pub mod shaper;
pub mod units;
pub mod waveform;

pub use error::{ShaperError, ShaperResult};
pub use shaper::AomShaper;
