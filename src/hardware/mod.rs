//! Hardware abstraction for waveform output.
//!
//! `capabilities` holds the async `WaveformOutput` trait, `mock` a simulated
//! board for tests and `rd16` a file sink for offline generation.

pub mod capabilities;
pub mod mock;
pub mod rd16;

pub use capabilities::{DacSetup, OutputChannel, WaveformOutput};
pub use mock::MockDac;
pub use rd16::Rd16FileDac;
