//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the shaper.
//! Configuration is loaded from:
//! 1. `config/shaper.toml` (base configuration)
//! 2. Environment variables (prefixed with `AOM_SHAPER_`, `__` separates sections)
//!
//! Every field has a default, so an empty or missing file yields the stock
//! Phasetech AOM setup (12288 pixels, 1200 MHz DAC clock, 75 MHz carrier).
//!
//! # Example
//! ```no_run
//! use aom_shaper::config::ShaperConfig;
//!
//! let config = ShaperConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), figment::Error>(())
//! ```

use crate::device::DEFAULT_WAVE_AMP;
use crate::error::{ShaperError, ShaperResult};
use crate::logging::OutputFormat;
use crate::masks::Dispersion;
use crate::shaper::PIXEL;
use crate::waveform::{Encoding, RfSettings};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaperConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Shaper hardware and encoding settings
    pub shaper: ShaperSettings,
    /// Dispersion to compensate
    pub dispersion: Dispersion,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: OutputFormat,
    /// Log span open and close events
    pub log_span_events: bool,
    /// Include source file and line in log lines
    pub log_file_and_line: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "AOM Shaper".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::default(),
            log_span_events: false,
            log_file_and_line: false,
        }
    }
}

/// Shaper settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaperSettings {
    /// Samples per frame
    pub pixels: usize,
    /// Bragg-matched optical frequency in THz
    pub nu0_thz: f64,
    /// DAC sample clock in MHz
    pub dac_freq_mhz: f64,
    /// Acoustic carrier in MHz
    pub rf_freq_mhz: f64,
    /// RF amplitude set point (0..=1)
    pub wave_amp: f64,
    /// Encoding law
    pub mode: Encoding,
    /// Dark frame before each frame
    pub chopped: bool,
    /// Negated copy after the frames
    pub phase_cycle: bool,
    /// Apply dispersion compensation
    pub do_dispersion_compensation: bool,
    /// Calibration polynomial `(p1, p2, p3)`
    pub calibration: Option<[f64; 3]>,
    /// Per-pixel correction file
    pub calib_mask: Option<PathBuf>,
}

impl Default for ShaperSettings {
    fn default() -> Self {
        let rf = RfSettings::default();
        Self {
            pixels: PIXEL,
            nu0_thz: rf.nu0_thz,
            dac_freq_mhz: rf.dac_freq_mhz,
            rf_freq_mhz: rf.rf_freq_mhz,
            wave_amp: DEFAULT_WAVE_AMP,
            mode: Encoding::Bragg,
            chopped: true,
            phase_cycle: true,
            do_dispersion_compensation: true,
            calibration: None,
            calib_mask: None,
        }
    }
}

impl ShaperSettings {
    /// RF parameters of these settings.
    pub fn rf(&self) -> RfSettings {
        RfSettings {
            nu0_thz: self.nu0_thz,
            dac_freq_mhz: self.dac_freq_mhz,
            rf_freq_mhz: self.rf_freq_mhz,
        }
    }
}

impl ShaperConfig {
    /// Load configuration from config/shaper.toml and environment variables
    ///
    /// Environment variables can override configuration with prefix AOM_SHAPER_
    /// Example: AOM_SHAPER_APPLICATION__LOG_LEVEL=debug
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from("config/shaper.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("AOM_SHAPER_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ShaperResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ShaperError::InvalidParameter(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.shaper.pixels < 2 {
            return Err(ShaperError::InvalidParameter(format!(
                "pixels must be at least 2, got {}",
                self.shaper.pixels
            )));
        }

        self.shaper.rf().validate()?;

        if !(0.0..=1.0).contains(&self.shaper.wave_amp) {
            return Err(ShaperError::InvalidParameter(format!(
                "wave_amp {} must be between 0 and 1",
                self.shaper.wave_amp
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_validate() {
        let config = ShaperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shaper.pixels, 12288);
        assert_eq!(config.shaper.rf().carrier_period(), 16.0);
        assert_eq!(config.shaper.mode, Encoding::Bragg);
    }

    #[test]
    fn test_load_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "shaper.toml",
                r#"
                [application]
                name = "Test"
                log_level = "debug"

                [shaper]
                mode = "classic"
                chopped = false
                calibration = [23.334e-9, -1.943e-3, 67.4]

                [dispersion]
                gvd = 120.0
                "#,
            )?;

            let config = ShaperConfig::load_from("shaper.toml")?;
            assert_eq!(config.application.name, "Test");
            assert_eq!(config.shaper.mode, Encoding::Classic);
            assert!(!config.shaper.chopped);
            assert!(config.shaper.phase_cycle);
            assert_eq!(config.shaper.calibration, Some([23.334e-9, -1.943e-3, 67.4]));
            assert_eq!(config.dispersion.gvd, 120.0);
            assert_eq!(config.dispersion.tod, 0.0);
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("shaper.toml", "[shaper]\nwave_amp = 0.8\n")?;
            jail.set_env("AOM_SHAPER_SHAPER__WAVE_AMP", "0.2");
            jail.set_env("AOM_SHAPER_APPLICATION__LOG_LEVEL", "warn");
            jail.set_env("AOM_SHAPER_APPLICATION__LOG_FORMAT", "json");

            let config = ShaperConfig::load_from("shaper.toml")?;
            assert_eq!(config.shaper.wave_amp, 0.2);
            assert_eq!(config.application.log_level, "warn");
            assert_eq!(config.application.log_format, OutputFormat::Json);
            assert!(!config.application.log_span_events);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_| {
            let config = ShaperConfig::load_from("does-not-exist.toml")?;
            assert_eq!(config, ShaperConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ShaperConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = ShaperConfig::default();
        config.shaper.wave_amp = 1.5;
        assert!(config.validate().is_err());

        let mut config = ShaperConfig::default();
        config.shaper.rf_freq_mhz = 0.0;
        assert!(config.validate().is_err());
    }
}
