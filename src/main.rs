//! CLI Entry Point for aom-shaper
//!
//! Generates pulse-shaper waveforms offline and writes them as raw `.rd16`
//! DAC images (interleaved little-endian `i16`, RF then sync channel).
//!
//! # Usage
//!
//! Show the calibrated span:
//! ```bash
//! aom-shaper --config config/shaper.toml info --json
//! ```
//!
//! Double-pulse scan with 0.1 ps steps up to 2 ps:
//! ```bash
//! aom-shaper double-pulse --max-delay 2 --step 0.1 --rot-frame 1600 --out dp.rd16
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use aom_shaper::config::ShaperConfig;
use aom_shaper::device::AomDevice;
use aom_shaper::hardware::Rd16FileDac;
use aom_shaper::logging;
use aom_shaper::masks::{CalibPattern, DoublePulseParams, MaskPair, PhaseFrames};
use aom_shaper::shaper::AomShaper;
use aom_shaper::waveform::Encoding;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "aom-shaper")]
#[command(about = "Waveform generator for an AOM pulse shaper", long_about = None)]
struct Cli {
    /// Configuration file (TOML format)
    #[arg(long, global = true, default_value = "config/shaper.toml")]
    config: PathBuf,

    /// Override the configured RF amplitude (0..=1)
    #[arg(long, global = true)]
    wave_amp: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print calibration and shaper settings
    Info {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Double-pulse delay scan with phase cycling
    DoublePulse {
        /// Largest delay in ps
        #[arg(long)]
        max_delay: f64,

        /// Delay step in ps
        #[arg(long)]
        step: f64,

        /// Rotating frame in cm⁻¹
        #[arg(long)]
        rot_frame: f64,

        /// Phase cycling steps per delay (1, 2 or 4)
        #[arg(long, default_value = "4")]
        frames: usize,

        /// Encoding law, overrides the configuration
        #[arg(long)]
        mode: Option<Encoding>,

        /// Output .rd16 file
        #[arg(long)]
        out: PathBuf,
    },

    /// Spectrometer calibration frames
    CalibPattern {
        /// Line width in pixels
        #[arg(long, default_value = "40")]
        width: f64,

        /// Pulse train spacing in pixels
        #[arg(long, default_value = "350")]
        separation: f64,

        /// Single line position in pixels
        #[arg(long, default_value = "6000")]
        single: f64,

        /// Output .rd16 file
        #[arg(long)]
        out: PathBuf,
    },

    /// Unit amplitude, zero phase masks
    Flat {
        /// Output .rd16 file
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ShaperConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(amp) = cli.wave_amp {
        config.shaper.wave_amp = amp;
    }
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let shaper = AomShaper::from_config(&config).context("Failed to build shaper")?;

    match cli.command {
        Commands::Info { json } => print_info(&shaper, json),
        Commands::DoublePulse {
            max_delay,
            step,
            rot_frame,
            frames,
            mode,
            out,
        } => {
            let params = DoublePulseParams::new(max_delay, step, rot_frame)
                .with_phase_frames(PhaseFrames::try_from(frames)?);
            let device = open_device(shaper, &config, out).await?;
            device
                .update(|shaper| {
                    if let Some(mode) = mode {
                        shaper.set_mode(mode);
                    }
                    let masks = shaper.double_pulse(&params)?;
                    shaper.set_masks(masks)
                })
                .await?;
            let samples = device.apply().await?;
            info!(
                delays = params.delays().len(),
                samples, "Double pulse waveform written"
            );
            Ok(())
        }
        Commands::CalibPattern {
            width,
            separation,
            single,
            out,
        } => {
            let pattern = CalibPattern {
                width,
                separation,
                single,
            };
            let device = open_device(shaper, &config, out).await?;
            device.load_calib_pattern(&pattern).await?;
            Ok(())
        }
        Commands::Flat { out } => {
            let device = open_device(shaper, &config, out).await?;
            device
                .update(|shaper| shaper.set_masks(MaskPair::flat()))
                .await?;
            device.apply().await?;
            Ok(())
        }
    }
}

async fn open_device(
    shaper: AomShaper,
    config: &ShaperConfig,
    out: PathBuf,
) -> Result<AomDevice<Rd16FileDac>> {
    let device = AomDevice::new(shaper, Arc::new(Rd16FileDac::new(out)));
    device.setup().await?;
    device.set_wave_amp(config.shaper.wave_amp).await?;
    Ok(device)
}

fn print_info(shaper: &AomShaper, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&shaper.state())?);
        return Ok(());
    }

    let state = shaper.state();
    println!("Pixels:   {}", state.pixels);
    println!("Mode:     {}", state.mode);
    println!(
        "Carrier:  {} MHz at {} MHz clock ({} samples/period)",
        state.rf.rf_freq_mhz,
        state.rf.dac_freq_mhz,
        state.rf.carrier_period()
    );
    match shaper.calibration() {
        Some(calib) => {
            let (lo, hi) = calib.frequency_range();
            let (wn_lo, wn_hi) = calib.wavenumber_range();
            let (wl_lo, wl_hi) = calib.wavelength_range();
            println!("Calib:    {:?}", calib.coefficients());
            println!("Span:     {:.3} .. {:.3} THz", lo, hi);
            println!("          {:.1} .. {:.1} cm-1", wn_lo, wn_hi);
            println!("          {:.1} .. {:.1} nm", wl_lo, wl_hi);
        }
        None => println!("Calib:    not set"),
    }
    Ok(())
}
