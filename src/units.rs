//! Spectroscopic unit conversions.
//!
//! The calibration works in optical frequency (THz). Users think in
//! wavenumbers (cm⁻¹) for the mid-IR and in vacuum wavelength (nm) elsewhere.

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Frequency in THz to wavenumber in cm⁻¹.
pub fn thz_to_cm(nu_thz: f64) -> f64 {
    nu_thz * 1e10 / SPEED_OF_LIGHT
}

/// Wavenumber in cm⁻¹ to frequency in THz.
pub fn cm_to_thz(wavenumber: f64) -> f64 {
    wavenumber * SPEED_OF_LIGHT / 1e10
}

/// Frequency in THz to vacuum wavelength in nm.
pub fn thz_to_nm(nu_thz: f64) -> f64 {
    SPEED_OF_LIGHT * 1e-3 / nu_thz
}

/// Vacuum wavelength in nm to frequency in THz.
pub fn nm_to_thz(wavelength_nm: f64) -> f64 {
    SPEED_OF_LIGHT * 1e-3 / wavelength_nm
}
