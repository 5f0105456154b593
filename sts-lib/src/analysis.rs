//! Calculations on spectra and calibration data read from the device.
//!
//! Functions taking several per-pixel slices pair them element by element and
//! return as many values as the shortest slice holds.

use std::f64::consts::PI;

/// Core diameter in cm of the fiber usually fitted to the STS.
pub const DEFAULT_FIBER_CORE_CM: f64 = 0.04;

/// Evaluates `c0 + c1*x + c2*x^2 + ...`.
pub fn evaluate_polynomial(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Wavelength of each pixel from the wavelength calibration coefficients.
pub fn wavelengths(coeffs: &[f64], pixels: usize) -> Vec<f64> {
    (0..pixels).map(|p| evaluate_polynomial(coeffs, p as f64)).collect()
}

/// Width in nm covered by each pixel.
///
/// Interior pixels use half the distance between their neighbours, the two
/// end pixels the distance to their only neighbour.
pub fn bin_widths(wavelengths: &[f64]) -> Vec<f64> {
    let n = wavelengths.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mut widths = Vec::with_capacity(n);
    widths.push(wavelengths[1] - wavelengths[0]);
    widths.extend(wavelengths.windows(3).map(|w| (w[2] - w[0]) / 2.0));
    widths.push(wavelengths[n - 1] - wavelengths[n - 2]);
    widths
}

/// Subtracts the dark spectrum scaled by the integration time and divides by
/// the non-linearity polynomial evaluated at the result.
pub fn correct_nonlinearity(counts: &[f64], coeffs: &[f64], dark: &[f64], integration_s: f64) -> Vec<f64> {
    counts
        .iter()
        .zip(dark)
        .map(|(&c, &d)| {
            let step = c - d * integration_s;
            step / evaluate_polynomial(coeffs, step)
        })
        .collect()
}

/// Collection area in cm² of a fiber with the given core diameter.
pub fn fiber_collection_area(core_diameter_cm: f64) -> f64 {
    PI * (core_diameter_cm / 2.0).powi(2)
}

/// Per-pixel factor converting counts to irradiance.
pub fn irradiance_multiplier(
    calibration: &[f64],
    integration_s: f64,
    collection_area_cm2: f64,
    bin_widths: &[f64],
) -> Vec<f64> {
    calibration
        .iter()
        .zip(bin_widths)
        .map(|(&cal, &width)| cal / integration_s / collection_area_cm2 / width)
        .collect()
}
