//! Photometric conversions
//!
//! Magnitudes, distance moduli (non-cosmological), luminosities in solar
//! units, surface brightness, the Jester et al. (2005) UBVRI ↔ ugriz
//! transforms for stars, and Gaussian band responses.

use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_2, PI};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};
use crate::model::ParametricModel;
use crate::numerics::{AdaptiveSimpson, Integrator};

/// `2.5/ln 10`, the magnitude error per unit fractional flux error
pub const POGSON: f64 = 1.085_736_204_758_129_4;

/// `5·log10(d) − 5` with `d` in parsecs
pub fn distance_modulus(distance_pc: f64) -> f64 {
    5.0 * distance_pc.log10() - 5.0
}

/// Distance in parsecs for a distance modulus
pub fn distance_from_modulus(modulus: f64) -> f64 {
    10f64.powf(1.0 + modulus / 5.0)
}

pub fn absolute_magnitude(apparent: f64, distance_pc: f64) -> f64 {
    apparent - distance_modulus(distance_pc)
}

pub fn apparent_magnitude(absolute: f64, distance_pc: f64) -> f64 {
    absolute + distance_modulus(distance_pc)
}

/// Photometric bands with known solar absolute magnitudes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    U,
    B,
    V,
    R,
    I,
    J,
    H,
    K,
    SloanU,
    SloanG,
    SloanR,
    SloanI,
    SloanZ,
}

impl Band {
    /// Absolute magnitude of the Sun in this band
    pub fn solar_magnitude(self) -> f64 {
        match self {
            Band::U => 5.61,
            Band::B => 5.48,
            Band::V => 4.83,
            Band::R => 4.42,
            Band::I => 4.08,
            Band::J => 3.64,
            Band::H => 3.32,
            Band::K => 3.28,
            Band::SloanU => 6.75,
            Band::SloanG => 5.33,
            Band::SloanR => 4.67,
            Band::SloanI => 4.48,
            Band::SloanZ => 4.42,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Band::U => "U",
            Band::B => "B",
            Band::V => "V",
            Band::R => "R",
            Band::I => "I",
            Band::J => "J",
            Band::H => "H",
            Band::K => "K",
            Band::SloanU => "u",
            Band::SloanG => "g",
            Band::SloanR => "r",
            Band::SloanI => "i",
            Band::SloanZ => "z",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Case matters: `U` is Johnson, `u` is Sloan
impl FromStr for Band {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "U" => Band::U,
            "B" => Band::B,
            "V" => Band::V,
            "R" => Band::R,
            "I" => Band::I,
            "J" => Band::J,
            "H" => Band::H,
            "K" => Band::K,
            "u" => Band::SloanU,
            "g" => Band::SloanG,
            "r" => Band::SloanR,
            "i" => Band::SloanI,
            "z" => Band::SloanZ,
            other => return Err(ModelError::UnknownBand(other.to_string())),
        })
    }
}

/// Luminosity for magnitude `mag`, given that `zero_point_mag` corresponds
/// to luminosity `zero_point_lum`
pub fn mag_to_lum(mag: f64, zero_point_mag: f64, zero_point_lum: f64) -> f64 {
    10f64.powf((zero_point_mag - mag) / 2.5) * zero_point_lum
}

/// [`mag_to_lum`] with the propagated error
pub fn mag_to_lum_err(
    mag: f64,
    mag_err: f64,
    zero_point_mag: f64,
    zero_point_lum: f64,
) -> (f64, f64) {
    let lum = mag_to_lum(mag, zero_point_mag, zero_point_lum);
    (lum, mag_err * lum / POGSON)
}

pub fn lum_to_mag(lum: f64, zero_point_mag: f64, zero_point_lum: f64) -> f64 {
    zero_point_mag - 2.5 * (lum / zero_point_lum).log10()
}

/// [`lum_to_mag`] with the propagated error
pub fn lum_to_mag_err(
    lum: f64,
    lum_err: f64,
    zero_point_mag: f64,
    zero_point_lum: f64,
) -> (f64, f64) {
    (
        lum_to_mag(lum, zero_point_mag, zero_point_lum),
        POGSON * lum_err / lum,
    )
}

/// Absolute magnitude to luminosity in solar units
pub fn solar_luminosity(mag: f64, band: Band) -> f64 {
    mag_to_lum(mag, band.solar_magnitude(), 1.0)
}

/// Luminosity in solar units to absolute magnitude
pub fn solar_magnitude(lum: f64, band: Band) -> f64 {
    lum_to_mag(lum, band.solar_magnitude(), 1.0)
}

/// Mean surface brightness of magnitude `mag` spread over `area`
pub fn area_to_surface_brightness(mag: f64, area: f64) -> f64 {
    mag + 2.5 * area.log10()
}

/// Mean surface brightness inside the half-light radius
pub fn half_light_to_surface_brightness(mag: f64, half_light_radius: f64) -> f64 {
    area_to_surface_brightness(mag + 2.5 * 2f64.log10(), PI * half_light_radius.powi(2))
}

/// Whether a surface brightness is in magnitudes or linear flux
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrightnessUnit {
    Magnitude,
    Flux,
}

/// Undo the `(1 + z)⁴` cosmological surface-brightness dimming
pub fn cosmological_dimming(surface_brightness: f64, z: f64, unit: BrightnessUnit) -> f64 {
    match unit {
        BrightnessUnit::Magnitude => surface_brightness - 10.0 * (1.0 + z).log10(),
        BrightnessUnit::Flux => surface_brightness * (1.0 + z).powi(4),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ubvri {
    pub u: f64,
    pub b: f64,
    pub v: f64,
    pub r: f64,
    pub i: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ugriz {
    pub u: f64,
    pub g: f64,
    pub r: f64,
    pub i: f64,
    pub z: f64,
}

/// Johnson-Cousins to Sloan, Jester et al. (2005) stellar fits
pub fn ubvri_to_ugriz(m: &Ubvri) -> Ugriz {
    let g = m.v + 0.60 * (m.b - m.v) - 0.12;
    let r = m.v - 0.42 * (m.b - m.v) + 0.11;
    let u = g + 1.28 * (m.u - m.b) + 1.13;
    let i = r - (0.91 * (m.r - m.i) - 0.20);
    let z = r - (1.72 * (m.r - m.i) - 0.41);
    Ugriz { u, g, r, i, z }
}

/// Sloan to Johnson-Cousins, Jester et al. (2005) stellar fits
pub fn ugriz_to_ubvri(m: &Ugriz) -> Ubvri {
    let b = m.g + 0.39 * (m.g - m.r) + 0.21;
    let v = m.g - 0.59 * (m.g - m.r) - 0.01;
    let u = b + 0.78 * (m.u - m.g) - 0.88;
    let r = v - (1.09 * (m.r - m.i) + 0.22);
    let i = r - (1.00 * (m.r - m.i) + 0.21);
    Ubvri { u, b, v, r, i }
}

/// Signal-to-noise of a source over a background for Poisson counts
///
/// `exposure` times `area` times each rate gives counts.
pub fn poisson_significance(
    exposure: f64,
    area: f64,
    source_rate: f64,
    noise_rate: f64,
) -> f64 {
    let ta = exposure * area;
    ta * source_rate / (ta * (source_rate + noise_rate)).sqrt()
}

/// Band with a Gaussian response curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianBand {
    pub center: f64,
    pub sigma: f64,
}

impl GaussianBand {
    /// A positive `width` is the standard deviation; a negative one is the
    /// full width at half maximum
    pub fn new(center: f64, width: f64) -> Result<Self> {
        let sigma = if width > 0.0 {
            width
        } else {
            -width / (8.0 * LN_2).sqrt()
        };
        if !(sigma > 0.0 && sigma.is_finite()) || !center.is_finite() {
            return Err(ModelError::InvalidValue {
                what: "band width",
                value: width,
                expected: "non-zero and finite",
            });
        }
        Ok(Self { center, sigma })
    }

    pub fn fwhm(&self) -> f64 {
        self.sigma * (8.0 * LN_2).sqrt()
    }

    /// Response at `x`, 1 at the center
    pub fn response(&self, x: f64) -> f64 {
        (-(x - self.center).powi(2) / (2.0 * self.sigma * self.sigma)).exp()
    }

    /// `n` points spanning `center ± sigmas·sigma`, with their responses
    pub fn samples(&self, n: usize, sigmas: f64) -> (Vec<f64>, Vec<f64>) {
        let (low, high) = self.bounds(sigmas);
        let x: Vec<f64> = match n {
            0 => Vec::new(),
            1 => vec![self.center],
            _ => (0..n)
                .map(|i| low + (high - low) * i as f64 / (n - 1) as f64)
                .collect(),
        };
        let r = x.iter().map(|&v| self.response(v)).collect();
        (x, r)
    }

    fn bounds(&self, sigmas: f64) -> (f64, f64) {
        (
            self.center - sigmas * self.sigma,
            self.center + sigmas * self.sigma,
        )
    }

    /// Response-weighted mean of `model` over the band
    pub fn convolve(&self, model: &dyn ParametricModel) -> Result<f64> {
        self.convolve_with(&AdaptiveSimpson::default(), model)
    }

    pub fn convolve_with(
        &self,
        integrator: &dyn Integrator,
        model: &dyn ParametricModel,
    ) -> Result<f64> {
        let (low, high) = self.bounds(6.0);
        let weighted =
            integrator.integrate(&|x: f64| self.response(x) * model.evaluate(x), low, high)?;
        let norm = integrator.integrate(&|x: f64| self.response(x), low, high)?;
        Ok(weighted / norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{Constant, Linear};
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(10.0, 0.0)]
    #[case(100.0, 5.0)]
    #[case(1e6, 25.0)]
    fn test_distance_modulus(#[case] d: f64, #[case] dm: f64) {
        assert_relative_eq!(distance_modulus(d), dm, epsilon = 1e-12);
        assert_relative_eq!(distance_from_modulus(dm), d, max_relative = 1e-12);
    }

    #[test]
    fn test_absolute_apparent() {
        let abs = absolute_magnitude(15.0, 1000.0);
        assert_relative_eq!(abs, 5.0, epsilon = 1e-12);
        assert_relative_eq!(apparent_magnitude(abs, 1000.0), 15.0, epsilon = 1e-12);
    }

    #[test]
    fn test_band_parsing_is_case_sensitive() {
        assert_eq!("V".parse::<Band>().unwrap(), Band::V);
        assert_eq!("r".parse::<Band>().unwrap(), Band::SloanR);
        assert_eq!(Band::SloanR.to_string(), "r");
        assert!(matches!("Q".parse::<Band>(), Err(ModelError::UnknownBand(b)) if b == "Q"));
    }

    #[test]
    fn test_sun_is_one_solar_luminosity() {
        assert_relative_eq!(solar_luminosity(4.83, Band::V), 1.0, epsilon = 1e-12);
        assert_relative_eq!(solar_luminosity(-0.17, Band::V), 100.0, max_relative = 1e-12);
        assert_relative_eq!(solar_magnitude(100.0, Band::V), -0.17, epsilon = 1e-12);
    }

    #[test]
    fn test_error_propagation() {
        let (lum, lum_err) = mag_to_lum_err(4.83, 0.1, 4.83, 1.0);
        assert_relative_eq!(lum_err, 0.1 / POGSON);
        let (mag, mag_err) = lum_to_mag_err(lum, lum_err, 4.83, 1.0);
        assert_relative_eq!(mag, 4.83, epsilon = 1e-12);
        assert_relative_eq!(mag_err, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_surface_brightness() {
        assert_relative_eq!(area_to_surface_brightness(20.0, 100.0), 25.0);
        let sb = half_light_to_surface_brightness(20.0, 1.0);
        assert_relative_eq!(sb, 20.0 + 2.5 * (2.0 * PI).log10(), epsilon = 1e-12);
        assert_relative_eq!(
            cosmological_dimming(20.0, 1.0, BrightnessUnit::Magnitude),
            20.0 - 10.0 * 2f64.log10()
        );
        assert_relative_eq!(cosmological_dimming(1.0, 1.0, BrightnessUnit::Flux), 16.0);
    }

    #[test]
    fn test_jester_transforms_roughly_invert() {
        let johnson = Ubvri {
            u: 10.5,
            b: 10.3,
            v: 9.8,
            r: 9.5,
            i: 9.2,
        };
        let back = ugriz_to_ubvri(&ubvri_to_ugriz(&johnson));
        for (a, b) in [
            (back.u, johnson.u),
            (back.b, johnson.b),
            (back.v, johnson.v),
            (back.r, johnson.r),
            (back.i, johnson.i),
        ] {
            assert!((a - b).abs() < 0.1, "{a} vs {b}");
        }
    }

    #[test]
    fn test_poisson_significance() {
        assert_relative_eq!(poisson_significance(100.0, 1.0, 1.0, 0.0), 10.0);
        assert!(poisson_significance(100.0, 1.0, 1.0, 3.0) < 10.0);
    }

    #[test]
    fn test_gaussian_band_fwhm_width() {
        let band = GaussianBand::new(5000.0, -100.0).unwrap();
        assert_relative_eq!(band.fwhm(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(band.response(5050.0), 0.5, epsilon = 1e-12);
        let (x, r) = band.samples(101, 6.0);
        assert_eq!(x.len(), 101);
        assert_relative_eq!(r[50], 1.0);
        assert!(GaussianBand::new(5000.0, 0.0).is_err());
    }

    #[test]
    fn test_band_convolution() {
        let band = GaussianBand::new(2.0, 0.5).unwrap();
        let mut constant = Constant::new();
        constant.set("C", 3.0).unwrap();
        assert_relative_eq!(band.convolve(&constant).unwrap(), 3.0, max_relative = 1e-8);

        let mut line = Linear::new();
        line.set_values(&[2.0, 1.0]).unwrap();
        // symmetric response: the mean of a line is its value at the center
        assert_relative_eq!(band.convolve(&line).unwrap(), 5.0, max_relative = 1e-8);
    }
}
