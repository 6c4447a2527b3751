//! Astrophysical models: blackbody, halo profiles, luminosity functions and
//! velocity distributions. All physical quantities are CGS unless noted.

use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_10, PI};

use crate::constants::{self, C, H, K_B, M_E, WIEN_B, WIEN_FREQUENCY_X};
use crate::error::{ModelError, Result};
use crate::model::ParametricModel;
use crate::params::ModelState;

/// Abscissa of a [`Blackbody`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectralUnit {
    /// Wavelength in cm, output per unit wavelength
    #[default]
    Wavelength,
    /// Frequency in Hz, output per unit frequency
    Frequency,
}

/// Planck specific intensity scaled by `A`, at temperature `T`
#[derive(Debug, Clone, PartialEq)]
pub struct Blackbody {
    state: ModelState,
    unit: SpectralUnit,
}

impl Default for Blackbody {
    fn default() -> Self {
        Self::with_unit(SpectralUnit::Wavelength)
    }
}

impl Blackbody {
    pub const NAME: &'static str = "blackbody";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(unit: SpectralUnit) -> Self {
        Self {
            state: ModelState::new(&["A", "T"], &[1.0, 5800.0]),
            unit,
        }
    }

    pub fn unit(&self) -> SpectralUnit {
        self.unit
    }

    pub fn set_unit(&mut self, unit: SpectralUnit) {
        self.unit = unit;
    }

    pub fn temperature(&self) -> f64 {
        self.state.value(1)
    }

    /// Peak location at the current temperature (Wien's law)
    pub fn peak_location(&self) -> f64 {
        let t = self.temperature();
        match self.unit {
            SpectralUnit::Wavelength => WIEN_B / t,
            SpectralUnit::Frequency => WIEN_FREQUENCY_X * K_B * t / H,
        }
    }

    /// Temperature whose spectrum peaks at `peak`
    pub fn temperature_for_peak(&self, peak: f64) -> f64 {
        match self.unit {
            SpectralUnit::Wavelength => WIEN_B / peak,
            SpectralUnit::Frequency => peak * H / (WIEN_FREQUENCY_X * K_B),
        }
    }

    /// `area·σT⁴`
    pub fn stefan_boltzmann_law(temperature: f64, area: f64) -> f64 {
        area * constants::stefan_boltzmann() * temperature.powi(4)
    }

    /// Output as specific intensity
    pub fn set_intensity(&mut self) {
        self.state.set_value(0, 1.0);
    }

    /// Output as the flux at `distance` from a sphere of `radius`
    pub fn set_flux(&mut self, radius: f64, distance: f64) {
        self.state.set_value(0, PI * (radius / distance).powi(2));
    }

    /// Radius of the sphere whose flux at `distance` this model gives
    pub fn flux_radius(&self, distance: f64) -> f64 {
        (self.state.value(0) * distance * distance / PI).sqrt()
    }

    /// Distance at which a sphere of `radius` gives this model's flux
    pub fn flux_distance(&self, radius: f64) -> f64 {
        (PI * radius * radius / self.state.value(0)).sqrt()
    }
}

impl ParametricModel for Blackbody {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        let (a, t) = (params[0], params[1]);
        match self.unit {
            SpectralUnit::Wavelength => {
                a * 2.0 * H * C * C * x.powi(-5) / ((H * C / (K_B * t * x)).exp() - 1.0)
            }
            SpectralUnit::Frequency => {
                a * 2.0 * H / (C * C) * x.powi(3) / ((H * x / (K_B * t)).exp() - 1.0)
            }
        }
    }

    fn range_hint(&self) -> (f64, f64) {
        let peak = self.peak_location();
        (peak / 3.0, peak * 3.0)
    }
}

/// Cosmology used by the NFW virial relations (Maller & Bullock 2004)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirialParams {
    pub z: f64,
    pub h: f64,
    pub omega0: f64,
}

impl Default for VirialParams {
    fn default() -> Self {
        Self {
            z: 0.0,
            h: 0.72,
            omega0: 1.0,
        }
    }
}

impl VirialParams {
    fn overdensity_ratio(&self) -> f64 {
        self.omega0 * Nfw::delta(self.z) / 97.2
    }
}

builtin_model!(
    /// Navarro, Frenk & White (1996) halo density `rho0·rc³/((r + rc)²·r)`.
    /// Virial relations take r in kpc and masses in solar masses.
    Nfw,
    "nfw",
    ["rho0" = 1.0, "rc" = 1.0]
);

impl Nfw {
    /// Virial overdensity
    pub fn delta(z: f64) -> f64 {
        360.0 / (1.0 + z)
    }

    pub fn rvir_to_mvir(rvir: f64, p: &VirialParams) -> f64 {
        1e12 / p.h * p.overdensity_ratio() * (rvir * (1.0 + p.z) * p.h / 203.4).powi(3)
    }

    pub fn mvir_to_rvir(mvir: f64, p: &VirialParams) -> f64 {
        203.4 / p.h * p.overdensity_ratio().powf(-1.0 / 3.0) * (mvir * p.h / 1e12).cbrt()
            / (1.0 + p.z)
    }

    /// Virial velocity in km/s
    pub fn mvir_to_vvir(mvir: f64, p: &VirialParams) -> f64 {
        143.8
            * p.overdensity_ratio().powf(1.0 / 6.0)
            * (mvir * p.h / 1e12).cbrt()
            * (1.0 + p.z).sqrt()
    }

    pub fn vvir_to_mvir(vvir: f64, p: &VirialParams) -> f64 {
        p.overdensity_ratio().powf(-0.5) * (1.0 + p.z).powf(-1.5) * 1e12 / p.h
            * (vvir / 143.8).powi(3)
    }

    /// Mass inside radius `r`, `4π·rho0·rc³·(ln(1 + x) − x/(1 + x))` with
    /// `x = r/rc`
    pub fn enclosed_mass(&self, r: f64) -> f64 {
        let (rho0, rc) = (self.state.value(0), self.state.value(1));
        let x = r / rc;
        4.0 * PI * rho0 * rc.powi(3) * ((1.0 + x).ln() - x / (1.0 + x))
    }

    /// Virial radius over scale radius
    pub fn concentration(&self, rvir: f64) -> f64 {
        rvir / self.state.value(1)
    }

    /// Set `rc` and `rho0` for concentration `c`, inferring whichever of the
    /// virial radius and mass is missing
    pub fn set_concentration(
        &mut self,
        c: f64,
        rvir: Option<f64>,
        mvir: Option<f64>,
        p: &VirialParams,
    ) -> Result<()> {
        let (rvir, mvir) = match (rvir, mvir) {
            (Some(r), Some(m)) => (r, m),
            (Some(r), None) => (r, Self::rvir_to_mvir(r, p)),
            (None, Some(m)) => (Self::mvir_to_rvir(m, p), m),
            (None, None) => {
                return Err(ModelError::InvalidValue {
                    what: "virial radius and mass",
                    value: f64::NAN,
                    expected: "at least one of them",
                })
            }
        };
        if c <= 0.0 || !c.is_finite() {
            return Err(ModelError::InvalidValue {
                what: "concentration",
                value: c,
                expected: "positive and finite",
            });
        }
        self.state.set_value(1, rvir / c);
        self.state.set_value(0, 1.0);
        let unit_mass = self.enclosed_mass(rvir);
        self.state.set_value(0, mvir / unit_mass);
        Ok(())
    }
}

impl ParametricModel for Nfw {
    model_state!();

    fn eval_with(&self, r: f64, params: &[f64]) -> f64 {
        let (rho0, rc) = (params[0], params[1]);
        rho0 * rc.powi(3) / ((r + rc).powi(2) * r)
    }

    /// Closed form of `4π∫r²ρ`
    fn integrate_spherical(&self, lower: f64, upper: f64) -> Result<f64> {
        if lower < 0.0 {
            return Err(ModelError::InvalidValue {
                what: "lower radius",
                value: lower,
                expected: "non-negative",
            });
        }
        Ok(self.enclosed_mass(upper) - self.enclosed_mass(lower))
    }

    fn range_hint(&self) -> (f64, f64) {
        (0.0, 10.0 * self.state.value(1))
    }
}

builtin_model!(
    /// Schechter luminosity function in absolute magnitudes
    SchechterMag,
    "schechtermag",
    ["Mstar" = -20.2, "alpha" = -1.0, "phistar" = 1.0857362047581294]
);

impl ParametricModel for SchechterMag {
    model_state!();

    fn eval_with(&self, m: f64, params: &[f64]) -> f64 {
        let (mstar, alpha, phistar) = (params[0], params[1], params[2]);
        let x = 10f64.powf(0.4 * (mstar - m));
        0.4 * LN_10 * phistar * x.powf(1.0 + alpha) * (-x).exp()
    }

    fn range_hint(&self) -> (f64, f64) {
        let mstar = self.state.value(0);
        (mstar - 3.0, mstar + 3.0)
    }
}

builtin_model!(
    /// Schechter luminosity function in luminosity
    SchechterLum,
    "schechterlum",
    ["Lstar" = 1e10, "alpha" = -1.0, "phistar" = 1.0]
);

impl ParametricModel for SchechterLum {
    model_state!();

    fn eval_with(&self, l: f64, params: &[f64]) -> f64 {
        let (lstar, alpha, phistar) = (params[0], params[1], params[2]);
        let x = l / lstar;
        phistar * x.powf(alpha) * (-x).exp() / lstar
    }

    fn range_hint(&self) -> (f64, f64) {
        let lstar = self.state.value(0);
        (lstar / 3.0, lstar * 3.0)
    }
}

fn thermal_range(t: f64, m: f64) -> (f64, f64) {
    (0.0, (3.0 * (2.0 * K_B * t / m).sqrt()).min(C))
}

builtin_model!(
    /// Maxwell-Boltzmann distribution of one velocity component, for
    /// particles of mass `m` (default: electron) at temperature `T`
    MaxwellBoltzmann,
    "maxwellboltzmann",
    ["T" = 273.0, "m" = M_E]
);

impl ParametricModel for MaxwellBoltzmann {
    model_state!();

    fn eval_with(&self, v: f64, params: &[f64]) -> f64 {
        let (t, m) = (params[0], params[1]);
        (m / (2.0 * PI * K_B * t)).sqrt() * (-m * v * v / (2.0 * K_B * t)).exp()
    }

    fn range_hint(&self) -> (f64, f64) {
        thermal_range(self.state.value(0), self.state.value(1))
    }
}

builtin_model!(
    /// Maxwell-Boltzmann distribution of speeds
    MaxwellBoltzmannSpeed,
    "maxwellboltzmannspeed",
    ["T" = 273.0, "m" = M_E]
);

impl ParametricModel for MaxwellBoltzmannSpeed {
    model_state!();

    fn eval_with(&self, v: f64, params: &[f64]) -> f64 {
        let (t, m) = (params[0], params[1]);
        4.0 * PI
            * v
            * v
            * (m / (2.0 * PI * K_B * t)).powf(1.5)
            * (-m * v * v / (2.0 * K_B * t)).exp()
    }

    fn range_hint(&self) -> (f64, f64) {
        thermal_range(self.state.value(0), self.state.value(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerics::{AdaptiveSimpson, Integrator};
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_blackbody_wien_peak() {
        let bb = Blackbody::new();
        let peak = bb.peak_location();
        assert_relative_eq!(peak, 0.28977685 / 5800.0, epsilon = 1e-15);
        let h = peak * 1e-3;
        assert!(bb.evaluate(peak) > bb.evaluate(peak - h));
        assert!(bb.evaluate(peak) > bb.evaluate(peak + h));
        assert_relative_eq!(bb.temperature_for_peak(peak), 5800.0, epsilon = 1e-9);
    }

    #[test]
    fn test_blackbody_frequency_peak() {
        let bb = Blackbody::with_unit(SpectralUnit::Frequency);
        let peak = bb.peak_location();
        let h = peak * 1e-3;
        assert!(bb.evaluate(peak) > bb.evaluate(peak - h));
        assert!(bb.evaluate(peak) > bb.evaluate(peak + h));
    }

    #[test]
    fn test_blackbody_integrates_to_stefan_boltzmann() {
        let bb = Blackbody::new();
        let peak = bb.peak_location();
        let total = bb.integrate(peak / 20.0, peak * 50.0).unwrap();
        let expected = Blackbody::stefan_boltzmann_law(5800.0, 1.0) / PI;
        assert_relative_eq!(total, expected, max_relative = 1e-3);
    }

    #[test]
    fn test_blackbody_flux_geometry() {
        let mut bb = Blackbody::new();
        bb.set_flux(2.0, 10.0);
        assert_relative_eq!(bb.flux_radius(10.0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(bb.flux_distance(2.0), 10.0, epsilon = 1e-12);
        bb.set_intensity();
        assert_eq!(bb.values()[0], 1.0);
    }

    #[test]
    fn test_nfw_spherical_integral_matches_numeric() {
        let mut nfw = Nfw::new();
        nfw.set_values(&[2.0, 1.5]).unwrap();
        let analytic = nfw.integrate_spherical(0.5, 4.0).unwrap();
        let shell = AdaptiveSimpson::default()
            .integrate(&|r: f64| r * r * nfw.evaluate(r), 0.5, 4.0)
            .unwrap();
        assert_relative_eq!(analytic, 4.0 * PI * shell, max_relative = 1e-8);
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    fn test_nfw_virial_round_trips(#[case] z: f64) {
        let p = VirialParams {
            z,
            ..VirialParams::default()
        };
        let m = 1e12;
        let r = Nfw::mvir_to_rvir(m, &p);
        assert_relative_eq!(Nfw::rvir_to_mvir(r, &p), m, max_relative = 1e-10);
        let v = Nfw::mvir_to_vvir(m, &p);
        assert_relative_eq!(Nfw::vvir_to_mvir(v, &p), m, max_relative = 1e-10);
    }

    #[test]
    fn test_nfw_set_concentration() {
        let mut nfw = Nfw::new();
        let p = VirialParams::default();
        nfw.set_concentration(10.0, Some(200.0), Some(1e12), &p).unwrap();
        assert_relative_eq!(nfw.get("rc").unwrap(), 20.0);
        assert_relative_eq!(nfw.enclosed_mass(200.0), 1e12, max_relative = 1e-12);
        assert_relative_eq!(nfw.concentration(200.0), 10.0);
        assert!(nfw.set_concentration(10.0, None, None, &p).is_err());
    }

    #[test]
    fn test_schechter_mag_rises_toward_faint_end() {
        let s = SchechterMag::new();
        // alpha = -1: x^0·e^-x is monotone in x, so brighter (smaller M) is rarer
        assert!(s.evaluate(-22.0) < s.evaluate(-20.2));
        assert!(s.evaluate(-20.2) < s.evaluate(-18.0));
    }

    #[test]
    fn test_schechter_lum_at_lstar() {
        let s = SchechterLum::new();
        assert_relative_eq!(s.evaluate(1e10), (-1f64).exp() / 1e10, max_relative = 1e-12);
    }

    #[test]
    fn test_maxwell_boltzmann_normalized() {
        let speed = MaxwellBoltzmannSpeed::new();
        let (_, hi) = speed.range_hint();
        let total = speed.integrate(0.0, 3.0 * hi).unwrap();
        assert_relative_eq!(total, 1.0, max_relative = 1e-6);

        let component = MaxwellBoltzmann::new();
        let half = component.integrate(0.0, 3.0 * hi).unwrap();
        assert_relative_eq!(half, 0.5, max_relative = 1e-6);
    }
}
