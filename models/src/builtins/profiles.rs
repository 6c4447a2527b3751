//! Peaked and radial profiles

use std::f64::consts::PI;

use crate::error::{ModelError, Result};
use crate::model::{FitOptions, ParametricModel};
use crate::numerics::{AdaptiveSimpson, Integrator};

builtin_model!(
    /// Normalized Gaussian `A·exp(−(x − mu)²/2sig²)/(√(2π)·sig)`
    Gaussian,
    "gaussian",
    ["A" = 1.0, "sig" = 1.0, "mu" = 0.0]
);

impl Gaussian {
    pub fn profile(x: f64, a: f64, sig: f64, mu: f64) -> f64 {
        let t = (x - mu) / (std::f64::consts::SQRT_2 * sig);
        a * (-t * t).exp() / ((2.0 * PI).sqrt() * sig)
    }

    pub fn peak(&self) -> f64 {
        self.evaluate(self.state.value(2))
    }

    /// Scale `A` so the value at `mu` is `value`
    pub fn set_peak(&mut self, value: f64) -> Result<()> {
        let sig = self.state.value(1);
        if sig == 0.0 || !sig.is_finite() {
            return Err(ModelError::InvalidValue {
                what: "sig",
                value: sig,
                expected: "finite and nonzero",
            });
        }
        self.state.set_value(0, value * (2.0 * PI).sqrt() * sig);
        Ok(())
    }

    pub fn fwhm(&self) -> f64 {
        2.0 * (2.0 * 2f64.ln()).sqrt() * self.state.value(1).abs()
    }
}

impl ParametricModel for Gaussian {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        Gaussian::profile(x, params[0], params[1], params[2])
    }

    fn derivative(&self, x: f64) -> f64 {
        let (sig, mu) = (self.state.value(1), self.state.value(2));
        -(x - mu) / (sig * sig) * self.evaluate(x)
    }

    fn range_hint(&self) -> (f64, f64) {
        let (sig, mu) = (self.state.value(1).abs(), self.state.value(2));
        (mu - 4.0 * sig, mu + 4.0 * sig)
    }
}

/// One of the two [`DoubleGaussian`] components: `A` is positive, `B` negative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    A,
    B,
}

builtin_model!(
    /// Sum of a positive Gaussian (`A`, `sig1`, `mu1`) and a negative one
    /// (`B`, `sig2`, `mu2`). The signs are forced: `|A|` and `−|B|` are used
    /// whatever the stored values.
    DoubleGaussian,
    "doublegaussian",
    [
        "A" = 1.0,
        "B" = 1.0,
        "sig1" = 1.0,
        "sig2" = 1.0,
        "mu1" = -0.5,
        "mu2" = 0.5,
    ]
);

impl DoubleGaussian {
    /// Fit a double Gaussian where one component sits on top of the other
    ///
    /// A single Gaussian fit seeds both centres and the `taller` component;
    /// the other starts at half the amplitude and half or twice the width
    /// depending on `wider`. The taller component is held while the other
    /// settles, then everything is fit together.
    pub fn auto_dual(
        x: &[f64],
        y: &[f64],
        taller: Component,
        wider: Component,
        options: &FitOptions,
    ) -> Result<Self> {
        let mut single = Gaussian::new();
        single.fit(x, y, options)?;
        let (ga, gsig, gmu) = (
            single.state.value(0),
            single.state.value(1),
            single.state.value(2),
        );
        let other_sig = if wider == taller { gsig / 2.0 } else { gsig * 2.0 };

        let mut dual = DoubleGaussian::new();
        dual.set("mu1", gmu)?;
        dual.set("mu2", gmu)?;
        let held = match taller {
            Component::A => {
                dual.set("A", ga)?;
                dual.set("B", ga / 2.0)?;
                dual.set("sig1", gsig)?;
                dual.set("sig2", other_sig)?;
                ["mu1", "A", "sig1"]
            }
            Component::B => {
                dual.set("B", ga)?;
                dual.set("A", ga / 2.0)?;
                dual.set("sig2", gsig)?;
                dual.set("sig1", other_sig)?;
                ["mu2", "B", "sig2"]
            }
        };

        let mut staged = options.clone();
        for name in held {
            staged = staged.fix(name);
        }
        dual.fit(x, y, &staged)?;
        dual.fit(x, y, options)?;
        Ok(dual)
    }
}

impl ParametricModel for DoubleGaussian {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        let (a, b) = (params[0].abs(), -params[1].abs());
        let (sig1, sig2, mu1, mu2) = (params[2], params[3], params[4], params[5]);
        Gaussian::profile(x, a, sig1, mu1) + Gaussian::profile(x, b, sig2, mu2)
    }

    fn range_hint(&self) -> (f64, f64) {
        let v = self.state.values();
        let (sig1, sig2, mu1, mu2) = (v[2].abs(), v[3].abs(), v[4], v[5]);
        (
            (mu1 - 4.0 * sig1).min(mu2 - 4.0 * sig2),
            (mu1 + 4.0 * sig1).max(mu2 + 4.0 * sig2),
        )
    }
}

builtin_model!(
    /// Normalized Lorentzian `A·gamma/π/((x − mu)² + gamma²)`
    Lorentzian,
    "lorentzian",
    ["A" = 1.0, "gamma" = 1.0, "mu" = 0.0]
);

impl Lorentzian {
    pub fn profile(x: f64, a: f64, gamma: f64, mu: f64) -> f64 {
        let dx = x - mu;
        a * gamma / PI / (dx * dx + gamma * gamma)
    }

    pub fn peak(&self) -> f64 {
        self.evaluate(self.state.value(2))
    }

    /// Scale `A` so the value at `mu` is `value`
    pub fn set_peak(&mut self, value: f64) -> Result<()> {
        let gamma = self.state.value(1);
        if gamma == 0.0 || !gamma.is_finite() {
            return Err(ModelError::InvalidValue {
                what: "gamma",
                value: gamma,
                expected: "finite and nonzero",
            });
        }
        self.state.set_value(0, value * PI * gamma);
        Ok(())
    }
}

impl ParametricModel for Lorentzian {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        Lorentzian::profile(x, params[0], params[1], params[2])
    }

    fn range_hint(&self) -> (f64, f64) {
        let (gamma, mu) = (self.state.value(1).abs(), self.state.value(2));
        (mu - 6.0 * gamma, mu + 6.0 * gamma)
    }
}

builtin_model!(
    /// Voigt profile: a unit-area Gaussian of width `sig` convolved with a
    /// Lorentzian of area `A`, half-width `gamma` and centre `mu`
    ///
    /// The convolution is integrated numerically over ±8 `sig`. With
    /// `sig = 0` the profile is the Lorentzian, with `gamma = 0` the
    /// Gaussian.
    Voigt,
    "voigt",
    ["A" = 1.0, "sig" = 0.5, "gamma" = 0.5, "mu" = 0.0]
);

impl Voigt {
    const KERNEL_HALF_WIDTH: f64 = 8.0;

    pub fn profile(x: f64, a: f64, sig: f64, gamma: f64, mu: f64) -> f64 {
        if sig == 0.0 {
            return Lorentzian::profile(x, a, gamma, mu);
        }
        if gamma == 0.0 {
            return Gaussian::profile(x, a, sig, mu);
        }
        let sig = sig.abs();
        let kernel = |t: f64| Gaussian::profile(t, 1.0, sig, 0.0) * Lorentzian::profile(x - t, a, gamma, mu);
        let half = Self::KERNEL_HALF_WIDTH * sig;
        // Centre the quadrature on the Lorentzian peak when it falls inside
        // the kernel so the adaptive split starts there
        let split = (x - mu).clamp(-half, half);
        let quad = AdaptiveSimpson {
            tolerance: 1e-12,
            ..AdaptiveSimpson::default()
        };
        let lower = quad.integrate(&kernel, -half, split);
        let upper = quad.integrate(&kernel, split, half);
        match (lower, upper) {
            (Ok(l), Ok(u)) => l + u,
            _ => f64::NAN,
        }
    }

    pub fn peak(&self) -> f64 {
        self.evaluate(self.state.value(3))
    }
}

impl ParametricModel for Voigt {
    model_state!();

    fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
        Voigt::profile(x, params[0], params[1], params[2], params[3])
    }

    fn range_hint(&self) -> (f64, f64) {
        let v = self.state.values();
        let half = 3.0 * (v[2].abs() + v[1].abs());
        (v[3] - half, v[3] + half)
    }
}

builtin_model!(
    /// Moffat `A·(beta − 1)/(π·alpha²)·(1 + (r/alpha)²)^−beta`
    Moffat,
    "moffat",
    ["A" = 1.0, "alpha" = 1.0, "beta" = 4.765]
);

impl ParametricModel for Moffat {
    model_state!();

    fn eval_with(&self, r: f64, params: &[f64]) -> f64 {
        let (a, alpha, beta) = (params[0], params[1], params[2]);
        let roa = r / alpha;
        a * (beta - 1.0) / (PI * alpha * alpha) * (1.0 + roa * roa).powf(-beta)
    }

    fn range_hint(&self) -> (f64, f64) {
        let alpha = self.state.value(1).abs();
        (-alpha, alpha)
    }
}

builtin_model!(
    /// Plummer sphere density `3M/(4π·rp³)·(1 + (r/rp)²)^−5/2`
    Plummer,
    "plummer",
    ["rp" = 1.0, "M" = 1.0]
);

impl ParametricModel for Plummer {
    model_state!();

    fn eval_with(&self, r: f64, params: &[f64]) -> f64 {
        let (rp, m) = (params[0], params[1]);
        3.0 * m / (4.0 * PI * rp.powi(3)) * (1.0 + (r / rp).powi(2)).powf(-2.5)
    }

    fn range_hint(&self) -> (f64, f64) {
        (0.0, 2.0 * self.state.value(0))
    }
}

builtin_model!(
    /// Projected King profile with core radius `rc` and tidal radius `rt`;
    /// zero at and beyond `rt`
    King2D,
    "king2d",
    ["rc" = 1.0, "rt" = 2.0, "A" = 1.0]
);

impl ParametricModel for King2D {
    model_state!();

    fn eval_with(&self, r: f64, params: &[f64]) -> f64 {
        let (rc, rt, a) = (params[0], params[1], params[2]);
        if r.abs() >= rt {
            return 0.0;
        }
        let rcsq = rc * rc;
        let term = (r * r + rcsq).powf(-0.5) - (rt * rt + rcsq).powf(-0.5);
        a * rcsq * term * term
    }

    fn range_hint(&self) -> (f64, f64) {
        (0.0, self.state.value(1))
    }
}

builtin_model!(
    /// Spatial density of the King model; zero at and beyond `rt`
    King3D,
    "king3d",
    ["rc" = 1.0, "rt" = 2.0, "A" = 1.0]
);

impl ParametricModel for King3D {
    model_state!();

    fn eval_with(&self, r: f64, params: &[f64]) -> f64 {
        let (rc, rt, a) = (params[0], params[1], params[2]);
        let rcsq = rc * rc;
        let z = ((r * r + rcsq) / (rt * rt + rcsq)).sqrt();
        if z >= 1.0 {
            return 0.0;
        }
        let shape = z.acos() / z - (1.0 - z * z).sqrt();
        a / (z * z) / PI / rc * (1.0 + rt * rt / rcsq).powf(-1.5) * shape
    }

    fn range_hint(&self) -> (f64, f64) {
        (0.0, self.state.value(1))
    }
}

builtin_model!(
    /// Einasto density `A·exp(−(r/rs)^alpha)`
    Einasto,
    "einasto",
    ["A" = 1.0, "rs" = 1.0, "alpha" = 0.2]
);

impl ParametricModel for Einasto {
    model_state!();

    fn eval_with(&self, r: f64, params: &[f64]) -> f64 {
        let (a, rs, alpha) = (params[0], params[1], params[2]);
        a * (-(r / rs).powf(alpha)).exp()
    }
}

builtin_model!(
    /// Sersic surface brightness `Ae·exp(−b_n·((r/re)^(1/n) − 1))`, with `Ae`
    /// the value at the effective radius
    Sersic,
    "sersic",
    ["Ae" = 1.0, "re" = 1.0, "n" = 4.0]
);

/// b_n for n > 0.36 (MacArthur, Courteau & Holtzman 2003), coefficients of
/// 1/n highest power first, added to 2n
const BN_LARGE_N: [f64; 5] = [
    -2194697.0 / 30690717750.0,
    131.0 / 1148175.0,
    46.0 / 25515.0,
    4.0 / 405.0,
    -1.0 / 3.0,
];

/// b_n for n <= 0.36, coefficients of n highest power first
const BN_SMALL_N: [f64; 5] = [13.43, -19.67, 10.95, -0.8902, 0.01945];

fn polyval(coeffs_high_first: &[f64], x: f64) -> f64 {
    coeffs_high_first.iter().fold(0.0, |acc, c| acc * x + c)
}

impl Sersic {
    /// `b_n`, chosen so `re` encloses half the light
    pub fn bn(n: f64) -> f64 {
        if n > 0.36 {
            2.0 * n + polyval(&BN_LARGE_N, 1.0 / n)
        } else {
            polyval(&BN_SMALL_N, n)
        }
    }

    pub fn profile(r: f64, ae: f64, re: f64, n: f64) -> f64 {
        ae * (-Self::bn(n) * ((r / re).powf(1.0 / n) - 1.0)).exp()
    }

    /// Central value `f(0)`
    pub fn a0(&self) -> f64 {
        self.evaluate(0.0)
    }

    /// Scale `Ae` so the central value is `value`
    pub fn set_a0(&mut self, value: f64) {
        let current = self.a0();
        let ae = self.state.value(0);
        self.state.set_value(0, ae * value / current);
    }

    /// Fit to a surface-brightness profile in magnitudes, converted to flux
    /// with `10^((zpt − sb)/2.5)`
    pub fn fit_surface_brightness(
        &mut self,
        r: &[f64],
        sb: &[f64],
        zero_point: f64,
        options: &FitOptions,
    ) -> Result<crate::params::FitDiagnostics> {
        let flux: Vec<f64> = sb
            .iter()
            .map(|m| 10f64.powf((zero_point - m) / 2.5))
            .collect();
        self.fit(r, &flux, options)
    }
}

impl ParametricModel for Sersic {
    model_state!();

    fn eval_with(&self, r: f64, params: &[f64]) -> f64 {
        Sersic::profile(r, params[0], params[1], params[2])
    }

    fn range_hint(&self) -> (f64, f64) {
        (0.0, 2.0 * self.state.value(1))
    }
}

builtin_model!(
    /// de Vaucouleurs profile: a Sersic profile with `n = 4`
    DeVaucouleurs,
    "devaucouleurs",
    ["A" = 1.0, "re" = 1.0]
);

impl DeVaucouleurs {
    pub const N: f64 = 4.0;

    /// The equivalent general Sersic model
    pub fn to_sersic(&self) -> Sersic {
        let mut sersic = Sersic::new();
        sersic.state.set_value(0, self.state.value(0));
        sersic.state.set_value(1, self.state.value(1));
        sersic.state.set_value(2, Self::N);
        sersic
    }
}

impl ParametricModel for DeVaucouleurs {
    model_state!();

    fn eval_with(&self, r: f64, params: &[f64]) -> f64 {
        Sersic::profile(r, params[0], params[1], Self::N)
    }

    fn range_hint(&self) -> (f64, f64) {
        (0.0, 2.0 * self.state.value(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rstest::rstest;

    #[rstest]
    #[case(1.0, 1.0)]
    #[case(3.0, 0.25)]
    fn test_gaussian_peak(#[case] a: f64, #[case] sig: f64) {
        let mut g = Gaussian::new();
        g.set_values(&[a, sig, 2.0]).unwrap();
        let expected = a * (2.0 * PI).powf(-0.5) / sig;
        assert_relative_eq!(g.evaluate(2.0), expected, epsilon = 1e-12);
        assert_relative_eq!(g.peak(), expected, epsilon = 1e-12);

        g.set_peak(5.0).unwrap();
        assert_relative_eq!(g.peak(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gaussian_derivative_matches_difference() {
        let mut g = Gaussian::new();
        g.set_values(&[2.0, 0.7, 0.3]).unwrap();
        let h = 1e-6;
        for &x in &[-1.0, 0.3, 1.2] {
            let numeric = (g.evaluate(x + h) - g.evaluate(x - h)) / (2.0 * h);
            assert_relative_eq!(g.derivative(x), numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_gaussian_unit_area() {
        let mut g = Gaussian::new();
        g.set_values(&[3.0, 0.5, 1.0]).unwrap();
        let (lo, hi) = g.range_hint();
        assert_relative_eq!(g.integrate(lo - 4.0, hi + 4.0).unwrap(), 3.0, epsilon = 1e-8);
    }

    #[test]
    fn test_double_gaussian_signs_forced() {
        let mut dg = DoubleGaussian::new();
        dg.set_values(&[-1.0, -1.0, 1.0, 1.0, 0.0, 0.0]).unwrap();
        // |A| − |B| with identical shapes cancels
        assert_abs_diff_eq!(dg.evaluate(0.3), 0.0, epsilon = 1e-15);
        assert_eq!(dg.range_hint(), (-4.0, 4.0));
    }

    #[test]
    fn test_lorentzian_peak() {
        let mut l = Lorentzian::new();
        l.set_values(&[2.0, 0.5, 1.0]).unwrap();
        assert_relative_eq!(l.peak(), 2.0 / (PI * 0.5), epsilon = 1e-12);
        l.set_peak(1.0).unwrap();
        assert_relative_eq!(l.peak(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_voigt_limits() {
        let mut v = Voigt::new();
        v.set_values(&[1.0, 0.0, 0.5, 0.2]).unwrap();
        let l = Lorentzian::profile(0.7, 1.0, 0.5, 0.2);
        assert_relative_eq!(v.evaluate(0.7), l, epsilon = 1e-14);

        v.set_values(&[1.0, 0.5, 1e-6, 0.0]).unwrap();
        assert_relative_eq!(v.evaluate(0.4), Gaussian::profile(0.4, 1.0, 0.5, 0.0), max_relative = 1e-3);
    }

    #[test]
    fn test_voigt_is_symmetric_and_broader() {
        let v = Voigt::new();
        assert_relative_eq!(v.evaluate(-0.8), v.evaluate(0.8), max_relative = 1e-8);
        // Convolution lowers the peak below either component alone
        assert!(v.peak() < Gaussian::profile(0.0, 1.0, 0.5, 0.0));
        assert!(v.peak() < Lorentzian::profile(0.0, 1.0, 0.5, 0.0));
    }

    #[test]
    fn test_king_profiles_vanish_at_tidal_radius() {
        let k2 = King2D::new();
        let k3 = King3D::new();
        assert_eq!(k2.evaluate(2.0), 0.0);
        assert_eq!(k3.evaluate(2.5), 0.0);
        assert!(k2.evaluate(0.5) > k2.evaluate(1.5));
        assert!(k3.evaluate(0.1) > k3.evaluate(1.0));
    }

    #[test]
    fn test_plummer_total_mass() {
        let mut p = Plummer::new();
        p.set_values(&[0.5, 3.0]).unwrap();
        let mass = p.integrate_spherical(0.0, 200.0).unwrap();
        assert_relative_eq!(mass, 3.0, max_relative = 1e-4);
    }

    #[test]
    fn test_sersic_bn_and_effective_radius() {
        assert_relative_eq!(Sersic::bn(4.0), 7.669, epsilon = 1e-3);
        assert_relative_eq!(Sersic::bn(1.0), 1.678, epsilon = 1e-3);
        let s = Sersic::new();
        assert_relative_eq!(s.evaluate(1.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sersic_a0_round_trip() {
        let mut s = Sersic::new();
        s.set_a0(10.0);
        assert_relative_eq!(s.a0(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_devaucouleurs_is_sersic_n4() {
        let mut dv = DeVaucouleurs::new();
        dv.set_values(&[2.0, 3.0]).unwrap();
        let sersic = dv.to_sersic();
        for &r in &[0.1, 1.0, 4.0] {
            assert_relative_eq!(dv.evaluate(r), sersic.evaluate(r), epsilon = 1e-12);
        }
    }
}
