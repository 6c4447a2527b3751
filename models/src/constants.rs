//! Physical constants in CGS units

/// Planck constant, erg·s
pub const H: f64 = 6.626_070_15e-27;
/// Speed of light, cm/s
pub const C: f64 = 2.997_924_58e10;
/// Boltzmann constant, erg/K
pub const K_B: f64 = 1.380_649e-16;
/// Electron mass, g
pub const M_E: f64 = 9.109_383_701_5e-28;

/// Wien displacement constant for wavelength, cm·K
pub const WIEN_B: f64 = 0.289_776_85;
/// Peak of `x³/(eˣ − 1)`, giving the frequency form of Wien's law
pub const WIEN_FREQUENCY_X: f64 = 2.821_439;

/// Stefan-Boltzmann constant `2π⁵k⁴/(15h³c²)`, erg/(cm²·s·K⁴)
pub fn stefan_boltzmann() -> f64 {
    2.0 * std::f64::consts::PI.powi(5) * K_B.powi(4) / (15.0 * H.powi(3) * C * C)
}
