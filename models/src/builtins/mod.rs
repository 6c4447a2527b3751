//! Builtin model catalog
//!
//! Simple models are declared with [`builtin_model!`], which generates the
//! struct, its `Default` (every parameter at its default) and a `NAME`
//! constant. Models with extra configuration (polynomial degree, spectral
//! unit, knot count) are written out by hand.

macro_rules! builtin_model {
    ($(#[$meta:meta])* $ty:ident, $name:literal, [$($param:literal = $default:expr),+ $(,)?]) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $ty {
            state: $crate::params::ModelState,
        }

        impl Default for $ty {
            fn default() -> Self {
                Self {
                    state: $crate::params::ModelState::new(&[$($param),+], &[$($default),+]),
                }
            }
        }

        impl $ty {
            pub const NAME: &'static str = $name;

            pub fn new() -> Self {
                Self::default()
            }
        }
    };
}

/// Accessors every builtin shares inside its `ParametricModel` impl
macro_rules! model_state {
    () => {
        fn name(&self) -> &str {
            Self::NAME
        }

        fn state(&self) -> &$crate::params::ModelState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut $crate::params::ModelState {
            &mut self.state
        }
    };
}

mod astro;
mod basic;
mod profiles;
mod splines;

pub use astro::{
    Blackbody, MaxwellBoltzmann, MaxwellBoltzmannSpeed, Nfw, SchechterLum, SchechterMag,
    SpectralUnit, VirialParams,
};
pub use basic::{
    Constant, Exponential, Fourier, Linear, Polynomial, PowerLaw, Quadratic, Sin, TwoPower,
    TwoSlope,
};
pub use profiles::{
    Component, DeVaucouleurs, DoubleGaussian, Einasto, Gaussian, King2D, King3D, Lorentzian,
    Moffat, Plummer, Sersic, Voigt,
};
pub use splines::{
    InterpolatedSpline, SmoothSpline, SpecifiedKnotSpline, UniformCdfKnotSpline,
    UniformKnotSpline,
};

use crate::registry::ModelRegistry;

/// Add every builtin to `registry` under its `NAME`
pub(crate) fn register_all(registry: &mut ModelRegistry) {
    registry.insert_builtin::<Constant>();
    registry.insert_builtin::<Linear>();
    registry.insert_builtin::<Quadratic>();
    registry.insert_builtin::<Polynomial>();
    registry.insert_builtin::<Fourier>();
    registry.insert_builtin::<Exponential>();
    registry.insert_builtin::<PowerLaw>();
    registry.insert_builtin::<Sin>();
    registry.insert_builtin::<TwoPower>();
    registry.insert_builtin::<TwoSlope>();

    registry.insert_builtin::<Gaussian>();
    registry.insert_builtin::<DoubleGaussian>();
    registry.insert_builtin::<Lorentzian>();
    registry.insert_builtin::<Voigt>();
    registry.insert_builtin::<Moffat>();
    registry.insert_builtin::<Plummer>();
    registry.insert_builtin::<King2D>();
    registry.insert_builtin::<King3D>();
    registry.insert_builtin::<Einasto>();
    registry.insert_builtin::<Sersic>();
    registry.insert_builtin::<DeVaucouleurs>();

    registry.insert_builtin::<Blackbody>();
    registry.insert_builtin::<Nfw>();
    registry.insert_builtin::<SchechterMag>();
    registry.insert_builtin::<SchechterLum>();
    registry.insert_builtin::<MaxwellBoltzmann>();
    registry.insert_builtin::<MaxwellBoltzmannSpeed>();

    registry.insert_builtin::<SmoothSpline>();
    registry.insert_builtin::<InterpolatedSpline>();
    registry.insert_builtin::<UniformKnotSpline>();
    registry.insert_builtin::<UniformCdfKnotSpline>();
    registry.insert_builtin::<SpecifiedKnotSpline>();
}

/// Number of models [`register_all`] adds
pub const BUILTIN_COUNT: usize = 32;
