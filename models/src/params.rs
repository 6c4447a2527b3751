//! Named parameters and per-model state
//!
//! Every model keeps its parameter names, defaults, current values and the
//! diagnostics of its last fit in one [`ModelState`]. Parameter order is fixed
//! at construction and matches the order of positional values everywhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{ModelError, Result};

/// Ordered name/value pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters(Vec<(String, f64)>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite, keeping first-insertion order
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(|(_, v)| *v).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(n, v)| (n.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        let mut params = Parameters::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl IntoIterator for Parameters {
    type Item = (String, f64);
    type IntoIter = std::vec::IntoIter<(String, f64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Which path produced a fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPath {
    /// Model-specific closed form
    Custom,
    /// Generic Levenberg-Marquardt over the free parameters
    LeastSquares,
}

/// Outcome of the last successful fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    /// Fitted values in parameter order (fixed parameters included)
    pub values: Vec<f64>,
    /// One-sigma uncertainties in parameter order; zero for fixed parameters
    pub uncertainties: Option<Vec<f64>>,
    /// Standard deviation of `y - f(x)` with one degree of freedom per free
    /// parameter
    pub residual_std: f64,
    pub iterations: usize,
    pub path: FitPath,
    pub points: usize,
}

/// Parameter names, defaults, current values and last fit of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    names: Vec<String>,
    defaults: Vec<f64>,
    values: Vec<f64>,
    last_fit: Option<FitDiagnostics>,
}

impl ModelState {
    /// State with every parameter at its default
    pub fn new(names: &[&str], defaults: &[f64]) -> Self {
        Self::from_parts(names.iter().map(|n| n.to_string()).collect(), defaults.to_vec())
    }

    pub fn from_parts(names: Vec<String>, defaults: Vec<f64>) -> Self {
        debug_assert_eq!(names.len(), defaults.len());
        Self {
            values: defaults.clone(),
            names,
            defaults,
            last_fit: None,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn defaults(&self) -> &[f64] {
        &self.defaults
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Index of `name`, or `UnknownParameter` listing the valid names
    pub fn require_index(&self, name: &str) -> Result<usize> {
        self.index_of(name).ok_or_else(|| ModelError::UnknownParameter {
            name: name.to_string(),
            expected: self.names.join(", "),
        })
    }

    pub fn set_values(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(ModelError::ParameterCountMismatch {
                expected: self.values.len(),
                got: values.len(),
            });
        }
        self.values.copy_from_slice(values);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<f64> {
        Ok(self.values[self.require_index(name)?])
    }

    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        let i = self.require_index(name)?;
        self.values[i] = value;
        Ok(())
    }

    /// Value by position; callers index with their own fixed layout
    pub(crate) fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub(crate) fn set_value(&mut self, index: usize, value: f64) {
        self.values[index] = value;
    }

    pub fn reset(&mut self) {
        self.values.copy_from_slice(&self.defaults);
        self.last_fit = None;
    }

    pub fn parameters(&self) -> Parameters {
        self.names
            .iter()
            .cloned()
            .zip(self.values.iter().copied())
            .collect()
    }

    /// Apply every pair in `params`; nothing changes if any name is unknown
    pub fn update(&mut self, params: &Parameters) -> Result<()> {
        let indices = params
            .names()
            .map(|name| self.require_index(name))
            .collect::<Result<Vec<_>>>()?;
        for (i, (_, value)) in indices.into_iter().zip(params.iter()) {
            self.values[i] = value;
        }
        Ok(())
    }

    pub fn last_fit(&self) -> Option<&FitDiagnostics> {
        self.last_fit.as_ref()
    }

    pub(crate) fn record_fit(&mut self, diagnostics: FitDiagnostics) {
        self.values.copy_from_slice(&diagnostics.values);
        self.last_fit = Some(diagnostics);
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> std::result::Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        let state: ModelState = serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if state.names.len() != state.values.len() || state.names.len() != state.defaults.len()
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "parameter names, defaults and values differ in length",
            ));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn state() -> ModelState {
        ModelState::new(&["A", "sig", "mu"], &[1.0, 1.0, 0.0])
    }

    #[test]
    fn test_defaults_are_current_values() {
        let s = state();
        assert_eq!(s.values(), &[1.0, 1.0, 0.0]);
        assert_eq!(s.names(), &["A", "sig", "mu"]);
    }

    #[test]
    fn test_set_values_checks_count() {
        let mut s = state();
        let err = s.set_values(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::ParameterCountMismatch {
                expected: 3,
                got: 2
            }
        ));
        assert_eq!(s.values(), &[1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_get_set_by_name() {
        let mut s = state();
        s.set("mu", 2.5).unwrap();
        assert_eq!(s.get("mu").unwrap(), 2.5);
        assert!(matches!(
            s.get("tau"),
            Err(ModelError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let mut s = state();
        let bad: Parameters = [("A", 3.0), ("bogus", 1.0)].into_iter().collect();
        assert!(s.update(&bad).is_err());
        assert_eq!(s.get("A").unwrap(), 1.0);

        let good: Parameters = [("A", 3.0), ("sig", 0.5)].into_iter().collect();
        s.update(&good).unwrap();
        assert_eq!(s.values(), &[3.0, 0.5, 0.0]);
    }

    #[test]
    fn test_parameters_keep_order() {
        let p = state().parameters();
        assert_eq!(p.names().collect::<Vec<_>>(), vec!["A", "sig", "mu"]);
        assert_eq!(p.to_string(), "A=1, sig=1, mu=0");
    }

    #[test]
    fn test_reset_clears_fit() {
        let mut s = state();
        s.record_fit(FitDiagnostics {
            values: vec![2.0, 3.0, 4.0],
            uncertainties: None,
            residual_std: 0.0,
            iterations: 1,
            path: FitPath::Custom,
            points: 5,
        });
        assert_eq!(s.values(), &[2.0, 3.0, 4.0]);
        s.reset();
        assert_eq!(s.values(), &[1.0, 1.0, 0.0]);
        assert!(s.last_fit().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gaussian.json");
        let mut s = state();
        s.set("sig", 0.25).unwrap();
        s.save_to_file(&path).unwrap();
        assert_eq!(ModelState::load_from_file(&path).unwrap(), s);
    }
}
