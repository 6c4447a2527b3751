//! Name → constructor table for models
//!
//! Nothing registers itself: the application builds a [`ModelRegistry`],
//! usually with [`ModelRegistry::with_builtins`], and adds its own models with
//! [`ModelRegistry::register_model`]. Names are matched case-insensitively.

use log::debug;
use std::collections::BTreeMap;

use crate::builtins;
use crate::error::{ModelError, Result};
use crate::model::ParametricModel;

/// Builds a model with every parameter at its default
pub type Constructor = fn() -> Box<dyn ParametricModel>;

fn construct<M: ParametricModel + Default + 'static>() -> Box<dyn ParametricModel> {
    Box::new(M::default())
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<String, Constructor>,
}

impl ModelRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every builtin model
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register_all(&mut registry);
        debug!("model registry created with {} builtin(s)", registry.len());
        registry
    }

    pub fn register(&mut self, name: &str, constructor: Constructor) -> Result<()> {
        let key = name.to_lowercase();
        if self.entries.contains_key(&key) {
            return Err(ModelError::DuplicateModel(key));
        }
        self.entries.insert(key, constructor);
        Ok(())
    }

    /// Register `M` under the name its default instance reports
    pub fn register_model<M: ParametricModel + Default + 'static>(&mut self) -> Result<()> {
        let name = M::default().name().to_string();
        self.register(&name, construct::<M>)
    }

    pub(crate) fn insert_builtin<M: ParametricModel + Default + 'static>(&mut self) {
        let name = M::default().name().to_lowercase();
        self.entries.insert(name, construct::<M>);
    }

    /// New instance of the model registered as `name`
    pub fn create(&self, name: &str) -> Result<Box<dyn ParametricModel>> {
        match self.entries.get(&name.to_lowercase()) {
            Some(constructor) => Ok(constructor()),
            None => Err(ModelError::UnknownModel {
                name: name.to_string(),
                known: self.names().collect::<Vec<_>>().join(", "),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{Gaussian, BUILTIN_COUNT};
    use crate::params::ModelState;

    #[derive(Debug, Clone)]
    struct Doubling {
        state: ModelState,
    }

    impl Default for Doubling {
        fn default() -> Self {
            Self {
                state: ModelState::new(&["k"], &[2.0]),
            }
        }
    }

    impl ParametricModel for Doubling {
        fn name(&self) -> &str {
            "Doubling"
        }

        fn state(&self) -> &ModelState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut ModelState {
            &mut self.state
        }

        fn eval_with(&self, x: f64, params: &[f64]) -> f64 {
            params[0] * x
        }
    }

    #[test]
    fn test_builtins_all_present() {
        let registry = ModelRegistry::with_builtins();
        assert_eq!(registry.len(), BUILTIN_COUNT);
        for name in registry.names() {
            let model = registry.create(name).unwrap();
            assert_eq!(model.name(), name);
        }
    }

    #[test]
    fn test_lookup_ignores_case() {
        let registry = ModelRegistry::with_builtins();
        let model = registry.create("GAUSSIAN").unwrap();
        assert_eq!(model.parameter_names(), Gaussian::new().parameter_names());
        assert!(registry.contains("Nfw"));
    }

    #[test]
    fn test_unknown_model_lists_known() {
        let mut registry = ModelRegistry::new();
        registry.register_model::<Doubling>().unwrap();
        match registry.create("tripling") {
            Err(ModelError::UnknownModel { name, known }) => {
                assert_eq!(name, "tripling");
                assert_eq!(known, "doubling");
            }
            other => panic!("unexpected {:?}", other.map(|m| m.name().to_string())),
        }
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ModelRegistry::with_builtins();
        registry.register_model::<Doubling>().unwrap();
        assert!(matches!(
            registry.register_model::<Doubling>(),
            Err(ModelError::DuplicateModel(name)) if name == "doubling"
        ));
        assert!(matches!(
            registry.register_model::<Gaussian>(),
            Err(ModelError::DuplicateModel(_))
        ));
        let model = registry.create("doubling").unwrap();
        assert_eq!(model.evaluate(3.0), 6.0);
    }
}
