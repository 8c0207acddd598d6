use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::backend::InferenceBackend;
use super::backends::{DummyBackend, MotionBackend};

/// Named collection of inference backends.
///
/// The consumer loop owns exactly one backend, so selection hands the backend
/// out by value (`take`) rather than sharing it behind a lock.
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn InferenceBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry holding `dummy` (the default, with `latency`) and `motion`.
    pub fn with_builtin(latency: Duration) -> Self {
        let mut registry = Self::new();
        registry.register(DummyBackend::new(latency));
        registry.register(MotionBackend::new());
        registry
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: InferenceBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove and return the backend registered as `name`.
    pub fn take(&mut self, name: &str) -> Result<Box<dyn InferenceBackend>> {
        let backend = self.backends.remove(name).ok_or_else(|| {
            anyhow!(
                "unknown backend '{}' (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        if self.default_name.as_deref() == Some(name) {
            self.default_name = None;
        }
        Ok(backend)
    }

    pub fn take_default(&mut self) -> Result<Box<dyn InferenceBackend>> {
        let name = self
            .default_name
            .clone()
            .ok_or_else(|| anyhow!("no default backend registered"))?;
        self.take(&name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
