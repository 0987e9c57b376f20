//! Module registry: instantiate modules by type name.
//!
//! Adapter crates register a factory per module type; interactions refer to
//! types by name only.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use interlink_domain::error::{InterlinkError, ValidationError};
use interlink_domain::interaction::ModuleDefinition;

use crate::module::{DEFAULT_LIFECYCLE_TIMEOUT, Module};
use crate::ports::{ModuleDriver, TelemetrySink};

/// Builds a fresh driver for one module instance.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn ModuleDriver> + Send + Sync>;

/// Name → factory table shared by every interaction.
#[derive(Clone)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, DriverFactory>,
    lifecycle_timeout: Duration,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self {
            factories: BTreeMap::new(),
            lifecycle_timeout: DEFAULT_LIFECYCLE_TIMEOUT,
        }
    }
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound applied to `start` / `stop` of every module created here.
    #[must_use]
    pub fn with_lifecycle_timeout(mut self, timeout: Duration) -> Self {
        self.lifecycle_timeout = timeout;
        self
    }

    /// Register (or replace) the factory for `type_name`.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn ModuleDriver> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self
            .factories
            .insert(type_name.clone(), Arc::new(factory))
            .is_some()
        {
            tracing::warn!(%type_name, "module type registered twice, keeping the latest");
        }
        self
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the module described by `definition`, in `Created` status.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownModuleType`] when no factory is registered
    /// for the definition's type.
    pub fn create(
        &self,
        definition: &ModuleDefinition,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Module, InterlinkError> {
        let factory = self
            .factories
            .get(&definition.type_name)
            .ok_or_else(|| ValidationError::UnknownModuleType(definition.type_name.clone()))?;
        Ok(Module::new(
            definition.id,
            definition.type_name.clone(),
            definition.config.clone(),
            factory(),
            telemetry,
        )
        .with_lifecycle_timeout(self.lifecycle_timeout))
    }
}
