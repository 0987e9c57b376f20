//! Interaction: a named bundle of module instances and the routes between them.
//!
//! Interactions arrive from the persistence layer as plain data. Deleting an
//! interaction cascades to its modules and routes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{InterlinkError, ValidationError};
use crate::id::{InteractionId, ModuleId, RouteId};
use crate::module::ModuleConfig;
use crate::routing::RouteTable;

/// Declarative reference to a module instance inside an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub id: ModuleId,
    pub type_name: String,
    #[serde(default)]
    pub config: ModuleConfig,
}

impl ModuleDefinition {
    pub fn new(type_name: impl Into<String>, config: ModuleConfig) -> Self {
        Self {
            id: ModuleId::new(),
            type_name: type_name.into(),
            config,
        }
    }
}

/// A declarative edge: `source`'s `event` is delivered to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub id: RouteId,
    pub source: ModuleId,
    pub target: ModuleId,
    pub event: String,
}

impl Route {
    pub fn new(source: ModuleId, target: ModuleId, event: impl Into<String>) -> Self {
        Self {
            id: RouteId::new(),
            source,
            target,
            event: event.into(),
        }
    }
}

/// A named, enable-able graph of modules and routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(default)]
    pub id: InteractionId,
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

fn enabled_by_default() -> bool {
    true
}

impl Interaction {
    /// Create a builder for constructing an [`Interaction`].
    #[must_use]
    pub fn builder() -> InteractionBuilder {
        InteractionBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`InterlinkError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - a module id appears twice ([`ValidationError::DuplicateModule`])
    /// - a route references a module outside the interaction
    ///   ([`ValidationError::DanglingRoute`])
    pub fn validate(&self) -> Result<(), InterlinkError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let mut seen = HashSet::with_capacity(self.modules.len());
        for module in &self.modules {
            if !seen.insert(module.id) {
                return Err(ValidationError::DuplicateModule(module.id.to_string()).into());
            }
        }
        for route in &self.routes {
            for endpoint in [route.source, route.target] {
                if !seen.contains(&endpoint) {
                    return Err(ValidationError::DanglingRoute {
                        route: route.id.to_string(),
                        module: endpoint.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// The routes normalized through a [`RouteTable`].
    #[must_use]
    pub fn route_table(&self) -> RouteTable {
        RouteTable::from_routes(self.routes.iter().cloned())
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&ModuleDefinition> {
        self.modules.iter().find(|m| m.id == id)
    }
}

/// Step-by-step builder for [`Interaction`].
#[derive(Debug, Default)]
pub struct InteractionBuilder {
    id: Option<InteractionId>,
    name: Option<String>,
    enabled: Option<bool>,
    modules: Vec<ModuleDefinition>,
    routes: RouteTable,
}

impl InteractionBuilder {
    #[must_use]
    pub fn id(mut self, id: InteractionId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn module(mut self, module: ModuleDefinition) -> Self {
        self.modules.push(module);
        self
    }

    /// Add a route; a route between the same pair replaces the earlier one.
    #[must_use]
    pub fn route(mut self, route: Route) -> Self {
        self.routes.upsert(route);
        self
    }

    /// Consume the builder, validate, and return an [`Interaction`].
    ///
    /// # Errors
    ///
    /// Returns [`InterlinkError::Validation`] if invariants fail.
    pub fn build(self) -> Result<Interaction, InterlinkError> {
        let interaction = Interaction {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            modules: self.modules,
            routes: self.routes.routes().to_vec(),
        };
        interaction.validate()?;
        Ok(interaction)
    }
}
