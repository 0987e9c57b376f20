//! Runtime: every loaded interaction, keyed by id.
//!
//! A module instance belongs to exactly one live interaction. Every
//! interaction loaded here claims its module ids in one shared
//! [`ModuleOwners`] map, so loads, added modules and committed topology
//! edits that reuse an id owned elsewhere are all rejected.

use std::collections::BTreeMap;
use std::sync::Arc;

use interlink_domain::error::{InterlinkError, NotFoundError};
use interlink_domain::id::{InteractionId, ModuleId};
use interlink_domain::interaction::{Interaction, ModuleDefinition};

use crate::interaction_runtime::InteractionRuntime;
use crate::module::Module;
use crate::ownership::ModuleOwners;
use crate::ports::TelemetrySink;
use crate::registry::ModuleRegistry;

/// Owner of all live interactions.
pub struct Runtime {
    registry: Arc<ModuleRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
    owners: ModuleOwners,
    interactions: tokio::sync::RwLock<BTreeMap<InteractionId, Arc<InteractionRuntime>>>,
}

impl Runtime {
    pub fn new(registry: ModuleRegistry, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            registry: Arc::new(registry),
            telemetry,
            owners: ModuleOwners::new(),
            interactions: tokio::sync::RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    #[must_use]
    pub fn owners(&self) -> &ModuleOwners {
        &self.owners
    }

    /// Load `interaction`, replacing a loaded interaction with the same id.
    ///
    /// # Errors
    ///
    /// [`ValidationError::ModuleAlreadyOwned`](interlink_domain::error::ValidationError::ModuleAlreadyOwned)
    /// when a module id belongs to a different live interaction, or any
    /// [`InteractionRuntime::load_with_owners`] error.
    #[tracing::instrument(skip_all, fields(interaction_id = %interaction.id, name = %interaction.name))]
    pub async fn load(
        &self,
        interaction: &Interaction,
    ) -> Result<Arc<InteractionRuntime>, InterlinkError> {
        let mut interactions = self.interactions.write().await;
        for definition in &interaction.modules {
            self.owners.check(definition.id, interaction.id)?;
        }
        if let Some(previous) = interactions.remove(&interaction.id) {
            tracing::info!("replacing loaded interaction");
            previous.shutdown().await;
        }
        let runtime = Arc::new(
            InteractionRuntime::load_with_owners(
                interaction,
                Arc::clone(&self.registry),
                Arc::clone(&self.telemetry),
                self.owners.clone(),
            )
            .await?,
        );
        interactions.insert(interaction.id, Arc::clone(&runtime));
        Ok(runtime)
    }

    pub async fn get(&self, id: InteractionId) -> Option<Arc<InteractionRuntime>> {
        self.interactions.read().await.get(&id).cloned()
    }

    pub async fn ids(&self) -> Vec<InteractionId> {
        self.interactions.read().await.keys().copied().collect()
    }

    /// Find a module in whichever interaction owns it.
    pub async fn find_module(&self, id: ModuleId) -> Option<Arc<Module>> {
        self.interactions
            .read()
            .await
            .values()
            .find_map(|interaction| interaction.module(id))
    }

    /// # Errors
    ///
    /// [`NotFoundError`] for an unknown interaction.
    pub async fn enable(
        &self,
        id: InteractionId,
    ) -> Result<Vec<(ModuleId, InterlinkError)>, InterlinkError> {
        self.require(id).await?.enable().await
    }

    /// # Errors
    ///
    /// [`NotFoundError`] for an unknown interaction.
    pub async fn disable(&self, id: InteractionId) -> Result<(), InterlinkError> {
        self.require(id).await?.disable().await
    }

    /// Add a module to a loaded interaction.
    ///
    /// # Errors
    ///
    /// [`NotFoundError`] for an unknown interaction, or any
    /// [`InteractionRuntime::add_module`] error, including
    /// `ModuleAlreadyOwned` when another interaction holds the id.
    pub async fn add_module(
        &self,
        id: InteractionId,
        definition: &ModuleDefinition,
    ) -> Result<Arc<Module>, InterlinkError> {
        self.require(id).await?.add_module(definition).await
    }

    /// Shut down and forget an interaction, destroying its modules and routes.
    ///
    /// # Errors
    ///
    /// [`NotFoundError`] for an unknown interaction.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: InteractionId) -> Result<(), InterlinkError> {
        let removed = self.interactions.write().await.remove(&id);
        let interaction = removed.ok_or_else(|| not_found(id))?;
        interaction.shutdown().await;
        Ok(())
    }

    /// Shut down every interaction.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let interactions = std::mem::take(&mut *self.interactions.write().await);
        for interaction in interactions.into_values() {
            interaction.shutdown().await;
        }
        tracing::info!("runtime shut down");
    }

    async fn require(&self, id: InteractionId) -> Result<Arc<InteractionRuntime>, InterlinkError> {
        self.get(id).await.ok_or_else(|| not_found(id))
    }
}

fn not_found(id: InteractionId) -> InterlinkError {
    NotFoundError {
        entity: "interaction",
        id: id.to_string(),
    }
    .into()
}
