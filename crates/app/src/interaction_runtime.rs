//! Interaction runtime: one live interaction: its modules, its router and
//! the pump tasks that carry producer emissions to the router.
//!
//! Each producer gets one pump that drains its outbound channel and awaits
//! every dispatch before taking the next emission, so events from a single
//! source reach the router in the order they were produced.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use interlink_domain::config_draft::{CommitPayload, TopologyEdit};
use interlink_domain::error::{InterlinkError, LifecycleError, NotFoundError, ValidationError};
use interlink_domain::id::{InteractionId, ModuleId, RouteId};
use interlink_domain::interaction::{Interaction, ModuleDefinition, Route};
use interlink_domain::module::{ModuleConfig, ModuleSnapshot};

use crate::module::Module;
use crate::ownership::ModuleOwners;
use crate::ports::telemetry::NullTelemetry;
use crate::ports::{CommitTarget, TelemetrySink};
use crate::registry::ModuleRegistry;
use crate::router::InteractionRouter;

struct Pump {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
struct Control {
    enabled: bool,
    closed: bool,
}

/// A loaded interaction.
pub struct InteractionRuntime {
    id: InteractionId,
    name: String,
    registry: Arc<ModuleRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
    owners: ModuleOwners,
    router: Arc<InteractionRouter>,
    shutdown: CancellationToken,
    pumps: Mutex<HashMap<ModuleId, Pump>>,
    control: tokio::sync::Mutex<Control>,
}

impl InteractionRuntime {
    /// Load `interaction` on its own, with no other interaction competing
    /// for its module ids.
    ///
    /// # Errors
    ///
    /// See [`InteractionRuntime::load_with_owners`].
    pub async fn load(
        interaction: &Interaction,
        registry: Arc<ModuleRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, InterlinkError> {
        Self::load_with_owners(interaction, registry, telemetry, ModuleOwners::new()).await
    }

    /// Instantiate, initialize and wire every module of `interaction`, then
    /// start them if the interaction is enabled. Every module id is claimed
    /// in `owners` for as long as the module lives.
    ///
    /// Start failures are logged and leave the module initialized; every
    /// other failure aborts the load and tears down what was built.
    ///
    /// # Errors
    ///
    /// [`InterlinkError::Validation`] for an invalid definition, an unknown
    /// module type, a rejected module config or a module id owned by another
    /// interaction.
    #[tracing::instrument(skip_all, fields(interaction_id = %interaction.id, name = %interaction.name))]
    pub async fn load_with_owners(
        interaction: &Interaction,
        registry: Arc<ModuleRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
        owners: ModuleOwners,
    ) -> Result<Self, InterlinkError> {
        interaction.validate()?;
        let runtime = Self {
            id: interaction.id,
            name: interaction.name.clone(),
            registry,
            telemetry,
            owners,
            router: Arc::new(InteractionRouter::new()),
            shutdown: CancellationToken::new(),
            pumps: Mutex::new(HashMap::new()),
            control: tokio::sync::Mutex::new(Control {
                enabled: interaction.enabled,
                closed: false,
            }),
        };

        if let Err(err) = runtime.wire(interaction).await {
            runtime.shutdown().await;
            return Err(err);
        }
        if interaction.enabled {
            runtime.start_all().await;
        }
        tracing::info!(
            modules = interaction.modules.len(),
            routes = interaction.routes.len(),
            enabled = interaction.enabled,
            "interaction loaded"
        );
        Ok(runtime)
    }

    async fn wire(&self, interaction: &Interaction) -> Result<(), InterlinkError> {
        for definition in &interaction.modules {
            self.spawn_module(definition).await?;
        }
        for route in &interaction.routes {
            self.router.add_route(route.clone())?;
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> InteractionId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn router(&self) -> &Arc<InteractionRouter> {
        &self.router
    }

    pub async fn is_enabled(&self) -> bool {
        self.control.lock().await.enabled
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<Arc<Module>> {
        self.router.module(id)
    }

    #[must_use]
    pub fn module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<_> = self.router.modules().iter().map(|m| m.id()).collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.router.routes()
    }

    pub async fn snapshots(&self) -> Vec<ModuleSnapshot> {
        let mut snapshots = Vec::new();
        for module in self.router.modules() {
            snapshots.push(module.snapshot().await);
        }
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// The interaction as plain data, reflecting every applied change.
    pub async fn definition(&self) -> Interaction {
        let modules = self
            .snapshots()
            .await
            .into_iter()
            .map(|s| ModuleDefinition {
                id: s.id,
                type_name: s.type_name,
                config: s.config,
            })
            .collect();
        Interaction {
            id: self.id,
            name: self.name.clone(),
            enabled: self.is_enabled().await,
            modules,
            routes: self.routes(),
        }
    }

    /// Mark the interaction enabled and start every module.
    ///
    /// Returns the modules that failed to start.
    #[tracing::instrument(skip(self), fields(interaction_id = %self.id))]
    pub async fn enable(&self) -> Result<Vec<(ModuleId, InterlinkError)>, InterlinkError> {
        let mut control = self.control.lock().await;
        ensure_open(*control)?;
        control.enabled = true;
        Ok(self.start_all().await)
    }

    /// Mark the interaction disabled and stop every module.
    #[tracing::instrument(skip(self), fields(interaction_id = %self.id))]
    pub async fn disable(&self) -> Result<(), InterlinkError> {
        let mut control = self.control.lock().await;
        ensure_open(*control)?;
        control.enabled = false;
        for module in self.router.modules() {
            if let Err(err) = module.stop().await {
                tracing::warn!(module_id = %module.id(), %err, "module failed to stop");
            }
        }
        Ok(())
    }

    /// Add a module to the live graph, starting it when the interaction is
    /// enabled.
    ///
    /// # Errors
    ///
    /// [`ValidationError::DuplicateModule`] when the id is taken here,
    /// [`ValidationError::ModuleAlreadyOwned`] when another interaction holds
    /// it, any creation or initialization error, or the start error (the
    /// module is then removed again).
    #[tracing::instrument(skip(self, definition), fields(interaction_id = %self.id, module_id = %definition.id))]
    pub async fn add_module(
        &self,
        definition: &ModuleDefinition,
    ) -> Result<Arc<Module>, InterlinkError> {
        let control = self.control.lock().await;
        ensure_open(*control)?;
        let module = self.spawn_module(definition).await?;
        if control.enabled
            && let Err(err) = module.start().await
        {
            self.teardown_module(definition.id).await;
            return Err(err);
        }
        Ok(module)
    }

    /// Destroy a module and every route that references it.
    ///
    /// # Errors
    ///
    /// [`NotFoundError`] when the module is not part of this interaction.
    #[tracing::instrument(skip(self), fields(interaction_id = %self.id))]
    pub async fn remove_module(&self, id: ModuleId) -> Result<Vec<Route>, InterlinkError> {
        let control = self.control.lock().await;
        ensure_open(*control)?;
        if self.router.module(id).is_none() {
            return Err(not_found("module", id));
        }
        Ok(self.teardown_module(id).await)
    }

    /// Add or replace the route between `route.source` and `route.target`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::DanglingRoute`] when an endpoint is unknown.
    pub fn add_route(&self, route: Route) -> Result<Option<Route>, InterlinkError> {
        self.router.add_route(route)
    }

    /// # Errors
    ///
    /// [`NotFoundError`] when no route has `id`.
    pub fn remove_route(&self, id: RouteId) -> Result<Route, InterlinkError> {
        self.router
            .remove_route(id)
            .ok_or_else(|| not_found("route", id))
    }

    pub fn remove_routes_between(&self, source: ModuleId, target: ModuleId) -> Vec<Route> {
        self.router.remove_routes_between(source, target)
    }

    /// # Errors
    ///
    /// [`NotFoundError`] for an unknown module, otherwise whatever
    /// [`Module::update_config`] returns.
    pub async fn update_config(
        &self,
        id: ModuleId,
        config: ModuleConfig,
    ) -> Result<(), InterlinkError> {
        self.require(id)?.update_config(config).await
    }

    /// # Errors
    ///
    /// [`NotFoundError`] for an unknown module, otherwise whatever
    /// [`Module::manual_trigger`] returns.
    pub async fn manual_trigger(&self, id: ModuleId) -> Result<(), InterlinkError> {
        self.require(id)?.manual_trigger().await
    }

    /// Destroy every module and stop every pump. Further lifecycle calls
    /// fail with [`LifecycleError::Destroyed`].
    #[tracing::instrument(skip(self), fields(interaction_id = %self.id))]
    pub async fn shutdown(&self) {
        let mut control = self.control.lock().await;
        if control.closed {
            return;
        }
        control.closed = true;
        control.enabled = false;
        for id in self.module_ids() {
            self.teardown_module(id).await;
        }
        self.shutdown.cancel();
        tracing::info!("interaction shut down");
    }

    async fn start_all(&self) -> Vec<(ModuleId, InterlinkError)> {
        let mut failures = Vec::new();
        for module in self.router.modules() {
            if let Err(err) = module.start().await {
                tracing::warn!(module_id = %module.id(), type_name = %module.type_name(), %err, "module failed to start");
                failures.push((module.id(), err));
            }
        }
        failures
    }

    async fn spawn_module(
        &self,
        definition: &ModuleDefinition,
    ) -> Result<Arc<Module>, InterlinkError> {
        if self.router.module(definition.id).is_some() {
            return Err(ValidationError::DuplicateModule(definition.id.to_string()).into());
        }
        self.owners.claim(definition.id, self.id)?;
        let module = match self.instantiate(definition).await {
            Ok(module) => Arc::new(module),
            Err(err) => {
                self.owners.release(definition.id, self.id);
                return Err(err);
            }
        };
        self.router.add_module(Arc::clone(&module));
        self.spawn_pump(&module);
        Ok(module)
    }

    async fn instantiate(&self, definition: &ModuleDefinition) -> Result<Module, InterlinkError> {
        let module = self
            .registry
            .create(definition, Arc::clone(&self.telemetry))?;
        module.initialize().await?;
        Ok(module)
    }

    fn spawn_pump(&self, module: &Module) {
        let Some(mut emissions) = module.take_emissions() else {
            return;
        };
        let cancel = self.shutdown.child_token();
        let router = Arc::clone(&self.router);
        let module_id = module.id();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                let emission = tokio::select! {
                    () = token.cancelled() => break,
                    next = emissions.recv() => match next {
                        Some(emission) => emission,
                        None => break,
                    },
                };
                let report = router.dispatch(&emission).await;
                tracing::trace!(%module_id, event = %emission.event, ?report, "emission dispatched");
            }
            tracing::debug!(%module_id, "pump stopped");
        });
        self.lock_pumps()
            .insert(module_id, Pump { cancel, handle });
    }

    async fn teardown_module(&self, id: ModuleId) -> Vec<Route> {
        let (module, routes) = self.router.remove_module(id);
        if let Some(module) = module {
            module.destroy().await;
            self.owners.release(id, self.id);
        }
        let pump = self.lock_pumps().remove(&id);
        if let Some(pump) = pump {
            pump.cancel.cancel();
            if let Err(err) = pump.handle.await {
                tracing::warn!(module_id = %id, %err, "pump task ended abnormally");
            }
        }
        routes
    }

    fn require(&self, id: ModuleId) -> Result<Arc<Module>, InterlinkError> {
        self.router.module(id).ok_or_else(|| not_found("module", id))
    }

    fn lock_pumps(&self) -> std::sync::MutexGuard<'_, HashMap<ModuleId, Pump>> {
        self.pumps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InteractionRuntime {
    /// Check a whole commit against the live graph without touching it and
    /// return the configs to apply, each merged over the module's current
    /// config.
    async fn plan_commit(
        &self,
        payload: &CommitPayload,
    ) -> Result<Vec<(ModuleId, ModuleConfig)>, InterlinkError> {
        let mut modules: HashMap<ModuleId, Arc<Module>> = self
            .router
            .modules()
            .into_iter()
            .map(|module| (module.id(), module))
            .collect();
        let mut removed = HashSet::new();

        for edit in &payload.topology {
            match edit {
                TopologyEdit::AddModule(definition) => {
                    if let Some(existing) = modules.get(&definition.id) {
                        if existing.type_name() != definition.type_name {
                            return Err(
                                ValidationError::DuplicateModule(definition.id.to_string()).into()
                            );
                        }
                        continue;
                    }
                    self.owners.check(definition.id, self.id)?;
                    let candidate = self.registry.create(definition, Arc::new(NullTelemetry))?;
                    candidate.check_config(&definition.config).await?;
                    removed.remove(&definition.id);
                    modules.insert(definition.id, Arc::new(candidate));
                }
                TopologyEdit::RemoveModule { module_id } => {
                    if modules.remove(module_id).is_some() {
                        removed.insert(*module_id);
                    }
                }
                TopologyEdit::AddRoute(route) => {
                    for endpoint in [route.source, route.target] {
                        if !modules.contains_key(&endpoint) {
                            return Err(ValidationError::DanglingRoute {
                                route: route.id.to_string(),
                                module: endpoint.to_string(),
                            }
                            .into());
                        }
                    }
                }
                TopologyEdit::RemoveRoute { .. } | TopologyEdit::RemoveRoutesBetween { .. } => {}
            }
        }

        let mut configs = Vec::with_capacity(payload.configs.len());
        for (module_id, committed) in &payload.configs {
            let Some(module) = modules.get(module_id) else {
                if removed.contains(module_id) {
                    continue;
                }
                return Err(not_found("module", module_id));
            };
            let mut merged = module.config().await;
            merged.extend(committed.clone());
            module.check_config(&merged).await?;
            configs.push((*module_id, merged));
        }
        Ok(configs)
    }

    /// Apply one topology edit. Edits already reflected in the live graph
    /// succeed without change, so a commit can be replayed.
    async fn apply_edit(&self, edit: TopologyEdit) -> Result<(), InterlinkError> {
        match edit {
            TopologyEdit::AddModule(definition) => {
                if self.router.module(definition.id).is_some() {
                    tracing::debug!(module_id = %definition.id, "module already present");
                } else {
                    self.add_module(&definition).await?;
                }
            }
            TopologyEdit::RemoveModule { module_id } => {
                if self.router.module(module_id).is_some() {
                    self.remove_module(module_id).await?;
                } else {
                    tracing::debug!(%module_id, "module already removed");
                }
            }
            TopologyEdit::AddRoute(route) => {
                self.add_route(route)?;
            }
            TopologyEdit::RemoveRoute { route_id } => {
                if self.router.remove_route(route_id).is_none() {
                    tracing::debug!(%route_id, "route already removed");
                }
            }
            TopologyEdit::RemoveRoutesBetween { source, target } => {
                self.remove_routes_between(source, target);
            }
        }
        Ok(())
    }
}

impl CommitTarget for InteractionRuntime {
    /// Check the whole payload first, then apply topology edits in order and
    /// merge every committed config over the live one. A rejected payload
    /// leaves the interaction untouched.
    async fn apply(&self, payload: CommitPayload) -> Result<(), InterlinkError> {
        let configs = self.plan_commit(&payload).await.inspect_err(|err| {
            tracing::debug!(interaction_id = %self.id, %err, "commit rejected before any change");
        })?;
        for edit in payload.topology {
            self.apply_edit(edit).await?;
        }
        for (module_id, config) in configs {
            self.update_config(module_id, config).await?;
        }
        Ok(())
    }
}

fn ensure_open(control: Control) -> Result<(), LifecycleError> {
    if control.closed {
        Err(LifecycleError::Destroyed)
    } else {
        Ok(())
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> InterlinkError {
    NotFoundError {
        entity,
        id: id.to_string(),
    }
    .into()
}
