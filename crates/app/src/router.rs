//! Interaction router: resolves routes against live modules and fans
//! emitted events out to consumers.
//!
//! The dispatch index is rebuilt on every topology change and swapped in
//! whole, so a dispatch in flight always reads one consistent snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::join_all;

use interlink_domain::error::{InterlinkError, ValidationError};
use interlink_domain::event::{Emission, EventFamily};
use interlink_domain::id::{ModuleId, RouteId};
use interlink_domain::interaction::Route;
use interlink_domain::routing::{RouteIndex, RouteTable};

use crate::module::Module;

/// Outcome of one [`InteractionRouter::dispatch`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Targets whose handler completed successfully.
    pub delivered: usize,
    /// Targets named by a route but no longer present.
    pub skipped: usize,
    /// Targets whose handler returned an error.
    pub failed: usize,
}

impl DispatchReport {
    #[must_use]
    pub fn targets(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}

/// Routes and live modules of one interaction.
#[derive(Default)]
pub struct InteractionRouter {
    table: Mutex<RouteTable>,
    index: RwLock<Arc<RouteIndex>>,
    modules: RwLock<HashMap<ModuleId, Arc<Module>>>,
}

impl InteractionRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live module as a potential route endpoint.
    pub fn add_module(&self, module: Arc<Module>) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.id(), module);
        self.rebuild_index();
    }

    /// Unregister a module and every route that references it.
    ///
    /// Returns the module (if it was present) and the removed routes.
    pub fn remove_module(&self, id: ModuleId) -> (Option<Arc<Module>>, Vec<Route>) {
        let module = self
            .modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        let removed = self.lock_table().remove_touching(id);
        if !removed.is_empty() {
            tracing::debug!(module_id = %id, routes = removed.len(), "cascaded route removal");
        }
        self.rebuild_index();
        (module, removed)
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<Arc<Module>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    #[must_use]
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Add `route`, replacing any route between the same endpoints.
    ///
    /// Returns the replaced route, if any.
    ///
    /// # Errors
    ///
    /// [`ValidationError::DanglingRoute`] when either endpoint is unknown.
    pub fn add_route(&self, route: Route) -> Result<Option<Route>, InterlinkError> {
        {
            let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
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
        let replaced = self.lock_table().upsert(route);
        if let Some(old) = &replaced {
            tracing::debug!(route_id = %old.id, source = %old.source, target = %old.target, "route replaced");
        }
        self.rebuild_index();
        Ok(replaced)
    }

    /// Remove exactly the route with `id`.
    pub fn remove_route(&self, id: RouteId) -> Option<Route> {
        let removed = self.lock_table().remove(id);
        if removed.is_some() {
            self.rebuild_index();
        }
        removed
    }

    /// Remove every route between exactly `source` and `target`.
    pub fn remove_routes_between(&self, source: ModuleId, target: ModuleId) -> Vec<Route> {
        let removed = self.lock_table().remove_between(source, target);
        if !removed.is_empty() {
            self.rebuild_index();
        }
        removed
    }

    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.lock_table().routes().to_vec()
    }

    /// The dispatch index currently in effect.
    #[must_use]
    pub fn index(&self) -> Arc<RouteIndex> {
        Arc::clone(&self.index.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Deliver `emission` to every consumer routed from its source and event.
    ///
    /// Missing targets are skipped and handler failures are caught per
    /// target; neither stops the rest of the fan-out.
    pub async fn dispatch(&self, emission: &Emission) -> DispatchReport {
        let index = self.index();
        let targets = index.targets(emission.source, &emission.event);
        let mut report = DispatchReport::default();
        if targets.is_empty() {
            return report;
        }

        let family = EventFamily::of(&emission.event);
        let mut deliveries = Vec::with_capacity(targets.len());
        for target in targets {
            let Some(module) = self.module(*target) else {
                tracing::warn!(module_id = %target, event = %emission.event, source = %emission.source, "route target missing, skipped");
                report.skipped += 1;
                continue;
            };
            deliveries.push(async move {
                let result = match family {
                    EventFamily::Trigger => {
                        module
                            .on_trigger_event(&emission.payload.to_trigger())
                            .await
                    }
                    EventFamily::Stream => {
                        module
                            .on_streaming_event(&emission.payload.to_stream())
                            .await
                    }
                };
                (module.id(), result)
            });
        }

        for (target, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(module_id = %target, event = %emission.event, source = %emission.source, %err, "delivery failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn rebuild_index(&self) {
        let index = Arc::new(self.lock_table().index());
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index;
    }

    fn lock_table(&self) -> std::sync::MutexGuard<'_, RouteTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
