//! Route table and dispatch index.
//!
//! The table enforces that at most one route exists per `(source, target)`
//! pair, whatever its event name. Inserting a route for a pair that already
//! has one replaces the old route in place.

use std::collections::HashMap;

use crate::id::{ModuleId, RouteId};
use crate::interaction::Route;

/// Ordered set of routes keyed by endpoint pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table by inserting `routes` in order; later duplicates win.
    pub fn from_routes(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut table = Self::new();
        for route in routes {
            table.upsert(route);
        }
        table
    }

    /// Insert `route`, replacing any route between the same endpoints.
    ///
    /// Returns the replaced route, if any.
    pub fn upsert(&mut self, route: Route) -> Option<Route> {
        match self
            .routes
            .iter_mut()
            .find(|r| r.source == route.source && r.target == route.target)
        {
            Some(slot) => Some(std::mem::replace(slot, route)),
            None => {
                self.routes.push(route);
                None
            }
        }
    }

    /// Remove the route with the given id.
    pub fn remove(&mut self, id: RouteId) -> Option<Route> {
        let pos = self.routes.iter().position(|r| r.id == id)?;
        Some(self.routes.remove(pos))
    }

    /// Remove every route between exactly `source` and `target`.
    pub fn remove_between(&mut self, source: ModuleId, target: ModuleId) -> Vec<Route> {
        self.drain_where(|r| r.source == source && r.target == target)
    }

    /// Remove every route that starts or ends at `module`.
    pub fn remove_touching(&mut self, module: ModuleId) -> Vec<Route> {
        self.drain_where(|r| r.source == module || r.target == module)
    }

    fn drain_where(&mut self, pred: impl Fn(&Route) -> bool) -> Vec<Route> {
        let (removed, kept) = std::mem::take(&mut self.routes)
            .into_iter()
            .partition(|r| pred(r));
        self.routes = kept;
        removed
    }

    #[must_use]
    pub fn between(&self, source: ModuleId, target: ModuleId) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.source == source && r.target == target)
    }

    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Build a fresh dispatch index from the current routes.
    #[must_use]
    pub fn index(&self) -> RouteIndex {
        let mut targets: HashMap<(ModuleId, String), Vec<ModuleId>> = HashMap::new();
        for route in &self.routes {
            targets
                .entry((route.source, route.event.clone()))
                .or_default()
                .push(route.target);
        }
        RouteIndex { targets }
    }
}

/// Immutable lookup from `(source, event)` to the ordered target list.
#[derive(Debug, Clone, Default)]
pub struct RouteIndex {
    targets: HashMap<(ModuleId, String), Vec<ModuleId>>,
}

impl RouteIndex {
    /// Targets wired to `event` emitted by `source`.
    #[must_use]
    pub fn targets(&self, source: ModuleId, event: &str) -> &[ModuleId] {
        self.targets
            .get(&(source, event.to_string()))
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_keep_one_route_when_same_pair_is_added_twice() {
        let (a, b) = (ModuleId::new(), ModuleId::new());
        let mut table = RouteTable::new();
        table.upsert(Route::new(a, b, "trigger"));
        let replaced = table.upsert(Route::new(a, b, "stream"));

        assert!(replaced.is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.routes()[0].event, "stream");
    }

    #[test]
    fn should_keep_routes_in_opposite_directions_apart() {
        let (a, b) = (ModuleId::new(), ModuleId::new());
        let mut table = RouteTable::new();
        table.upsert(Route::new(a, b, "trigger"));
        table.upsert(Route::new(b, a, "trigger"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn should_replace_in_place_preserving_order() {
        let (a, b, c) = (ModuleId::new(), ModuleId::new(), ModuleId::new());
        let mut table = RouteTable::new();
        table.upsert(Route::new(a, b, "trigger"));
        table.upsert(Route::new(a, c, "trigger"));
        table.upsert(Route::new(a, b, "stream"));
        assert_eq!(table.routes()[0].target, b);
        assert_eq!(table.routes()[1].target, c);
    }

    #[test]
    fn should_remove_exactly_the_route_with_matching_id() {
        let (a, b, c) = (ModuleId::new(), ModuleId::new(), ModuleId::new());
        let keep = Route::new(a, c, "trigger");
        let drop = Route::new(a, b, "trigger");
        let mut table = RouteTable::from_routes([drop.clone(), keep.clone()]);

        assert_eq!(table.remove(drop.id), Some(drop));
        assert_eq!(table.routes(), &[keep]);
        assert!(table.remove(RouteId::new()).is_none());
    }

    #[test]
    fn should_remove_all_routes_between_pair() {
        let (a, b, c) = (ModuleId::new(), ModuleId::new(), ModuleId::new());
        let mut table = RouteTable::from_routes([Route::new(a, b, "trigger"), Route::new(b, c, "trigger")]);
        let removed = table.remove_between(a, b);
        assert_eq!(removed.len(), 1);
        assert!(table.between(a, b).is_none());
        assert!(table.between(b, c).is_some());
    }

    #[test]
    fn should_remove_routes_touching_module() {
        let (a, b, c) = (ModuleId::new(), ModuleId::new(), ModuleId::new());
        let mut table = RouteTable::from_routes([
            Route::new(a, b, "trigger"),
            Route::new(b, c, "stream"),
            Route::new(a, c, "trigger"),
        ]);
        let removed = table.remove_touching(b);
        assert_eq!(removed.len(), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn should_index_targets_by_source_and_event() {
        let (a, b, c, d) = (ModuleId::new(), ModuleId::new(), ModuleId::new(), ModuleId::new());
        let table = RouteTable::from_routes([
            Route::new(a, b, "trigger"),
            Route::new(a, c, "trigger"),
            Route::new(a, d, "stream"),
        ]);
        let index = table.index();
        assert_eq!(index.targets(a, "trigger"), &[b, c]);
        assert_eq!(index.targets(a, "stream"), &[d]);
        assert!(index.targets(b, "trigger").is_empty());
    }
}
