//! Config drafts: local edits layered over runtime-confirmed baselines.
//!
//! Two layers per module:
//!
//! - the **baseline**, the last config the runtime confirmed;
//! - the **delta**, fields edited locally and not yet confirmed.
//!
//! Reads overlay the delta on the baseline field by field. A delta key is
//! dropped once a baseline reports the same value for it. Topology edits
//! that cannot be expressed per field are queued as [`TopologyEdit`]s.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::id::{ModuleId, RouteId};
use crate::interaction::{ModuleDefinition, Route};
use crate::module::ModuleConfig;
use crate::time::{Timestamp, now};

/// Unconfirmed field edits for a single module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDelta {
    pub fields: ModuleConfig,
    pub updated_at: Timestamp,
}

impl Default for ConfigDelta {
    fn default() -> Self {
        Self {
            fields: ModuleConfig::new(),
            updated_at: now(),
        }
    }
}

impl ConfigDelta {
    /// Merge one field; the last value per key wins.
    pub fn merge(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.fields.insert(key.into(), value);
        self.updated_at = now();
    }

    /// `baseline` with every drafted field applied on top.
    #[must_use]
    pub fn overlay(&self, baseline: &ModuleConfig) -> ModuleConfig {
        let mut effective = baseline.clone();
        for (key, value) in &self.fields {
            effective.insert(key.clone(), value.clone());
        }
        effective
    }

    /// Drop every drafted key whose value `baseline` now matches.
    ///
    /// Returns the confirmed keys.
    pub fn confirm(&mut self, baseline: &ModuleConfig) -> Vec<String> {
        let confirmed: Vec<String> = self
            .fields
            .iter()
            .filter(|(key, value)| baseline.get(key.as_str()) == Some(*value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &confirmed {
            self.fields.remove(key);
        }
        confirmed
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A structural change to an interaction's graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TopologyEdit {
    AddModule(ModuleDefinition),
    RemoveModule { module_id: ModuleId },
    AddRoute(Route),
    RemoveRoute { route_id: RouteId },
    RemoveRoutesBetween { source: ModuleId, target: ModuleId },
}

/// Everything a commit hands to the runtime in one go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitPayload {
    /// Effective config of every known module. Applied as a merge over the
    /// live config, so keys missing here keep their live value.
    pub configs: BTreeMap<ModuleId, ModuleConfig>,
    /// Queued topology edits, oldest first.
    pub topology: Vec<TopologyEdit>,
    pub structural_change: bool,
}

/// Baselines, deltas and queued topology edits for every module.
#[derive(Debug, Clone, Default)]
pub struct ConfigDrafts {
    baselines: HashMap<ModuleId, ModuleConfig>,
    deltas: HashMap<ModuleId, ConfigDelta>,
    topology: Vec<TopologyEdit>,
}

impl ConfigDrafts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an edit into `module`'s delta and return its effective config.
    pub fn set_field(
        &mut self,
        module: ModuleId,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> ModuleConfig {
        self.deltas.entry(module).or_default().merge(key, value);
        self.current_config(module)
    }

    /// `baseline` overlaid with `module`'s delta.
    #[must_use]
    pub fn effective_config(&self, module: ModuleId, baseline: &ModuleConfig) -> ModuleConfig {
        match self.deltas.get(&module) {
            Some(delta) => delta.overlay(baseline),
            None => baseline.clone(),
        }
    }

    /// The stored baseline for `module` overlaid with its delta.
    #[must_use]
    pub fn current_config(&self, module: ModuleId) -> ModuleConfig {
        let empty = ModuleConfig::new();
        let baseline = self.baselines.get(&module).unwrap_or(&empty);
        self.effective_config(module, baseline)
    }

    /// Record a fresh baseline and drop the delta keys it confirms.
    ///
    /// Returns the confirmed keys.
    pub fn reconcile(&mut self, module: ModuleId, baseline: ModuleConfig) -> Vec<String> {
        let confirmed = match self.deltas.get_mut(&module) {
            Some(delta) => {
                let confirmed = delta.confirm(&baseline);
                if delta.is_empty() {
                    self.deltas.remove(&module);
                }
                confirmed
            }
            None => Vec::new(),
        };
        self.baselines.insert(module, baseline);
        confirmed
    }

    /// Queue a structural edit. Removing a module also forgets its layers.
    pub fn record_topology(&mut self, edit: TopologyEdit) {
        if let TopologyEdit::RemoveModule { module_id } = &edit {
            self.baselines.remove(module_id);
            self.deltas.remove(module_id);
        }
        self.topology.push(edit);
    }

    #[must_use]
    pub fn delta(&self, module: ModuleId) -> Option<&ConfigDelta> {
        self.deltas.get(&module)
    }

    #[must_use]
    pub fn is_dirty(&self, module: ModuleId) -> bool {
        self.deltas.contains_key(&module)
    }

    #[must_use]
    pub fn structural_change(&self) -> bool {
        !self.topology.is_empty()
    }

    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.deltas.is_empty() || self.structural_change()
    }

    /// Bundle every effective config and queued edit without mutating anything.
    #[must_use]
    pub fn snapshot(&self) -> CommitPayload {
        let configs = self
            .baselines
            .keys()
            .chain(self.deltas.keys())
            .map(|id| (*id, self.current_config(*id)))
            .collect();
        CommitPayload {
            configs,
            topology: self.topology.clone(),
            structural_change: self.structural_change(),
        }
    }

    /// Promote a committed payload: its configs become baselines, the deltas
    /// it carried are cleared, and its topology edits leave the queue.
    ///
    /// Edits made after `payload` was taken survive.
    pub fn settle(&mut self, payload: &CommitPayload) {
        for (module, committed) in &payload.configs {
            if self.baselines.contains_key(module) || self.deltas.contains_key(module) {
                self.reconcile(*module, committed.clone());
            }
        }
        let settled = payload.topology.len().min(self.topology.len());
        self.topology.drain(..settled);
    }
}
