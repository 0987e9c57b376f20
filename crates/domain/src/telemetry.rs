//! Telemetry: one-way observations published for dashboards and logs.
//!
//! All three kinds are fire-and-forget; nothing acknowledges them.

use serde::{Deserialize, Serialize};

use crate::event::TriggerOrigin;
use crate::id::ModuleId;
use crate::module::ModuleSnapshot;
use crate::time::{Timestamp, now};

/// An observable event leaving the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Telemetry {
    /// Module status, config and counters after a change.
    StateUpdate(ModuleSnapshot),
    /// A module fired, for pulse/animation feedback.
    TriggerEvent {
        module_id: ModuleId,
        origin: TriggerOrigin,
        timestamp: Timestamp,
    },
    /// A producer received a raw value, before change-gating.
    ValueReceived {
        module_id: ModuleId,
        value: serde_json::Value,
        timestamp: Timestamp,
    },
}

impl Telemetry {
    #[must_use]
    pub fn triggered(module_id: ModuleId, origin: TriggerOrigin) -> Self {
        Self::TriggerEvent {
            module_id,
            origin,
            timestamp: now(),
        }
    }

    #[must_use]
    pub fn value_received(module_id: ModuleId, value: serde_json::Value) -> Self {
        Self::ValueReceived {
            module_id,
            value,
            timestamp: now(),
        }
    }

    /// The module this observation is about.
    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        match self {
            Self::StateUpdate(snapshot) => snapshot.id,
            Self::TriggerEvent { module_id, .. } | Self::ValueReceived { module_id, .. } => {
                *module_id
            }
        }
    }
}
