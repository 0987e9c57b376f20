//! Events: what producers emit and consumers receive.
//!
//! A producer emits exactly one [`Emission`] per accepted value change, on
//! the channel selected by its [`ProducerMode`](crate::module::ProducerMode).
//! The route's event name decides which consumer entry point receives it
//! (see [`EventFamily`]).

use serde::{Deserialize, Serialize};

use crate::id::ModuleId;
use crate::time::Timestamp;

/// Conventional event name for discrete, counted events.
pub const TRIGGER_EVENT: &str = "trigger";

/// Conventional event name for continuous-channel updates.
pub const STREAM_EVENT: &str = "stream";

/// Who caused a trigger: an operator, or routed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOrigin {
    Manual,
    Auto,
}

impl std::fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::Auto => f.write_str("auto"),
        }
    }
}

/// A discrete, change-gated notification with a running count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// The new domain value, or `null` for a manual trigger that precedes
    /// any sensed value.
    pub value: serde_json::Value,
    /// How many times the emitting producer has triggered so far.
    pub count: u64,
    pub origin: TriggerOrigin,
    pub timestamp: Timestamp,
}

/// A change-gated continuous-channel update. Carries no count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub value: serde_json::Value,
    pub timestamp: Timestamp,
}

/// Payload of an emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Trigger(TriggerEvent),
    Stream(StreamEvent),
}

impl EventPayload {
    #[must_use]
    pub fn value(&self) -> &serde_json::Value {
        match self {
            Self::Trigger(evt) => &evt.value,
            Self::Stream(evt) => &evt.value,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Trigger(evt) => evt.timestamp,
            Self::Stream(evt) => evt.timestamp,
        }
    }

    /// View the payload as a trigger event.
    ///
    /// Stream payloads become an automatic trigger with a zero count.
    #[must_use]
    pub fn to_trigger(&self) -> TriggerEvent {
        match self {
            Self::Trigger(evt) => evt.clone(),
            Self::Stream(evt) => TriggerEvent {
                value: evt.value.clone(),
                count: 0,
                origin: TriggerOrigin::Auto,
                timestamp: evt.timestamp,
            },
        }
    }

    /// View the payload as a stream event, dropping any count.
    #[must_use]
    pub fn to_stream(&self) -> StreamEvent {
        StreamEvent {
            value: self.value().clone(),
            timestamp: self.timestamp(),
        }
    }
}

/// A named event leaving a producer, on its way to the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    pub source: ModuleId,
    pub event: String,
    pub payload: EventPayload,
}

impl Emission {
    #[must_use]
    pub fn trigger(source: ModuleId, event: TriggerEvent) -> Self {
        Self {
            source,
            event: TRIGGER_EVENT.to_string(),
            payload: EventPayload::Trigger(event),
        }
    }

    #[must_use]
    pub fn stream(source: ModuleId, event: StreamEvent) -> Self {
        Self {
            source,
            event: STREAM_EVENT.to_string(),
            payload: EventPayload::Stream(event),
        }
    }
}

/// Which consumer entry point an event name is delivered to.
///
/// Event names are open-ended: anything starting with `stream` belongs to
/// the stream family, everything else to the trigger family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    Trigger,
    Stream,
}

impl EventFamily {
    #[must_use]
    pub fn of(event: &str) -> Self {
        if event.starts_with(STREAM_EVENT) {
            Self::Stream
        } else {
            Self::Trigger
        }
    }
}
