//! Module: a lifecycle-managed sensor (producer) or actuator (consumer).
//!
//! The lifecycle is linear with a single loop between `Started` and
//! `Stopped`:
//!
//! ```text
//! Created → Initialized → Started ⇄ Stopped → Destroyed
//! ```
//!
//! Every non-destroyed status may also jump straight to `Destroyed`.

use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, ValidationError};
use crate::id::ModuleId;

/// Open key/value configuration of a module.
pub type ModuleConfig = serde_json::Map<String, serde_json::Value>;

/// Config key toggling whether a module acquires its resources on `start`.
pub const ENABLED_KEY: &str = "enabled";

/// Config key selecting a producer's delivery mode.
pub const MODE_KEY: &str = "mode";

/// Lifecycle status of a module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    #[default]
    Created,
    Initialized,
    Started,
    Stopped,
    Destroyed,
}

impl ModuleStatus {
    /// Whether moving from `self` to `to` is a legal lifecycle edge.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::Initialized)
                | (Self::Initialized | Self::Stopped, Self::Started)
                | (Self::Started, Self::Stopped)
                | (
                    Self::Created | Self::Initialized | Self::Started | Self::Stopped,
                    Self::Destroyed
                )
        )
    }

    /// Validate and perform a transition.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Destroyed`] when `self` is terminal, or
    /// [`LifecycleError::InvalidTransition`] for any other illegal edge.
    pub fn transition(self, to: Self) -> Result<Self, LifecycleError> {
        if self == Self::Destroyed {
            return Err(LifecycleError::Destroyed);
        }
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(LifecycleError::InvalidTransition { from: self, to })
        }
    }

    #[must_use]
    pub fn is_started(self) -> bool {
        self == Self::Started
    }

    #[must_use]
    pub fn is_destroyed(self) -> bool {
        self == Self::Destroyed
    }

    /// Whether `initialize` has succeeded at some point.
    #[must_use]
    pub fn is_initialized(self) -> bool {
        matches!(self, Self::Initialized | Self::Started | Self::Stopped)
    }
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Initialized => f.write_str("initialized"),
            Self::Started => f.write_str("started"),
            Self::Stopped => f.write_str("stopped"),
            Self::Destroyed => f.write_str("destroyed"),
        }
    }
}

/// Whether a module emits events or receives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleRole {
    Producer,
    Consumer,
}

/// Delivery channel a producer uses for change-gated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerMode {
    /// Discrete events carrying a running count.
    #[default]
    Trigger,
    /// Continuous-channel value updates.
    Streaming,
}

impl std::fmt::Display for ProducerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trigger => f.write_str("trigger"),
            Self::Streaming => f.write_str("streaming"),
        }
    }
}

impl FromStr for ProducerMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trigger" => Ok(Self::Trigger),
            "streaming" | "stream" => Ok(Self::Streaming),
            _ => Err(ValidationError::InvalidType {
                field: MODE_KEY.to_string(),
                expected: "`trigger` or `streaming`",
            }),
        }
    }
}

/// Point-in-time view of a module, published as `stateUpdate` telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub id: ModuleId,
    pub type_name: String,
    pub role: ModuleRole,
    pub status: ModuleStatus,
    pub config: ModuleConfig,
    pub message_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ProducerMode>,
}

/// Typed accessors over a [`ModuleConfig`] that report [`ValidationError`]s.
///
/// Missing keys fall back to the supplied default; present keys of the
/// wrong shape are errors.
pub trait ConfigExt {
    /// Read an integer field that must fall inside `range`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidType`] for non-integers,
    /// [`ValidationError::OutOfRange`] for values outside `range`.
    fn int_in_range(
        &self,
        key: &str,
        default: i64,
        range: RangeInclusive<i64>,
    ) -> Result<i64, ValidationError>;

    /// Read a boolean field.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidType`] when the value is not a boolean.
    fn bool_or(&self, key: &str, default: bool) -> Result<bool, ValidationError>;

    /// Read a string field.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidType`] when the value is not a string.
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, ValidationError>;

    /// Read the `enabled` flag (defaults to `true`).
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidType`] when the flag is not a boolean.
    fn enabled(&self) -> Result<bool, ValidationError> {
        self.bool_or(ENABLED_KEY, true)
    }

    /// Whether any of `keys` differs between `self` and `other`.
    fn differs_on(&self, other: &Self, keys: &[&str]) -> bool;
}

impl ConfigExt for ModuleConfig {
    fn int_in_range(
        &self,
        key: &str,
        default: i64,
        range: RangeInclusive<i64>,
    ) -> Result<i64, ValidationError> {
        let value = match self.get(key) {
            None | Some(serde_json::Value::Null) => default,
            Some(raw) => raw.as_i64().ok_or_else(|| ValidationError::InvalidType {
                field: key.to_string(),
                expected: "an integer",
            })?,
        };
        if range.contains(&value) {
            Ok(value)
        } else {
            Err(ValidationError::OutOfRange {
                field: key.to_string(),
                min: *range.start(),
                max: *range.end(),
                actual: value,
            })
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool, ValidationError> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(raw) => raw.as_bool().ok_or_else(|| ValidationError::InvalidType {
                field: key.to_string(),
                expected: "a boolean",
            }),
        }
    }

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, ValidationError> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(raw) => raw.as_str().ok_or_else(|| ValidationError::InvalidType {
                field: key.to_string(),
                expected: "a string",
            }),
        }
    }

    fn differs_on(&self, other: &Self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.get(*key) != other.get(*key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> ModuleConfig {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn should_allow_the_documented_lifecycle_edges() {
        use ModuleStatus as S;
        assert!(S::Created.can_transition_to(S::Initialized));
        assert!(S::Initialized.can_transition_to(S::Started));
        assert!(S::Started.can_transition_to(S::Stopped));
        assert!(S::Stopped.can_transition_to(S::Started));
        assert!(S::Stopped.can_transition_to(S::Destroyed));
        assert!(S::Created.can_transition_to(S::Destroyed));
    }

    #[test]
    fn should_reject_skipping_initialization() {
        let result = ModuleStatus::Created.transition(ModuleStatus::Started);
        assert_eq!(
            result,
            Err(LifecycleError::InvalidTransition {
                from: ModuleStatus::Created,
                to: ModuleStatus::Started,
            })
        );
    }

    #[test]
    fn should_reject_any_transition_out_of_destroyed() {
        for to in [
            ModuleStatus::Created,
            ModuleStatus::Initialized,
            ModuleStatus::Started,
            ModuleStatus::Destroyed,
        ] {
            assert_eq!(
                ModuleStatus::Destroyed.transition(to),
                Err(LifecycleError::Destroyed)
            );
        }
    }

    #[test]
    fn should_not_cycle_back_to_initialized() {
        assert!(!ModuleStatus::Stopped.can_transition_to(ModuleStatus::Initialized));
        assert!(!ModuleStatus::Started.can_transition_to(ModuleStatus::Created));
    }

    #[test]
    fn should_parse_producer_modes() {
        assert_eq!("trigger".parse(), Ok(ProducerMode::Trigger));
        assert_eq!("streaming".parse(), Ok(ProducerMode::Streaming));
        assert!("pulse".parse::<ProducerMode>().is_err());
    }

    #[test]
    fn should_use_default_when_int_field_missing() {
        let cfg = ModuleConfig::new();
        assert_eq!(cfg.int_in_range("port", 8000, 1..=63999), Ok(8000));
    }

    #[test]
    fn should_reject_int_field_outside_range() {
        for bad in [0, 70000] {
            let cfg = config(json!({ "port": bad }));
            assert!(matches!(
                cfg.int_in_range("port", 8000, 1..=63999),
                Err(ValidationError::OutOfRange { actual, .. }) if actual == bad
            ));
        }
    }

    #[test]
    fn should_reject_int_field_of_wrong_type() {
        let cfg = config(json!({ "port": "eight thousand" }));
        assert!(matches!(
            cfg.int_in_range("port", 8000, 1..=63999),
            Err(ValidationError::InvalidType { .. })
        ));
    }

    #[test]
    fn should_default_enabled_to_true() {
        assert_eq!(ModuleConfig::new().enabled(), Ok(true));
        assert_eq!(config(json!({ "enabled": false })).enabled(), Ok(false));
    }

    #[test]
    fn should_read_string_field_or_default() {
        let cfg = config(json!({ "address": "127.0.0.1" }));
        assert_eq!(cfg.str_or("address", "0.0.0.0"), Ok("127.0.0.1"));
        assert_eq!(cfg.str_or("label", "none"), Ok("none"));
    }

    #[test]
    fn should_detect_differences_on_selected_keys_only() {
        let a = config(json!({ "port": 8000, "label": "a" }));
        let b = config(json!({ "port": 8000, "label": "b" }));
        assert!(!a.differs_on(&b, &["port", "enabled"]));
        assert!(a.differs_on(&b, &["label"]));
    }
}
