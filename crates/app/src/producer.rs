//! Producer core: change-gating and trigger / streaming emission.
//!
//! Every producer module owns one [`ProducerCore`]. Its driver's sensing
//! task (listener, timer, …) pushes raw values in through
//! [`ProducerCore::ingest_with`]; the core publishes `value_received`
//! telemetry, decodes the domain value, drops repeats, and emits exactly one
//! event on the channel selected by the current [`ProducerMode`].
//!
//! Emissions leave through an unbounded per-module channel that the router's
//! pump drains, so producers never wait on dispatch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use interlink_domain::error::{LifecycleError, ProcessingError};
use interlink_domain::event::{Emission, StreamEvent, TriggerEvent, TriggerOrigin};
use interlink_domain::id::ModuleId;
use interlink_domain::module::{ModuleStatus, ProducerMode};
use interlink_domain::telemetry::Telemetry;
use interlink_domain::time::now;

use crate::ports::TelemetrySink;

/// Shared handle drivers use to push values into their producer.
pub type Emitter = Arc<ProducerCore>;

#[derive(Debug, Default)]
struct Gate {
    last_emitted: Option<serde_json::Value>,
    trigger_count: u64,
}

/// Change-gate and outbound channel of one producer module.
pub struct ProducerCore {
    module_id: ModuleId,
    mode: Mutex<ProducerMode>,
    gate: Mutex<Gate>,
    listening: AtomicBool,
    message_count: Arc<AtomicU64>,
    outbound: mpsc::UnboundedSender<Emission>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ProducerCore {
    /// Create a core and the receiving end of its outbound channel.
    pub fn new(
        module_id: ModuleId,
        mode: ProducerMode,
        message_count: Arc<AtomicU64>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> (Emitter, mpsc::UnboundedReceiver<Emission>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let core = Arc::new(Self {
            module_id,
            mode: Mutex::new(mode),
            gate: Mutex::new(Gate::default()),
            listening: AtomicBool::new(false),
            message_count,
            outbound,
            telemetry,
        });
        (core, rx)
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    #[must_use]
    pub fn mode(&self) -> ProducerMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch delivery channel. Takes effect on the next accepted change;
    /// nothing is re-emitted.
    pub fn set_mode(&self, mode: ProducerMode) {
        let mut current = self.mode.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != mode {
            tracing::debug!(module_id = %self.module_id, from = %*current, to = %mode, "producer mode changed");
            *current = mode;
        }
    }

    /// Whether the module is started and accepting values.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    pub(crate) fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::Release);
    }

    #[must_use]
    pub fn last_emitted_value(&self) -> Option<serde_json::Value> {
        self.lock_gate().last_emitted.clone()
    }

    #[must_use]
    pub fn trigger_count(&self) -> u64 {
        self.lock_gate().trigger_count
    }

    /// Process an already-decoded domain value.
    pub fn ingest(&self, value: serde_json::Value) -> Option<Emission> {
        self.ingest_with(&value, |raw| Ok(raw.clone()))
    }

    /// Process a raw value from the module's own sensing logic.
    ///
    /// Never fails: decode errors are logged and the value is dropped, so
    /// one bad packet cannot stop later ones. Returns the emission, if any.
    pub fn ingest_with(
        &self,
        raw: &serde_json::Value,
        decode: impl FnOnce(&serde_json::Value) -> Result<serde_json::Value, ProcessingError>,
    ) -> Option<Emission> {
        if !self.is_listening() {
            tracing::trace!(module_id = %self.module_id, "value ignored while not listening");
            return None;
        }
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.telemetry
            .emit(Telemetry::value_received(self.module_id, raw.clone()));

        let value = match decode(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(module_id = %self.module_id, %err, "dropping malformed producer input");
                return None;
            }
        };

        let emission = {
            let mut gate = self.lock_gate();
            if gate.last_emitted.as_ref() == Some(&value) {
                return None;
            }
            gate.last_emitted = Some(value.clone());
            match self.mode() {
                ProducerMode::Trigger => {
                    gate.trigger_count += 1;
                    Emission::trigger(
                        self.module_id,
                        TriggerEvent {
                            value,
                            count: gate.trigger_count,
                            origin: TriggerOrigin::Auto,
                            timestamp: now(),
                        },
                    )
                }
                ProducerMode::Streaming => Emission::stream(
                    self.module_id,
                    StreamEvent {
                        value,
                        timestamp: now(),
                    },
                ),
            }
        };

        self.send(emission.clone());
        Some(emission)
    }

    /// Emit an operator-issued trigger, bypassing the change-gate.
    ///
    /// Carries the last emitted value (or `null`) and bumps the trigger count.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotStarted`] when the module is not listening.
    pub fn manual_trigger(&self) -> Result<Emission, LifecycleError> {
        if !self.is_listening() {
            return Err(LifecycleError::NotStarted(ModuleStatus::Stopped));
        }
        let emission = {
            let mut gate = self.lock_gate();
            gate.trigger_count += 1;
            Emission::trigger(
                self.module_id,
                TriggerEvent {
                    value: gate.last_emitted.clone().unwrap_or_default(),
                    count: gate.trigger_count,
                    origin: TriggerOrigin::Manual,
                    timestamp: now(),
                },
            )
        };
        self.telemetry
            .emit(Telemetry::triggered(self.module_id, TriggerOrigin::Manual));
        self.send(emission.clone());
        Ok(emission)
    }

    fn send(&self, emission: Emission) {
        if self.outbound.send(emission).is_err() {
            tracing::debug!(module_id = %self.module_id, "no router attached, emission dropped");
        }
    }

    fn lock_gate(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
