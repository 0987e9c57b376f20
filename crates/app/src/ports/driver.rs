//! Driver port: the device-specific half of a module.
//!
//! A driver brings up and tears down whatever a module type needs (a UDP
//! listener, a timer, a connection to a lamp). Everything shared by all
//! modules (status machine, restart-on-change policy, counters, telemetry)
//! lives in [`Module`](crate::module::Module), which owns a boxed driver.
//!
//! Capabilities are composed rather than inherited:
//!
//! - producers receive an [`Emitter`] through [`DriverContext`] and push raw
//!   values into it;
//! - consumers expose a [`ConsumerHandler`] via
//!   [`ModuleDriver::as_consumer`].
//!
//! The runtime calls the lifecycle hooks in order:
//!
//! 1. [`validate`](ModuleDriver::validate): from `initialize` and every `update_config`
//! 2. [`acquire`](ModuleDriver::acquire): from `start`, bounded by a timeout
//! 3. [`reconfigure`](ModuleDriver::reconfigure): in-place config changes
//! 4. [`release`](ModuleDriver::release): from `stop` and `destroy`

use std::sync::Arc;

use async_trait::async_trait;

use interlink_domain::error::{InterlinkError, ValidationError};
use interlink_domain::event::{StreamEvent, TriggerEvent};
use interlink_domain::id::ModuleId;
use interlink_domain::module::{ENABLED_KEY, ModuleConfig, ModuleRole};

use crate::ports::TelemetrySink;
use crate::producer::Emitter;

/// What a driver gets to work with while acquiring resources.
#[derive(Clone)]
pub struct DriverContext {
    pub module_id: ModuleId,
    /// Set for producers only.
    pub emitter: Option<Emitter>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// Device-specific lifecycle hooks for one module type.
#[async_trait]
pub trait ModuleDriver: Send + Sync {
    fn role(&self) -> ModuleRole;

    /// Check a candidate config. Must be side-effect free.
    fn validate(&self, config: &ModuleConfig) -> Result<(), ValidationError>;

    /// Config keys that affect resource acquisition.
    ///
    /// A change to any of them while started triggers stop-then-start;
    /// any other change is applied in place.
    fn restart_keys(&self) -> &'static [&'static str] {
        &[ENABLED_KEY]
    }

    /// Acquire external resources with `config`.
    ///
    /// Must be all-or-nothing: on `Err`, nothing may remain held. After
    /// `Ok`, producers may start pushing values into the context's emitter.
    async fn acquire(
        &mut self,
        config: &ModuleConfig,
        ctx: &DriverContext,
    ) -> Result<(), InterlinkError>;

    /// Release everything `acquire` took.
    ///
    /// Must not return before every callback that could push a value has
    /// finished. Calling it with nothing held is a no-op.
    async fn release(&mut self);

    /// Apply a validated config that does not require a restart.
    fn reconfigure(&mut self, _config: &ModuleConfig) {}

    /// The consumer capability, if this driver has one.
    fn as_consumer(&self) -> Option<&dyn ConsumerHandler> {
        None
    }
}

/// Device-specific reaction to routed events.
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn handle_trigger_event(&self, event: &TriggerEvent) -> Result<(), InterlinkError>;

    async fn handle_streaming_event(&self, event: &StreamEvent) -> Result<(), InterlinkError>;
}
