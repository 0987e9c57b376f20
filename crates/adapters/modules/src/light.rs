//! Virtual light: consumer that toggles on trigger events and follows
//! stream events with its brightness.
//!
//! | Key | Default | Range | Restart |
//! |-----|---------|-------|---------|
//! | `on_brightness` | `255` | 1 – 255 | no |
//! | `enabled` | `true` | | yes |

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use interlink_app::ports::{ConsumerHandler, DriverContext, ModuleDriver};
use interlink_domain::error::{InterlinkError, LifecycleError, ProcessingError, ValidationError, json_kind};
use interlink_domain::event::{StreamEvent, TriggerEvent};
use interlink_domain::id::ModuleId;
use interlink_domain::module::{ConfigExt, ModuleConfig, ModuleRole, ModuleStatus};

pub const ON_BRIGHTNESS_KEY: &str = "on_brightness";
const BRIGHTNESS_RANGE: RangeInclusive<i64> = 1..=255;

/// Observable state of a virtual light.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightState {
    pub on: bool,
    pub brightness: u8,
    /// Last value applied from an event.
    pub last_sent_value: Option<Value>,
}

/// Shared view of a light's state, readable while the module runs.
pub type LightHandle = Arc<Mutex<LightState>>;

/// Virtual light consumer driver.
pub struct VirtualLight {
    module_id: Option<ModuleId>,
    on_brightness: u8,
    connected: AtomicBool,
    state: LightHandle,
}

impl Default for VirtualLight {
    fn default() -> Self {
        Self::with_handle(LightHandle::default())
    }
}

impl VirtualLight {
    /// Build a light whose state is mirrored into `handle`.
    #[must_use]
    pub fn with_handle(handle: LightHandle) -> Self {
        Self {
            module_id: None,
            on_brightness: u8::MAX,
            connected: AtomicBool::new(false),
            state: handle,
        }
    }

    #[must_use]
    pub fn state(&self) -> LightState {
        self.lock_state().clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn ensure_connected(&self) -> Result<(), InterlinkError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(LifecycleError::NotStarted(ModuleStatus::Stopped).into())
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn on_brightness(config: &ModuleConfig) -> Result<u8, ValidationError> {
    let value = config.int_in_range(ON_BRIGHTNESS_KEY, 255, BRIGHTNESS_RANGE)?;
    Ok(u8::try_from(value).unwrap_or(u8::MAX))
}

/// Clamp any JSON number into `0..=255`.
fn brightness_of(value: &Value) -> Result<u8, ProcessingError> {
    let number = value
        .as_f64()
        .ok_or_else(|| ProcessingError::NotANumber(json_kind(value)))?;
    // clamped into u8 range first
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let level = number.clamp(0.0, 255.0).round() as u8;
    Ok(level)
}

#[async_trait]
impl ModuleDriver for VirtualLight {
    fn role(&self) -> ModuleRole {
        ModuleRole::Consumer
    }

    fn validate(&self, config: &ModuleConfig) -> Result<(), ValidationError> {
        on_brightness(config).map(|_| ())
    }

    async fn acquire(
        &mut self,
        config: &ModuleConfig,
        ctx: &DriverContext,
    ) -> Result<(), InterlinkError> {
        self.on_brightness = on_brightness(config)?;
        self.module_id = Some(ctx.module_id);
        self.connected.store(true, Ordering::Release);
        tracing::debug!(module_id = %ctx.module_id, "virtual light connected");
        Ok(())
    }

    async fn release(&mut self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            tracing::debug!(module_id = ?self.module_id, "virtual light disconnected");
        }
    }

    fn reconfigure(&mut self, config: &ModuleConfig) {
        if let Ok(level) = on_brightness(config) {
            self.on_brightness = level;
        }
    }

    fn as_consumer(&self) -> Option<&dyn ConsumerHandler> {
        Some(self)
    }
}

#[async_trait]
impl ConsumerHandler for VirtualLight {
    async fn handle_trigger_event(&self, event: &TriggerEvent) -> Result<(), InterlinkError> {
        self.ensure_connected()?;
        let mut state = self.lock_state();
        state.on = !state.on;
        state.brightness = if state.on { self.on_brightness } else { 0 };
        state.last_sent_value = Some(event.value.clone());
        tracing::info!(module_id = ?self.module_id, on = state.on, origin = %event.origin, "light toggled");
        Ok(())
    }

    async fn handle_streaming_event(&self, event: &StreamEvent) -> Result<(), InterlinkError> {
        self.ensure_connected()?;
        let level = brightness_of(&event.value).map_err(InterlinkError::handler)?;
        let mut state = self.lock_state();
        state.brightness = level;
        state.on = level > 0;
        state.last_sent_value = Some(event.value.clone());
        tracing::debug!(module_id = ?self.module_id, brightness = level, "light dimmed");
        Ok(())
    }
}
