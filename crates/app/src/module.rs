//! Module: lifecycle state machine shared by every module type.
//!
//! A [`Module`] owns a boxed [`ModuleDriver`] and serializes every call on
//! it behind one async mutex: `start`, `stop`, `update_config` and event
//! handling on the same instance never overlap.
//!
//! Hot configuration follows a diff-then-restart-only-if-needed policy:
//! a change to one of the driver's restart keys while started releases and
//! re-acquires resources; any other change is applied in place.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use interlink_domain::error::{InterlinkError, LifecycleError, ValidationError};
use interlink_domain::event::{Emission, StreamEvent, TriggerEvent, TriggerOrigin};
use interlink_domain::id::ModuleId;
use interlink_domain::module::{
    ConfigExt, ENABLED_KEY, MODE_KEY, ModuleConfig, ModuleRole, ModuleSnapshot, ModuleStatus,
    ProducerMode,
};
use interlink_domain::telemetry::Telemetry;
use interlink_domain::time::now;

use crate::ports::{ConsumerHandler, DriverContext, ModuleDriver, TelemetrySink};
use crate::producer::{Emitter, ProducerCore};

/// Default bound on `start` / `stop` resource handling.
pub const DEFAULT_LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(5);

struct ModuleState {
    status: ModuleStatus,
    config: ModuleConfig,
    driver: Box<dyn ModuleDriver>,
}

/// A lifecycle-managed producer or consumer instance.
pub struct Module {
    id: ModuleId,
    type_name: String,
    role: ModuleRole,
    message_count: Arc<AtomicU64>,
    telemetry: Arc<dyn TelemetrySink>,
    producer: Option<Emitter>,
    emissions: Mutex<Option<mpsc::UnboundedReceiver<Emission>>>,
    lifecycle_timeout: Duration,
    state: tokio::sync::Mutex<ModuleState>,
}

impl Module {
    /// Wrap `driver` in a new module in the `Created` status.
    pub fn new(
        id: ModuleId,
        type_name: impl Into<String>,
        config: ModuleConfig,
        driver: Box<dyn ModuleDriver>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let role = driver.role();
        let message_count = Arc::new(AtomicU64::new(0));
        let (producer, emissions) = match role {
            ModuleRole::Producer => {
                let mode = configured_mode(&config).unwrap_or_default();
                let (core, rx) =
                    ProducerCore::new(id, mode, Arc::clone(&message_count), Arc::clone(&telemetry));
                (Some(core), Some(rx))
            }
            ModuleRole::Consumer => (None, None),
        };
        Self {
            id,
            type_name: type_name.into(),
            role,
            message_count,
            telemetry,
            producer,
            emissions: Mutex::new(emissions),
            lifecycle_timeout: DEFAULT_LIFECYCLE_TIMEOUT,
            state: tokio::sync::Mutex::new(ModuleState {
                status: ModuleStatus::Created,
                config,
                driver,
            }),
        }
    }

    /// Override the bound applied to resource acquisition and release.
    #[must_use]
    pub fn with_lifecycle_timeout(mut self, timeout: Duration) -> Self {
        self.lifecycle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn role(&self) -> ModuleRole {
        self.role
    }

    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    /// The producer capability, if this module emits events.
    #[must_use]
    pub fn producer(&self) -> Option<&Emitter> {
        self.producer.as_ref()
    }

    /// Take the receiving end of this producer's outbound channel.
    ///
    /// Returns `None` for consumers and after the first call.
    pub fn take_emissions(&self) -> Option<mpsc::UnboundedReceiver<Emission>> {
        self.emissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub async fn status(&self) -> ModuleStatus {
        self.state.lock().await.status
    }

    pub async fn config(&self) -> ModuleConfig {
        self.state.lock().await.config.clone()
    }

    pub async fn snapshot(&self) -> ModuleSnapshot {
        let state = self.state.lock().await;
        self.snapshot_of(&state)
    }

    /// One-time validation. On failure the module stays `Created`.
    ///
    /// # Errors
    ///
    /// [`InterlinkError::Validation`] when the config is rejected, or
    /// [`InterlinkError::Lifecycle`] when already initialized or destroyed.
    #[tracing::instrument(skip(self), fields(module_id = %self.id, type_name = %self.type_name))]
    pub async fn initialize(&self) -> Result<(), InterlinkError> {
        let mut state = self.state.lock().await;
        if state.status.is_destroyed() {
            return Err(LifecycleError::Destroyed.into());
        }
        self.validate(&*state.driver, &state.config)?;
        state.status = state.status.transition(ModuleStatus::Initialized)?;
        tracing::debug!("module initialized");
        self.publish_state(&state);
        Ok(())
    }

    /// Acquire resources and begin processing. No-op when already started
    /// or when the config disables the module.
    ///
    /// # Errors
    ///
    /// [`InterlinkError::Resource`] or [`InterlinkError::Timeout`] when the
    /// driver cannot acquire its resources; the status is left unchanged.
    #[tracing::instrument(skip(self), fields(module_id = %self.id, type_name = %self.type_name))]
    pub async fn start(&self) -> Result<(), InterlinkError> {
        let mut state = self.state.lock().await;
        match state.status {
            ModuleStatus::Started => return Ok(()),
            ModuleStatus::Destroyed => return Err(LifecycleError::Destroyed.into()),
            ModuleStatus::Created => {
                return Err(LifecycleError::NotInitialized(ModuleStatus::Created).into());
            }
            ModuleStatus::Initialized | ModuleStatus::Stopped => {}
        }
        if !state.config.enabled()? {
            tracing::debug!("module disabled, start skipped");
            return Ok(());
        }
        self.start_locked(&mut state).await
    }

    /// Release resources. No-op unless started. Once this returns, the module
    /// emits nothing further.
    ///
    /// # Errors
    ///
    /// [`InterlinkError::Lifecycle`] when the module is destroyed.
    #[tracing::instrument(skip(self), fields(module_id = %self.id, type_name = %self.type_name))]
    pub async fn stop(&self) -> Result<(), InterlinkError> {
        let mut state = self.state.lock().await;
        match state.status {
            ModuleStatus::Destroyed => Err(LifecycleError::Destroyed.into()),
            ModuleStatus::Started => {
                self.stop_locked(&mut state).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Run the same validation [`Module::update_config`] would, without
    /// applying anything.
    ///
    /// # Errors
    ///
    /// [`InterlinkError::Validation`] when the config is rejected, or
    /// [`LifecycleError::Destroyed`].
    pub async fn check_config(&self, config: &ModuleConfig) -> Result<(), InterlinkError> {
        let state = self.state.lock().await;
        if state.status.is_destroyed() {
            return Err(LifecycleError::Destroyed.into());
        }
        self.validate(&*state.driver, config)?;
        Ok(())
    }

    /// Validate and apply a new config, restarting only if a restart key
    /// changed while started. Flipping `enabled` from false to true starts
    /// an initialized or stopped module.
    ///
    /// # Errors
    ///
    /// [`InterlinkError::Validation`] leaves the module untouched; a restart
    /// that fails to re-acquire leaves the module `Stopped` with the new config.
    #[tracing::instrument(skip(self, config), fields(module_id = %self.id, type_name = %self.type_name))]
    pub async fn update_config(&self, config: ModuleConfig) -> Result<(), InterlinkError> {
        let mut state = self.state.lock().await;
        if state.status.is_destroyed() {
            return Err(LifecycleError::Destroyed.into());
        }
        self.validate(&*state.driver, &config)?;

        let restart_keys = state.driver.restart_keys();
        let needs_restart = state.status.is_started()
            && (state.config.differs_on(&config, restart_keys)
                || state.config.differs_on(&config, &[ENABLED_KEY]));
        let re_enabled = matches!(
            state.status,
            ModuleStatus::Initialized | ModuleStatus::Stopped
        ) && !state.config.enabled()?
            && config.enabled()?;

        if re_enabled {
            tracing::info!("module re-enabled, starting");
            state.driver.reconfigure(&config);
            state.config = config;
            self.apply_mode(&state.config);
            self.start_locked(&mut state).await?;
        } else if needs_restart {
            tracing::info!("restart-affecting config changed, restarting");
            self.stop_locked(&mut state).await;
            state.config = config;
            self.apply_mode(&state.config);
            if state.config.enabled()? {
                self.start_locked(&mut state).await?;
            } else {
                self.publish_state(&state);
            }
        } else {
            state.driver.reconfigure(&config);
            state.config = config;
            self.apply_mode(&state.config);
            tracing::debug!("config applied in place");
            self.publish_state(&state);
        }
        Ok(())
    }

    /// Stop if needed, release everything and enter the terminal status.
    ///
    /// Destroying twice is a no-op.
    #[tracing::instrument(skip(self), fields(module_id = %self.id, type_name = %self.type_name))]
    pub async fn destroy(&self) {
        let mut state = self.state.lock().await;
        if state.status.is_destroyed() {
            return;
        }
        if state.status.is_started() {
            self.stop_locked(&mut state).await;
        }
        state.status = ModuleStatus::Destroyed;
        self.emissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        tracing::debug!("module destroyed");
        self.publish_state(&state);
    }

    /// Current delivery mode of a producer.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Unsupported`] for consumers.
    pub fn mode(&self) -> Result<ProducerMode, InterlinkError> {
        self.producer
            .as_ref()
            .map(|core| core.mode())
            .ok_or_else(|| LifecycleError::Unsupported("delivery modes").into())
    }

    /// Switch a producer's delivery mode without restarting it.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Unsupported`] for consumers,
    /// [`LifecycleError::Destroyed`] after `destroy`.
    pub async fn set_mode(&self, mode: ProducerMode) -> Result<(), InterlinkError> {
        let Some(core) = self.producer.as_ref() else {
            return Err(LifecycleError::Unsupported("delivery modes").into());
        };
        let mut state = self.state.lock().await;
        if state.status.is_destroyed() {
            return Err(LifecycleError::Destroyed.into());
        }
        core.set_mode(mode);
        state
            .config
            .insert(MODE_KEY.to_string(), serde_json::Value::String(mode.to_string()));
        self.publish_state(&state);
        Ok(())
    }

    /// Operator-issued trigger, independent of any route.
    ///
    /// Producers emit a manual trigger event; consumers run their trigger
    /// handler with a manual event.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NotStarted`] unless started, or the consumer
    /// handler's error.
    #[tracing::instrument(skip(self), fields(module_id = %self.id, type_name = %self.type_name))]
    pub async fn manual_trigger(&self) -> Result<(), InterlinkError> {
        if let Some(core) = self.producer.as_ref() {
            let state = self.state.lock().await;
            ensure_started(state.status)?;
            core.manual_trigger()?;
            return Ok(());
        }
        self.on_manual_trigger().await
    }

    /// Deliver a routed trigger-family event to this consumer.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error so the router can report it; the
    /// consumer stays ready for the next event.
    pub async fn on_trigger_event(&self, event: &TriggerEvent) -> Result<(), InterlinkError> {
        let state = self.state.lock().await;
        ensure_started(state.status)?;
        consumer_of(&*state.driver)?
            .handle_trigger_event(event)
            .await?;
        self.mark_triggered(TriggerOrigin::Auto);
        Ok(())
    }

    /// Deliver a routed stream-family event to this consumer.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error so the router can report it.
    pub async fn on_streaming_event(&self, event: &StreamEvent) -> Result<(), InterlinkError> {
        let state = self.state.lock().await;
        ensure_started(state.status)?;
        consumer_of(&*state.driver)?
            .handle_streaming_event(event)
            .await?;
        self.mark_triggered(TriggerOrigin::Auto);
        Ok(())
    }

    /// Operator-issued trigger on a consumer.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NotStarted`] unless started, or the handler's error.
    pub async fn on_manual_trigger(&self) -> Result<(), InterlinkError> {
        let state = self.state.lock().await;
        ensure_started(state.status)?;
        let event = TriggerEvent {
            value: serde_json::Value::Null,
            count: self.message_count() + 1,
            origin: TriggerOrigin::Manual,
            timestamp: now(),
        };
        consumer_of(&*state.driver)?
            .handle_trigger_event(&event)
            .await?;
        self.mark_triggered(TriggerOrigin::Manual);
        Ok(())
    }

    fn validate(
        &self,
        driver: &dyn ModuleDriver,
        config: &ModuleConfig,
    ) -> Result<(), ValidationError> {
        config.enabled()?;
        if self.role == ModuleRole::Producer {
            configured_mode(config)?;
        }
        driver.validate(config)
    }

    fn apply_mode(&self, config: &ModuleConfig) {
        if config.contains_key(MODE_KEY)
            && let (Some(core), Ok(mode)) = (self.producer.as_ref(), configured_mode(config))
        {
            core.set_mode(mode);
        }
    }

    async fn start_locked(&self, state: &mut ModuleState) -> Result<(), InterlinkError> {
        let ctx = DriverContext {
            module_id: self.id,
            emitter: self.producer.clone(),
            telemetry: Arc::clone(&self.telemetry),
        };
        let ModuleState { driver, config, .. } = &mut *state;
        let outcome =
            tokio::time::timeout(self.lifecycle_timeout, driver.acquire(config, &ctx)).await;
        let err = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(_) => Some(InterlinkError::Timeout {
                operation: "start",
                after: self.lifecycle_timeout,
            }),
        };
        if let Some(err) = err {
            tracing::warn!(%err, "module failed to start");
            driver.release().await;
            return Err(err);
        }

        state.status = state.status.transition(ModuleStatus::Started)?;
        if let Some(core) = self.producer.as_ref() {
            core.set_listening(true);
        }
        tracing::info!("module started");
        self.publish_state(state);
        Ok(())
    }

    async fn stop_locked(&self, state: &mut ModuleState) {
        if let Some(core) = self.producer.as_ref() {
            core.set_listening(false);
        }
        if tokio::time::timeout(self.lifecycle_timeout, state.driver.release())
            .await
            .is_err()
        {
            tracing::warn!(after = ?self.lifecycle_timeout, "driver release timed out");
        }
        state.status = ModuleStatus::Stopped;
        tracing::info!("module stopped");
        self.publish_state(state);
    }

    fn mark_triggered(&self, origin: TriggerOrigin) {
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.telemetry.emit(Telemetry::triggered(self.id, origin));
    }

    fn snapshot_of(&self, state: &ModuleState) -> ModuleSnapshot {
        ModuleSnapshot {
            id: self.id,
            type_name: self.type_name.clone(),
            role: self.role,
            status: state.status,
            config: state.config.clone(),
            message_count: self.message_count(),
            mode: self.producer.as_ref().map(|core| core.mode()),
        }
    }

    fn publish_state(&self, state: &ModuleState) {
        self.telemetry
            .emit(Telemetry::StateUpdate(self.snapshot_of(state)));
    }
}

fn configured_mode(config: &ModuleConfig) -> Result<ProducerMode, ValidationError> {
    config
        .str_or(MODE_KEY, "trigger")
        .and_then(str::parse)
}

fn ensure_started(status: ModuleStatus) -> Result<(), LifecycleError> {
    match status {
        ModuleStatus::Started => Ok(()),
        ModuleStatus::Destroyed => Err(LifecycleError::Destroyed),
        other => Err(LifecycleError::NotStarted(other)),
    }
}

fn consumer_of(driver: &dyn ModuleDriver) -> Result<&dyn ConsumerHandler, LifecycleError> {
    driver
        .as_consumer()
        .ok_or(LifecycleError::Unsupported("consumer events"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use interlink_domain::event::EventPayload;
    use serde_json::json;

    // ── Fake driver ───────────────────────────────────────────────

    #[derive(Default)]
    struct Calls {
        acquired: usize,
        released: usize,
        reconfigured: usize,
        triggers: usize,
        streams: usize,
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Acquire {
        Ok,
        Fail,
        Hang,
    }

    struct FakeDriver {
        role: ModuleRole,
        calls: Arc<Mutex<Calls>>,
        acquire: Acquire,
        fail_handler: Arc<std::sync::atomic::AtomicBool>,
    }

    impl FakeDriver {
        fn new(role: ModuleRole) -> (Self, Arc<Mutex<Calls>>) {
            let calls = Arc::new(Mutex::new(Calls::default()));
            (
                Self {
                    role,
                    calls: Arc::clone(&calls),
                    acquire: Acquire::Ok,
                    fail_handler: Arc::default(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl ModuleDriver for FakeDriver {
        fn role(&self) -> ModuleRole {
            self.role
        }

        fn validate(&self, config: &ModuleConfig) -> Result<(), ValidationError> {
            config.int_in_range("port", 8000, 1..=63999).map(|_| ())
        }

        fn restart_keys(&self) -> &'static [&'static str] {
            &["port", ENABLED_KEY]
        }

        async fn acquire(
            &mut self,
            _config: &ModuleConfig,
            _ctx: &DriverContext,
        ) -> Result<(), InterlinkError> {
            match self.acquire {
                Acquire::Ok => {
                    self.calls.lock().unwrap().acquired += 1;
                    Ok(())
                }
                Acquire::Fail => Err(InterlinkError::resource(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    "port busy",
                ))),
                Acquire::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }

        async fn release(&mut self) {
            self.calls.lock().unwrap().released += 1;
        }

        fn reconfigure(&mut self, _config: &ModuleConfig) {
            self.calls.lock().unwrap().reconfigured += 1;
        }

        fn as_consumer(&self) -> Option<&dyn ConsumerHandler> {
            match self.role {
                ModuleRole::Consumer => Some(self),
                ModuleRole::Producer => None,
            }
        }
    }

    #[async_trait]
    impl ConsumerHandler for FakeDriver {
        async fn handle_trigger_event(&self, _event: &TriggerEvent) -> Result<(), InterlinkError> {
            if self.fail_handler.load(Ordering::SeqCst) {
                return Err(InterlinkError::handler(std::io::Error::other("lamp offline")));
            }
            self.calls.lock().unwrap().triggers += 1;
            Ok(())
        }

        async fn handle_streaming_event(&self, _event: &StreamEvent) -> Result<(), InterlinkError> {
            self.calls.lock().unwrap().streams += 1;
            Ok(())
        }
    }

    // ── Spy telemetry ──────────────────────────────────────────────

    #[derive(Default)]
    struct SpyTelemetry {
        events: Mutex<Vec<Telemetry>>,
    }

    impl TelemetrySink for SpyTelemetry {
        fn emit(&self, telemetry: Telemetry) {
            self.events.lock().unwrap().push(telemetry);
        }
    }

    impl SpyTelemetry {
        fn statuses(&self) -> Vec<ModuleStatus> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|t| match t {
                    Telemetry::StateUpdate(s) => Some(s.status),
                    _ => None,
                })
                .collect()
        }

        fn triggers(&self, origin: TriggerOrigin) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|t| matches!(t, Telemetry::TriggerEvent { origin: o, .. } if *o == origin))
                .count()
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn config(value: serde_json::Value) -> ModuleConfig {
        value.as_object().cloned().unwrap()
    }

    fn module_with(driver: FakeDriver, cfg: ModuleConfig) -> (Module, Arc<SpyTelemetry>) {
        let spy = Arc::new(SpyTelemetry::default());
        let module = Module::new(ModuleId::new(), "calls", cfg, Box::new(driver), spy.clone())
            .with_lifecycle_timeout(Duration::from_millis(50));
        (module, spy)
    }

    async fn started(role: ModuleRole) -> (Module, Arc<Mutex<Calls>>, Arc<SpyTelemetry>) {
        let (driver, calls) = FakeDriver::new(role);
        let (module, spy) = module_with(driver, config(json!({ "port": 8000 })));
        module.initialize().await.unwrap();
        module.start().await.unwrap();
        (module, calls, spy)
    }

    fn trigger(value: i64) -> TriggerEvent {
        TriggerEvent {
            value: json!(value),
            count: 1,
            origin: TriggerOrigin::Auto,
            timestamp: now(),
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    #[tokio::test]
    async fn should_stay_created_when_initialize_rejects_config() {
        for bad in [0, 70000] {
            let (driver, calls) = FakeDriver::new(ModuleRole::Producer);
            let (module, _) = module_with(driver, config(json!({ "port": bad })));

            let result = module.initialize().await;

            assert!(matches!(
                result,
                Err(InterlinkError::Validation(ValidationError::OutOfRange { .. }))
            ));
            assert_eq!(module.status().await, ModuleStatus::Created);
            assert!(matches!(
                module.start().await,
                Err(InterlinkError::Lifecycle(LifecycleError::NotInitialized(_)))
            ));
            assert_eq!(calls.lock().unwrap().acquired, 0);
        }
    }

    #[tokio::test]
    async fn should_reject_invalid_mode_on_initialize() {
        let (driver, _) = FakeDriver::new(ModuleRole::Producer);
        let (module, _) = module_with(driver, config(json!({ "mode": "pulse" })));
        assert!(module.initialize().await.is_err());
    }

    #[tokio::test]
    async fn should_treat_second_start_as_noop() {
        let (module, calls, _) = started(ModuleRole::Producer).await;
        module.start().await.unwrap();
        assert_eq!(calls.lock().unwrap().acquired, 1);
        assert_eq!(module.status().await, ModuleStatus::Started);
    }

    #[tokio::test]
    async fn should_treat_stop_when_not_started_as_noop() {
        let (driver, calls) = FakeDriver::new(ModuleRole::Producer);
        let (module, _) = module_with(driver, ModuleConfig::new());
        module.initialize().await.unwrap();
        module.stop().await.unwrap();
        assert_eq!(calls.lock().unwrap().released, 0);
        assert_eq!(module.status().await, ModuleStatus::Initialized);
    }

    #[tokio::test]
    async fn should_alternate_between_started_and_stopped() {
        let (module, calls, spy) = started(ModuleRole::Producer).await;
        module.stop().await.unwrap();
        module.start().await.unwrap();
        module.stop().await.unwrap();

        assert_eq!(module.status().await, ModuleStatus::Stopped);
        assert_eq!(calls.lock().unwrap().acquired, 2);
        assert_eq!(calls.lock().unwrap().released, 2);
        assert_eq!(
            spy.statuses(),
            vec![
                ModuleStatus::Initialized,
                ModuleStatus::Started,
                ModuleStatus::Stopped,
                ModuleStatus::Started,
                ModuleStatus::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn should_keep_status_and_release_when_start_fails() {
        let (mut driver, calls) = FakeDriver::new(ModuleRole::Producer);
        driver.acquire = Acquire::Fail;
        let (module, _) = module_with(driver, ModuleConfig::new());
        module.initialize().await.unwrap();

        let result = module.start().await;

        assert!(matches!(result, Err(InterlinkError::Resource(_))));
        assert_eq!(module.status().await, ModuleStatus::Initialized);
        assert_eq!(calls.lock().unwrap().released, 1);
        assert!(!module.producer().unwrap().is_listening());
    }

    #[tokio::test]
    async fn should_time_out_when_start_hangs() {
        let (mut driver, _) = FakeDriver::new(ModuleRole::Producer);
        driver.acquire = Acquire::Hang;
        let (module, _) = module_with(driver, ModuleConfig::new());
        module.initialize().await.unwrap();

        let result = module.start().await;

        assert!(matches!(
            result,
            Err(InterlinkError::Timeout {
                operation: "start",
                ..
            })
        ));
        assert_eq!(module.status().await, ModuleStatus::Initialized);
    }

    #[tokio::test]
    async fn should_skip_start_when_disabled() {
        let (driver, calls) = FakeDriver::new(ModuleRole::Producer);
        let (module, _) = module_with(driver, config(json!({ "enabled": false })));
        module.initialize().await.unwrap();
        module.start().await.unwrap();
        assert_eq!(module.status().await, ModuleStatus::Initialized);
        assert_eq!(calls.lock().unwrap().acquired, 0);
    }

    #[tokio::test]
    async fn should_reject_calls_after_destroy() {
        let (module, calls, _) = started(ModuleRole::Producer).await;
        module.destroy().await;

        assert_eq!(module.status().await, ModuleStatus::Destroyed);
        assert_eq!(calls.lock().unwrap().released, 1);
        assert!(matches!(
            module.start().await,
            Err(InterlinkError::Lifecycle(LifecycleError::Destroyed))
        ));
        assert!(module.update_config(ModuleConfig::new()).await.is_err());
        assert!(module.take_emissions().is_none());
    }

    // ── Hot config ─────────────────────────────────────────────────

    #[tokio::test]
    async fn should_apply_non_restart_change_in_place() {
        let (module, calls, _) = started(ModuleRole::Producer).await;

        module
            .update_config(config(json!({ "port": 8000, "label": "desk" })))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.acquired, 1);
        assert_eq!(calls.released, 0);
        assert_eq!(calls.reconfigured, 1);
    }

    #[tokio::test]
    async fn should_restart_when_restart_key_changes() {
        let (module, calls, _) = started(ModuleRole::Producer).await;

        module
            .update_config(config(json!({ "port": 9000 })))
            .await
            .unwrap();

        assert_eq!(module.status().await, ModuleStatus::Started);
        assert_eq!(module.config().await["port"], json!(9000));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.acquired, 2);
        assert_eq!(calls.released, 1);
    }

    #[tokio::test]
    async fn should_stay_stopped_when_update_disables_module() {
        let (module, calls, _) = started(ModuleRole::Producer).await;

        module
            .update_config(config(json!({ "port": 8000, "enabled": false })))
            .await
            .unwrap();

        assert_eq!(module.status().await, ModuleStatus::Stopped);
        assert_eq!(calls.lock().unwrap().acquired, 1);
    }

    #[tokio::test]
    async fn should_start_again_when_update_re_enables_module() {
        let (module, calls, _) = started(ModuleRole::Producer).await;

        module
            .update_config(config(json!({ "port": 8000, "enabled": false })))
            .await
            .unwrap();
        assert_eq!(module.status().await, ModuleStatus::Stopped);

        module
            .update_config(config(json!({ "port": 8000, "enabled": true })))
            .await
            .unwrap();

        assert_eq!(module.status().await, ModuleStatus::Started);
        assert!(module.producer().unwrap().is_listening());
        assert_eq!(calls.lock().unwrap().acquired, 2);
    }

    #[tokio::test]
    async fn should_start_initialized_module_when_enabled_by_update() {
        let (driver, calls) = FakeDriver::new(ModuleRole::Consumer);
        let (module, _) = module_with(driver, config(json!({ "enabled": false })));
        module.initialize().await.unwrap();
        module.start().await.unwrap();
        assert_eq!(module.status().await, ModuleStatus::Initialized);

        module
            .update_config(config(json!({ "enabled": true })))
            .await
            .unwrap();

        assert_eq!(module.status().await, ModuleStatus::Started);
        assert_eq!(calls.lock().unwrap().acquired, 1);
    }

    #[tokio::test]
    async fn should_not_start_operator_stopped_module_when_enabled_unchanged() {
        let (module, calls, _) = started(ModuleRole::Producer).await;
        module.stop().await.unwrap();

        module
            .update_config(config(json!({ "port": 8000, "enabled": true })))
            .await
            .unwrap();

        assert_eq!(module.status().await, ModuleStatus::Stopped);
        assert_eq!(calls.lock().unwrap().acquired, 1);
    }

    #[tokio::test]
    async fn should_not_start_stopped_module_on_restart_key_change() {
        let (module, calls, _) = started(ModuleRole::Producer).await;
        module.stop().await.unwrap();

        module
            .update_config(config(json!({ "port": 9001 })))
            .await
            .unwrap();

        assert_eq!(module.status().await, ModuleStatus::Stopped);
        assert_eq!(calls.lock().unwrap().acquired, 1);
    }

    #[tokio::test]
    async fn should_keep_previous_config_when_update_is_invalid() {
        let (module, calls, _) = started(ModuleRole::Producer).await;

        let result = module.update_config(config(json!({ "port": 0 }))).await;

        assert!(matches!(result, Err(InterlinkError::Validation(_))));
        assert_eq!(module.config().await["port"], json!(8000));
        assert_eq!(module.status().await, ModuleStatus::Started);
        assert_eq!(calls.lock().unwrap().released, 0);
    }

    #[tokio::test]
    async fn should_apply_mode_from_config_in_place() {
        let (module, calls, _) = started(ModuleRole::Producer).await;
        module
            .update_config(config(json!({ "port": 8000, "mode": "streaming" })))
            .await
            .unwrap();
        assert_eq!(module.mode().unwrap(), ProducerMode::Streaming);
        assert_eq!(calls.lock().unwrap().acquired, 1);
    }

    // ── Producer ───────────────────────────────────────────────────

    #[tokio::test]
    async fn should_emit_nothing_after_stop_returns() {
        let (module, _, _) = started(ModuleRole::Producer).await;
        let mut rx = module.take_emissions().unwrap();
        let core = Arc::clone(module.producer().unwrap());

        module.stop().await.unwrap();

        assert!(core.ingest(json!(1)).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn should_behave_like_never_stopped_after_stop_start() {
        let (module, _, _) = started(ModuleRole::Producer).await;
        let mut rx = module.take_emissions().unwrap();
        let core = Arc::clone(module.producer().unwrap());

        core.ingest(json!(1));
        module.stop().await.unwrap();
        module.start().await.unwrap();
        core.ingest(json!(2));
        core.ingest(json!(2));

        let values: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.payload.value().clone())
            .collect();
        assert_eq!(values, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn should_switch_mode_without_restart() {
        let (module, calls, _) = started(ModuleRole::Producer).await;
        module.set_mode(ProducerMode::Streaming).await.unwrap();
        assert_eq!(module.mode().unwrap(), ProducerMode::Streaming);
        assert_eq!(module.config().await["mode"], json!("streaming"));
        assert_eq!(calls.lock().unwrap().acquired, 1);
    }

    #[tokio::test]
    async fn should_emit_manual_trigger_from_producer() {
        let (module, _, _) = started(ModuleRole::Producer).await;
        let mut rx = module.take_emissions().unwrap();
        module.manual_trigger().await.unwrap();
        let emission = rx.try_recv().unwrap();
        assert!(matches!(
            emission.payload,
            EventPayload::Trigger(TriggerEvent {
                origin: TriggerOrigin::Manual,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn should_reject_modes_on_consumer() {
        let (module, _, _) = started(ModuleRole::Consumer).await;
        assert!(module.mode().is_err());
        assert!(module.set_mode(ProducerMode::Trigger).await.is_err());
    }

    // ── Consumer ───────────────────────────────────────────────────

    #[tokio::test]
    async fn should_count_and_report_handled_trigger() {
        let (module, calls, spy) = started(ModuleRole::Consumer).await;

        module.on_trigger_event(&trigger(5)).await.unwrap();

        assert_eq!(calls.lock().unwrap().triggers, 1);
        assert_eq!(module.message_count(), 1);
        assert_eq!(spy.triggers(TriggerOrigin::Auto), 1);
    }

    #[tokio::test]
    async fn should_route_stream_events_to_stream_handler() {
        let (module, calls, _) = started(ModuleRole::Consumer).await;
        module
            .on_streaming_event(&StreamEvent {
                value: json!(3),
                timestamp: now(),
            })
            .await
            .unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.streams, 1);
        assert_eq!(calls.triggers, 0);
    }

    #[tokio::test]
    async fn should_propagate_handler_failure_and_recover() {
        let (driver, calls) = FakeDriver::new(ModuleRole::Consumer);
        let fail = Arc::clone(&driver.fail_handler);
        let (module, spy) = module_with(driver, ModuleConfig::new());
        module.initialize().await.unwrap();
        module.start().await.unwrap();

        fail.store(true, Ordering::SeqCst);
        let result = module.on_trigger_event(&trigger(1)).await;
        assert!(matches!(result, Err(InterlinkError::Handler(_))));
        assert_eq!(module.message_count(), 0);
        assert_eq!(spy.triggers(TriggerOrigin::Auto), 0);

        fail.store(false, Ordering::SeqCst);
        module.on_trigger_event(&trigger(2)).await.unwrap();
        assert_eq!(calls.lock().unwrap().triggers, 1);
        assert_eq!(module.message_count(), 1);
    }

    #[tokio::test]
    async fn should_reject_events_when_consumer_not_started() {
        let (driver, _) = FakeDriver::new(ModuleRole::Consumer);
        let (module, _) = module_with(driver, ModuleConfig::new());
        module.initialize().await.unwrap();
        assert!(matches!(
            module.on_trigger_event(&trigger(1)).await,
            Err(InterlinkError::Lifecycle(LifecycleError::NotStarted(
                ModuleStatus::Initialized
            )))
        ));
    }

    #[tokio::test]
    async fn should_handle_manual_trigger_on_consumer_without_routes() {
        let (module, calls, spy) = started(ModuleRole::Consumer).await;
        module.manual_trigger().await.unwrap();
        assert_eq!(calls.lock().unwrap().triggers, 1);
        assert_eq!(spy.triggers(TriggerOrigin::Manual), 1);
    }
}
