//! Interval timer: producer emitting a running tick count.
//!
//! | Key | Default | Range | Restart |
//! |-----|---------|-------|---------|
//! | `interval_ms` | `1000` | 10 – 3 600 000 | yes |
//! | `enabled` | `true` | | yes |
//! | `mode` | `trigger` | `trigger` / `streaming` | no |

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use interlink_app::ports::{DriverContext, ModuleDriver};
use interlink_app::producer::Emitter;
use interlink_domain::error::{InterlinkError, ValidationError};
use interlink_domain::module::{ConfigExt, ENABLED_KEY, ModuleConfig, ModuleRole};

use crate::error::ModuleIoError;

pub const INTERVAL_KEY: &str = "interval_ms";
pub const DEFAULT_INTERVAL_MS: i64 = 1000;
const INTERVAL_RANGE: RangeInclusive<i64> = 10..=3_600_000;

fn period(config: &ModuleConfig) -> Result<Duration, ValidationError> {
    let millis = config.int_in_range(INTERVAL_KEY, DEFAULT_INTERVAL_MS, INTERVAL_RANGE)?;
    Ok(Duration::from_millis(millis.unsigned_abs()))
}

/// Timer producer driver.
///
/// The tick count survives stop / start, so a restarted timer never repeats
/// a value the change-gate would swallow.
#[derive(Default)]
pub struct Timer {
    ticks: Arc<AtomicU64>,
    task: Option<(CancellationToken, JoinHandle<()>)>,
}

#[async_trait]
impl ModuleDriver for Timer {
    fn role(&self) -> ModuleRole {
        ModuleRole::Producer
    }

    fn validate(&self, config: &ModuleConfig) -> Result<(), ValidationError> {
        period(config).map(|_| ())
    }

    fn restart_keys(&self) -> &'static [&'static str] {
        &[INTERVAL_KEY, ENABLED_KEY]
    }

    async fn acquire(
        &mut self,
        config: &ModuleConfig,
        ctx: &DriverContext,
    ) -> Result<(), InterlinkError> {
        let emitter = ctx.emitter.clone().ok_or(ModuleIoError::MissingEmitter)?;
        let period = period(config)?;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(
            emitter,
            Arc::clone(&self.ticks),
            period,
            cancel.clone(),
        ));
        tracing::debug!(module_id = %ctx.module_id, ?period, "timer armed");
        self.task = Some((cancel, handle));
        Ok(())
    }

    async fn release(&mut self) {
        if let Some((cancel, handle)) = self.task.take() {
            cancel.cancel();
            if let Err(err) = handle.await {
                tracing::warn!(%err, "timer task ended abnormally");
            }
        }
    }
}

async fn tick_loop(
    emitter: Emitter,
    ticks: Arc<AtomicU64>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let tick = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                emitter.ingest(serde_json::Value::from(tick));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use interlink_app::module::Module;
    use interlink_app::ports::telemetry::NullTelemetry;
    use interlink_domain::id::ModuleId;
    use serde_json::json;

    fn config(value: serde_json::Value) -> ModuleConfig {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn should_reject_interval_out_of_range() {
        let timer = Timer::default();
        for interval in [0, 9, 3_600_001] {
            assert!(
                timer
                    .validate(&config(json!({ "interval_ms": interval })))
                    .is_err()
            );
        }
        assert!(timer.validate(&ModuleConfig::new()).is_ok());
    }

    #[tokio::test]
    async fn should_emit_increasing_tick_counts() {
        let module = Module::new(
            ModuleId::new(),
            crate::TIMER,
            config(json!({ "interval_ms": 10 })),
            Box::new(Timer::default()),
            Arc::new(NullTelemetry),
        );
        let mut rx = module.take_emissions().unwrap();
        module.initialize().await.unwrap();
        module.start().await.unwrap();

        let mut values = Vec::new();
        for _ in 0..3 {
            let emission = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            values.push(emission.payload.value().clone());
        }
        module.stop().await.unwrap();

        assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());

        module.start().await.unwrap();
        let after_restart = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(after_restart.payload.value().as_u64().unwrap() > 3);
        module.destroy().await;
    }
}
