//! Log sink: a consumer that records every event it receives.
//!
//! Entries go to `tracing` and into a bounded in-memory [`LogBook`], which
//! callers can share with the driver to inspect what arrived.
//!
//! | Key | Default | Range | Restart |
//! |-----|---------|-------|---------|
//! | `label` | `log` | any string | no |
//! | `capacity` | `100` | 1 – 10 000 | no |

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use interlink_app::ports::{ConsumerHandler, DriverContext, ModuleDriver};
use interlink_domain::error::{InterlinkError, ValidationError};
use interlink_domain::event::{EventFamily, StreamEvent, TriggerEvent};
use interlink_domain::id::ModuleId;
use interlink_domain::module::{ConfigExt, ModuleConfig, ModuleRole};
use interlink_domain::time::Timestamp;

pub const LABEL_KEY: &str = "label";
pub const CAPACITY_KEY: &str = "capacity";
const DEFAULT_LABEL: &str = "log";
const DEFAULT_CAPACITY: i64 = 100;
const CAPACITY_RANGE: RangeInclusive<i64> = 1..=10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub family: EventFamily,
    pub value: Value,
    pub timestamp: Timestamp,
}

/// Shared, bounded record of received events. Oldest entries drop first.
pub type LogBook = Arc<Mutex<VecDeque<LogEntry>>>;

#[derive(Debug, Clone, PartialEq)]
struct Settings {
    label: String,
    capacity: usize,
}

impl Settings {
    fn from_config(config: &ModuleConfig) -> Result<Self, ValidationError> {
        let label = config.str_or(LABEL_KEY, DEFAULT_LABEL)?.to_string();
        let capacity = config.int_in_range(CAPACITY_KEY, DEFAULT_CAPACITY, CAPACITY_RANGE)?;
        Ok(Self {
            label,
            capacity: usize::try_from(capacity).unwrap_or(1),
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            capacity: 100,
        }
    }
}

/// Log sink consumer driver.
#[derive(Default)]
pub struct LogSink {
    module_id: Option<ModuleId>,
    settings: Settings,
    book: LogBook,
}

impl LogSink {
    #[must_use]
    pub fn with_book(book: LogBook) -> Self {
        Self {
            book,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn book(&self) -> LogBook {
        Arc::clone(&self.book)
    }

    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock_book().iter().cloned().collect()
    }

    fn lock_book(&self) -> std::sync::MutexGuard<'_, VecDeque<LogEntry>> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, entry: LogEntry) {
        tracing::info!(
            module_id = ?self.module_id,
            label = %self.settings.label,
            family = ?entry.family,
            value = %entry.value,
            "event logged"
        );
        let mut book = self.lock_book();
        book.push_back(entry);
        while book.len() > self.settings.capacity {
            book.pop_front();
        }
    }
}

#[async_trait]
impl ModuleDriver for LogSink {
    fn role(&self) -> ModuleRole {
        ModuleRole::Consumer
    }

    fn validate(&self, config: &ModuleConfig) -> Result<(), ValidationError> {
        Settings::from_config(config).map(|_| ())
    }

    async fn acquire(
        &mut self,
        config: &ModuleConfig,
        ctx: &DriverContext,
    ) -> Result<(), InterlinkError> {
        self.settings = Settings::from_config(config)?;
        self.module_id = Some(ctx.module_id);
        Ok(())
    }

    async fn release(&mut self) {}

    fn reconfigure(&mut self, config: &ModuleConfig) {
        if let Ok(settings) = Settings::from_config(config) {
            self.settings = settings;
        }
    }

    fn as_consumer(&self) -> Option<&dyn ConsumerHandler> {
        Some(self)
    }
}

#[async_trait]
impl ConsumerHandler for LogSink {
    async fn handle_trigger_event(&self, event: &TriggerEvent) -> Result<(), InterlinkError> {
        self.record(LogEntry {
            family: EventFamily::Trigger,
            value: event.value.clone(),
            timestamp: event.timestamp,
        });
        Ok(())
    }

    async fn handle_streaming_event(&self, event: &StreamEvent) -> Result<(), InterlinkError> {
        self.record(LogEntry {
            family: EventFamily::Stream,
            value: event.value.clone(),
            timestamp: event.timestamp,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interlink_app::ports::telemetry::NullTelemetry;
    use interlink_domain::event::TriggerOrigin;
    use interlink_domain::time::now;
    use serde_json::json;

    fn config(value: Value) -> ModuleConfig {
        value.as_object().cloned().unwrap()
    }

    async fn acquired(config: ModuleConfig) -> LogSink {
        let mut sink = LogSink::default();
        let ctx = DriverContext {
            module_id: ModuleId::new(),
            emitter: None,
            telemetry: Arc::new(NullTelemetry),
        };
        sink.acquire(&config, &ctx).await.unwrap();
        sink
    }

    fn stream(value: Value) -> StreamEvent {
        StreamEvent {
            value,
            timestamp: now(),
        }
    }

    #[tokio::test]
    async fn should_record_both_families() {
        let sink = acquired(ModuleConfig::new()).await;

        sink.handle_trigger_event(&TriggerEvent {
            value: json!(7),
            count: 1,
            origin: TriggerOrigin::Manual,
            timestamp: now(),
        })
        .await
        .unwrap();
        sink.handle_streaming_event(&stream(json!(8))).await.unwrap();

        let families: Vec<_> = sink.entries().iter().map(|e| e.family).collect();
        assert_eq!(families, vec![EventFamily::Trigger, EventFamily::Stream]);
    }

    #[tokio::test]
    async fn should_drop_oldest_entries_past_capacity() {
        let sink = acquired(config(json!({ "capacity": 2 }))).await;

        for value in 1..=3 {
            sink.handle_streaming_event(&stream(json!(value))).await.unwrap();
        }

        let values: Vec<_> = sink.entries().into_iter().map(|e| e.value).collect();
        assert_eq!(values, vec![json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn should_share_book_with_caller() {
        let book = LogBook::default();
        let mut sink = LogSink::with_book(Arc::clone(&book));
        sink.reconfigure(&config(json!({ "label": "hall" })));

        sink.handle_streaming_event(&stream(json!("x"))).await.unwrap();

        assert_eq!(book.lock().unwrap().len(), 1);
        assert_eq!(sink.settings.label, "hall");
    }

    #[test]
    fn should_reject_invalid_settings() {
        let sink = LogSink::default();
        assert!(sink.validate(&config(json!({ "capacity": 0 }))).is_err());
        assert!(sink.validate(&config(json!({ "label": 3 }))).is_err());
        assert!(sink.validate(&ModuleConfig::new()).is_ok());
    }
}
