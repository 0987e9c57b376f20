//! Telemetry port: fire-and-forget observations for dashboards and logs.

use std::sync::Arc;

use interlink_domain::telemetry::Telemetry;

/// Receives telemetry emitted by modules.
///
/// Implementations must not block and must never fail the caller; the core
/// expects no acknowledgement.
pub trait TelemetrySink: Send + Sync {
    /// Publish one observation to all current observers.
    fn emit(&self, telemetry: Telemetry);
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Arc<T> {
    fn emit(&self, telemetry: Telemetry) {
        (**self).emit(telemetry);
    }
}

/// Sink that drops everything. Handy where no observer is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn emit(&self, _telemetry: Telemetry) {}
}
