//! In-process telemetry bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use interlink_domain::telemetry::Telemetry;

use crate::ports::TelemetrySink;

/// In-process telemetry bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the observation is simply dropped). Slow subscribers lag rather than
/// block modules.
#[derive(Clone)]
pub struct TelemetryBus {
    sender: broadcast::Sender<Telemetry>,
}

impl TelemetryBus {
    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to telemetry on this bus.
    ///
    /// Returns a receiver that will get everything published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Telemetry> {
        self.sender.subscribe()
    }
}

impl TelemetrySink for TelemetryBus {
    fn emit(&self, telemetry: Telemetry) {
        // fails only when nobody is subscribed
        let _ = self.sender.send(telemetry);
    }
}
