//! # interlink-adapter-modules
//!
//! Built-in module types, registered by name into a
//! [`ModuleRegistry`](interlink_app::registry::ModuleRegistry).
//!
//! ## Provided modules
//!
//! | Type name | Role | Behaviour |
//! |-----------|------|-----------|
//! | `frame_listener` | producer | UDP listener; each JSON `[high, low]` datagram decodes to one 16-bit frame number |
//! | `timer` | producer | Emits a running tick count every `interval_ms` |
//! | `virtual_light` | consumer | Trigger events toggle the light; stream events set brightness |
//! | `log` | consumer | Logs and keeps the most recent events it received |
//!
//! ## Dependency rule
//!
//! Depends on `interlink-app` (port traits) and `interlink-domain` only.

pub mod error;
pub mod frame_listener;
pub mod light;
pub mod log_sink;
pub mod timer;

use interlink_app::registry::ModuleRegistry;

pub use frame_listener::FrameListener;
pub use light::VirtualLight;
pub use log_sink::LogSink;
pub use timer::Timer;

pub const FRAME_LISTENER: &str = "frame_listener";
pub const TIMER: &str = "timer";
pub const VIRTUAL_LIGHT: &str = "virtual_light";
pub const LOG: &str = "log";

/// Register every built-in module type.
pub fn register_builtin(registry: &mut ModuleRegistry) -> &mut ModuleRegistry {
    registry
        .register(FRAME_LISTENER, || Box::new(FrameListener::default()))
        .register(TIMER, || Box::new(Timer::default()))
        .register(VIRTUAL_LIGHT, || Box::new(VirtualLight::default()))
        .register(LOG, || Box::new(LogSink::default()))
}
