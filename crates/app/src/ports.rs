//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the runtime and the adapter
//! layer can depend on them without creating circular dependencies.

pub mod commit;
pub mod driver;
pub mod telemetry;

pub use commit::CommitTarget;
pub use driver::{ConsumerHandler, DriverContext, ModuleDriver};
pub use telemetry::TelemetrySink;
