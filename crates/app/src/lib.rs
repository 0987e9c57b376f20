//! # interlink-app
//!
//! Application layer: the module runtime and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `ModuleDriver`: device-specific resource handling for one module type
//!   - `ConsumerHandler`: device-specific reaction to trigger / stream events
//!   - `TelemetrySink`: fire-and-forget outbound observations
//!   - `CommitTarget`: receiver of reconciler commits
//! - Provide the shared behaviour every module obeys:
//!   - `Module`: lifecycle state machine, hot config reconciliation
//!   - `ProducerCore`: change-gate and trigger / streaming emission
//! - Resolve and dispatch routes (`InteractionRouter`)
//! - Track local config drafts against confirmed baselines (`ConfigReconciler`)
//! - Instantiate modules by type name (`ModuleRegistry`) and run whole
//!   interactions (`InteractionRuntime`, `Runtime`)
//! - Keep every module id owned by one live interaction (`ModuleOwners`)
//! - Provide **in-process infrastructure** (telemetry bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `interlink-domain` only (plus `tokio` for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod interaction_runtime;
pub mod module;
pub mod ownership;
pub mod ports;
pub mod producer;
pub mod reconciler;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod telemetry_bus;
