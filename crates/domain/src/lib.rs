//! # interlink-domain
//!
//! Pure domain model for the interlink module runtime.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error taxonomy, timestamps
//! - Define **Modules** (lifecycle status machine, configuration maps, snapshots)
//! - Define **Events** (trigger / stream payloads emitted by producers)
//! - Define **Telemetry** (outbound, fire-and-forget observations)
//! - Define **Interactions** and **Routes** (declarative producer → consumer graphs)
//! - Maintain the **route table** invariant and build dispatch indexes
//! - Hold the **config draft** layering used to reconcile local edits with
//!   runtime-confirmed baselines
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod config_draft;
pub mod event;
pub mod interaction;
pub mod module;
pub mod routing;
pub mod telemetry;
