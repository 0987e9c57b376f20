//! Error taxonomy shared across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`InterlinkError`] via `#[from]` or an explicit `From` impl.
//!
//! | Kind | Raised by | Surfaced? |
//! |------|-----------|-----------|
//! | [`ValidationError`] | `initialize`, `update_config` | yes, fails that call |
//! | `Resource` | `start` | yes, module stays not-started |
//! | [`ProcessingError`] | producer decode path | no, logged only |
//! | `Handler` | consumer handlers | to the router, which logs it |
//! | `Commit` | reconciler `commit` | yes, drafts are preserved |

use std::time::Duration;

use crate::module::ModuleStatus;

/// Boxed error used for opaque sources coming from adapters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error for every fallible runtime operation.
#[derive(Debug, thiserror::Error)]
pub enum InterlinkError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("lifecycle error")]
    Lifecycle(#[from] LifecycleError),

    /// A listener, timer or other external resource could not be acquired.
    #[error("resource error")]
    Resource(#[source] BoxError),

    /// A bounded operation did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// A consumer's device-specific handler failed.
    #[error("handler error")]
    Handler(#[source] BoxError),

    /// The runtime rejected a reconciler commit.
    #[error("commit rejected")]
    Commit(#[source] BoxError),
}

impl InterlinkError {
    /// Wrap any error as a resource acquisition failure.
    pub fn resource(err: impl Into<BoxError>) -> Self {
        Self::Resource(err.into())
    }

    /// Wrap any error as a consumer handler failure.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    /// Wrap any error as a rejected commit.
    pub fn commit(err: impl Into<BoxError>) -> Self {
        Self::Commit(err.into())
    }
}

/// Bad configuration range or shape, or an invalid definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("field `{field}` must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        actual: i64,
    },

    #[error("field `{field}` must be {expected}")]
    InvalidType {
        field: String,
        expected: &'static str,
    },

    #[error("unknown module type `{0}`")]
    UnknownModuleType(String),

    #[error("module {0} is declared more than once")]
    DuplicateModule(String),

    #[error("route {route} references module {module} which is not part of the interaction")]
    DanglingRoute { route: String, module: String },

    #[error("module {0} is already owned by another interaction")]
    ModuleAlreadyOwned(String),
}

/// A referenced object does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A lifecycle call that is not valid in the module's current status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot transition from {from} to {to}")]
    InvalidTransition { from: ModuleStatus, to: ModuleStatus },

    #[error("module must be initialized first (status: {0})")]
    NotInitialized(ModuleStatus),

    #[error("module is not started (status: {0})")]
    NotStarted(ModuleStatus),

    #[error("module is destroyed")]
    Destroyed,

    #[error("module does not support {0}")]
    Unsupported(&'static str),
}

/// Malformed input reaching a producer's decode path.
///
/// Never propagated past the module boundary; producers log it and keep
/// processing subsequent packets.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessingError {
    #[error("expected an array payload, got {0}")]
    NotAnArray(&'static str),

    #[error("expected a numeric payload, got {0}")]
    NotANumber(&'static str),

    #[error("field {index} is {value}, expected a byte (0-255)")]
    FieldOutOfRange { index: usize, value: u64 },

    #[error("payload is not valid JSON: {0}")]
    Malformed(String),
}

/// Short name of a JSON value's kind, for error messages.
#[must_use]
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
