//! Module adapter error types.

use interlink_domain::error::InterlinkError;

/// Errors raised while a built-in module acquires or uses IO resources.
#[derive(Debug, thiserror::Error)]
pub enum ModuleIoError {
    /// Binding a socket failed (address in use, permission denied, …).
    #[error("failed to bind {address}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The module needs a producer emitter but was started without one.
    #[error("module started without an emitter")]
    MissingEmitter,

    /// A domain-level error (validation, lifecycle, etc.).
    #[error("domain error")]
    Domain(#[source] InterlinkError),
}

impl ModuleIoError {
    /// Convert into an [`InterlinkError::Resource`] for propagation across
    /// port boundaries.
    #[must_use]
    pub fn into_domain(self) -> InterlinkError {
        match self {
            Self::Domain(err) => err,
            other => InterlinkError::resource(other),
        }
    }
}

impl From<ModuleIoError> for InterlinkError {
    fn from(err: ModuleIoError) -> Self {
        err.into_domain()
    }
}
