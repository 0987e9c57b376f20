//! Commit port: where the reconciler sends bundled drafts.

use std::future::Future;

use interlink_domain::config_draft::CommitPayload;
use interlink_domain::error::InterlinkError;

/// Applies a committed payload (configs + topology edits) to the runtime.
///
/// An `Err` means the runtime rejected the commit; the reconciler then keeps
/// every draft untouched.
pub trait CommitTarget {
    fn apply(
        &self,
        payload: CommitPayload,
    ) -> impl Future<Output = Result<(), InterlinkError>> + Send;
}

impl<T: CommitTarget + Send + Sync> CommitTarget for std::sync::Arc<T> {
    fn apply(
        &self,
        payload: CommitPayload,
    ) -> impl Future<Output = Result<(), InterlinkError>> + Send {
        (**self).apply(payload)
    }
}
