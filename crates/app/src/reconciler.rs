//! Config reconciler: local drafts versus runtime-confirmed baselines.
//!
//! Operator edits land in [`ConfigDrafts`] immediately and are readable as
//! the effective config. Baselines pushed back by the runtime confirm (and
//! drop) matching draft fields. [`ConfigReconciler::commit`] ships every
//! effective config and queued topology edit to a [`CommitTarget`] and only
//! settles the drafts when the target accepts.

use std::sync::{Mutex, PoisonError};

use interlink_domain::config_draft::{CommitPayload, ConfigDrafts, TopologyEdit};
use interlink_domain::error::InterlinkError;
use interlink_domain::id::ModuleId;
use interlink_domain::module::ModuleConfig;

use crate::ports::CommitTarget;

/// Draft layer in front of a commit target.
pub struct ConfigReconciler<C> {
    drafts: Mutex<ConfigDrafts>,
    commit_lock: tokio::sync::Mutex<()>,
    target: C,
}

impl<C: CommitTarget> ConfigReconciler<C> {
    pub fn new(target: C) -> Self {
        Self {
            drafts: Mutex::new(ConfigDrafts::new()),
            commit_lock: tokio::sync::Mutex::new(()),
            target,
        }
    }

    pub fn target(&self) -> &C {
        &self.target
    }

    /// Merge one edited field and return the module's effective config.
    pub fn set_field(
        &self,
        module: ModuleId,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> ModuleConfig {
        self.lock().set_field(module, key, value)
    }

    /// `baseline` overlaid with the module's draft.
    pub fn effective_config(&self, module: ModuleId, baseline: &ModuleConfig) -> ModuleConfig {
        self.lock().effective_config(module, baseline)
    }

    /// Last known baseline overlaid with the module's draft.
    pub fn current_config(&self, module: ModuleId) -> ModuleConfig {
        self.lock().current_config(module)
    }

    /// Record a baseline pushed by the runtime; returns the draft keys it
    /// confirmed.
    pub fn reconcile(&self, module: ModuleId, baseline: ModuleConfig) -> Vec<String> {
        let confirmed = self.lock().reconcile(module, baseline);
        if !confirmed.is_empty() {
            tracing::debug!(module_id = %module, ?confirmed, "draft fields confirmed");
        }
        confirmed
    }

    pub fn record_topology(&self, edit: TopologyEdit) {
        self.lock().record_topology(edit);
    }

    pub fn is_dirty(&self, module: ModuleId) -> bool {
        self.lock().is_dirty(module)
    }

    pub fn has_pending_changes(&self) -> bool {
        self.lock().has_pending_changes()
    }

    /// What [`commit`](Self::commit) would send right now.
    pub fn pending(&self) -> CommitPayload {
        self.lock().snapshot()
    }

    /// Send every effective config and queued topology edit to the target.
    ///
    /// On success the committed drafts are cleared; edits made while the
    /// commit was in flight stay pending. On failure nothing changes.
    ///
    /// # Errors
    ///
    /// [`InterlinkError::Commit`] wrapping the target's rejection.
    #[tracing::instrument(skip(self))]
    pub async fn commit(&self) -> Result<(), InterlinkError> {
        let _serialized = self.commit_lock.lock().await;
        let payload = {
            let drafts = self.lock();
            if !drafts.has_pending_changes() {
                tracing::debug!("nothing to commit");
                return Ok(());
            }
            drafts.snapshot()
        };

        match self.target.apply(payload.clone()).await {
            Ok(()) => {
                self.lock().settle(&payload);
                tracing::info!(
                    configs = payload.configs.len(),
                    topology = payload.topology.len(),
                    "commit applied"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "commit rejected, drafts kept");
                Err(match err {
                    InterlinkError::Commit(_) => err,
                    other => InterlinkError::commit(other),
                })
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConfigDrafts> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
