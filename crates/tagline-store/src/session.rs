//! Session container owning the store, filter, and sync trigger.

use std::sync::Arc;

use tracing::debug;

use tagline_core::{normalize_tag, ConfirmRequest, ConfirmationSurface, Error, TagService};

use crate::{FilterCoordinator, SessionConfig, SyncTrigger, TagStore};

/// Explicitly owned state container for one client session.
///
/// Created at session start, handed by reference to consumers, reset at
/// session end; never an ambient singleton. Destructive operations go
/// through a [`ConfirmationSurface`] and run only on explicit confirmation.
pub struct TagSession {
    store: Arc<TagStore>,
    filter: FilterCoordinator,
    trigger: SyncTrigger,
}

impl TagSession {
    pub fn new(service: Arc<dyn TagService>, config: SessionConfig) -> Self {
        let store = Arc::new(TagStore::new(service, config.parent));
        let trigger = SyncTrigger::new(Arc::clone(&store), config.debounce);
        Self {
            store,
            filter: FilterCoordinator::new(),
            trigger,
        }
    }

    pub fn store(&self) -> &Arc<TagStore> {
        &self.store
    }

    pub fn filter(&self) -> &FilterCoordinator {
        &self.filter
    }

    /// Feed the current visible note-collection size; a change schedules a
    /// debounced registry refresh.
    pub fn note_count_changed(&self, size: usize) {
        self.trigger.observe(size);
    }

    /// Select a tag: selecting the active one clears the filter, any other
    /// tag replaces it.
    pub fn toggle_tag_filter(&self, tag: &str) {
        if self.filter.is_active(tag) {
            self.filter.set_tag_filter(None);
        } else {
            self.filter.set_tag_filter(Some(tag.to_string()));
        }
    }

    /// Rebuild the backend tag index after confirmation. Returns `false`
    /// when the surface declined; the backend is not contacted in that case.
    pub async fn rebuild_all(&self, confirm: &dyn ConfirmationSurface) -> Result<bool, Error> {
        if !confirm.confirm(ConfirmRequest::RebuildAll).await {
            return Ok(false);
        }
        match self.store.rebuild().await {
            Ok(_) => Ok(true),
            // A newer response was applied while the trailing refresh was in
            // flight; the rebuild itself was acknowledged.
            Err(Error::Cancelled) => Ok(true),
            Err(err) => Err(err),
        }
    }

    /// Delete a tag after confirmation. Returns `false` when declined.
    pub async fn delete_tag(
        &self,
        tag: &str,
        confirm: &dyn ConfirmationSurface,
    ) -> Result<bool, Error> {
        let tag = normalize_tag(tag)?;
        let request = ConfirmRequest::DeleteTag { tag: tag.clone() };
        if !confirm.confirm(request).await {
            return Ok(false);
        }
        match self.store.delete(&tag).await {
            Ok(_) | Err(Error::Cancelled) => Ok(true),
            Err(err) => Err(err),
        }
    }

    /// Rename a tag after confirmation. Returns `false` when declined.
    pub async fn rename_tag(
        &self,
        old: &str,
        new: &str,
        confirm: &dyn ConfirmationSurface,
    ) -> Result<bool, Error> {
        let old = normalize_tag(old)?;
        let new = normalize_tag(new)?;
        let request = ConfirmRequest::RenameTag {
            old: old.clone(),
            new: new.clone(),
        };
        if !confirm.confirm(request).await {
            return Ok(false);
        }
        match self.store.rename(&old, &new).await {
            Ok(_) | Err(Error::Cancelled) => Ok(true),
            Err(err) => Err(err),
        }
    }

    /// Clear session state: pending refresh, filter, and registry.
    pub fn reset(&self) {
        self.trigger.cancel();
        self.filter.set_tag_filter(None);
        self.store.reset();
        debug!("tag session reset");
    }
}
