//! Tag aggregate store: the session's registry of tag usage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use tagline_core::{normalize_tag, Error, TagCount, TagRegistry, TagService};

/// Session-owned aggregate of tag usage, kept in sync with one backend.
///
/// All registry mutation funnels through [`TagStore::fetch`]: every applied
/// response replaces the registry wholesale, never merges. Responses are
/// applied in the order they resolve; a response that resolves after a
/// higher-generation response has been applied is discarded and surfaces
/// [`Error::Cancelled`]. No lock is held across an await.
pub struct TagStore {
    service: Arc<dyn TagService>,
    parent: String,
    issued: AtomicU64,
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    registry: TagRegistry,
    /// A fetch response has been applied since init/reset.
    primed: bool,
    /// Generation of the newest applied response.
    applied: u64,
}

impl TagStore {
    pub fn new(service: Arc<dyn TagService>, parent: impl Into<String>) -> Self {
        Self {
            service,
            parent: parent.into(),
            issued: AtomicU64::new(0),
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Fetch the tag registry.
    ///
    /// With `skip_cache == false`, a previously applied result is returned
    /// without a backend call. Otherwise the backend is queried and its
    /// response replaces the registry entirely. On failure the previous
    /// registry is left unchanged and the error propagates; there is no
    /// automatic retry.
    pub async fn fetch(&self, skip_cache: bool) -> Result<TagRegistry, Error> {
        if !skip_cache {
            let state = self.state.lock().unwrap();
            if state.primed {
                debug!(tags = state.registry.len(), "tag fetch served from cache");
                return Ok(state.registry.clone());
            }
        }

        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let amounts = self.service.list_tags(&self.parent, skip_cache).await?;
        let registry = TagRegistry::from_amounts(amounts)?;

        let mut state = self.state.lock().unwrap();
        if generation <= state.applied {
            debug!(
                generation,
                applied = state.applied,
                "stale tag response discarded"
            );
            return Err(Error::Cancelled);
        }
        state.applied = generation;
        state.primed = true;
        state.registry = registry;
        debug!(generation, tags = state.registry.len(), "tag registry replaced");
        Ok(state.registry.clone())
    }

    /// Rebuild the backend tag index for the whole scope, then force-refresh.
    ///
    /// The registry is not touched until the rebuild acknowledgment succeeds;
    /// a failed rebuild propagates without a refresh attempt.
    pub async fn rebuild(&self) -> Result<TagRegistry, Error> {
        self.service.rebuild_tags(&self.parent).await?;
        info!(parent = %self.parent, "tag index rebuilt");
        self.fetch(true).await
    }

    /// Delete a tag on the backend, then force-refresh.
    ///
    /// Always a full refresh rather than a local patch: deletion can rewrite
    /// note content and thereby change other tags' counts.
    pub async fn delete(&self, tag: &str) -> Result<TagRegistry, Error> {
        let tag = normalize_tag(tag)?;
        self.service.delete_tag(&self.parent, &tag).await?;
        info!(tag = %tag, "tag deleted");
        self.fetch(true).await
    }

    /// Rename a tag on the backend, then force-refresh.
    pub async fn rename(&self, old: &str, new: &str) -> Result<TagRegistry, Error> {
        let old = normalize_tag(old)?;
        let new = normalize_tag(new)?;
        if old == new {
            return Err(Error::Validation(
                "old and new tag names are identical".into(),
            ));
        }
        self.service.rename_tag(&self.parent, &old, &new).await?;
        info!(old = %old, new = %new, "tag renamed");
        self.fetch(true).await
    }

    /// Snapshot of the current registry.
    pub fn registry(&self) -> TagRegistry {
        self.state.lock().unwrap().registry.clone()
    }

    /// Display-ordered (count desc, name asc) view of the registry.
    pub fn ordered_tags(&self) -> Vec<TagCount> {
        self.state.lock().unwrap().registry.ordered()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().registry.is_empty()
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// Clear the registry and cache flag. Generations stay monotonic so a
    /// response from before the reset can still be recognized as stale.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.registry.clear();
        state.primed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use tagline_core::mock::MockTagService;
    use tagline_core::ALL_NOTES;
    use tokio::sync::oneshot;

    fn store_with(service: Arc<MockTagService>) -> TagStore {
        TagStore::new(service, ALL_NOTES)
    }

    #[tokio::test]
    async fn test_forced_fetch_replaces_entirely() {
        let service = Arc::new(MockTagService::new().with_tags([("x", 1)]));
        let store = store_with(service.clone());

        store.fetch(true).await.unwrap();
        assert_eq!(store.registry().get("x"), Some(1));

        service.set_tags([("y", 2)]);
        let registry = store.fetch(true).await.unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("y"), Some(2));
        assert!(!registry.contains("x"));
    }

    #[tokio::test]
    async fn test_cached_fetch_skips_backend() {
        let service = Arc::new(MockTagService::new().with_tags([("x", 1)]));
        let store = store_with(service.clone());

        store.fetch(false).await.unwrap();
        assert_eq!(service.list_call_count(), 1);

        service.set_tags([("y", 2)]);
        let registry = store.fetch(false).await.unwrap();
        assert_eq!(service.list_call_count(), 1);
        assert_eq!(registry.get("x"), Some(1));
    }

    #[tokio::test]
    async fn test_reset_invalidates_cache() {
        let service = Arc::new(MockTagService::new().with_tags([("x", 1)]));
        let store = store_with(service.clone());

        store.fetch(false).await.unwrap();
        store.reset();
        assert!(store.is_empty());

        store.fetch(false).await.unwrap();
        assert_eq!(service.list_call_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_registry_untouched() {
        let service = Arc::new(MockTagService::new().with_tags([("x", 1)]));
        let store = store_with(service.clone());

        store.fetch(true).await.unwrap();
        service.fail_next_list(Error::BackendUnavailable("connection refused".into()));

        let err = store.fetch(true).await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert_eq!(store.registry().get("x"), Some(1));
    }

    #[tokio::test]
    async fn test_invalid_response_leaves_registry_untouched() {
        let service = Arc::new(MockTagService::new().with_tags([("x", 1)]));
        let store = store_with(service.clone());

        store.fetch(true).await.unwrap();
        service.set_tags([("bad", -3)]);

        let err = store.fetch(true).await.unwrap_err();
        assert!(matches!(err, Error::BackendRejected(_)));
        assert_eq!(store.registry().get("x"), Some(1));
    }

    #[tokio::test]
    async fn test_rebuild_failure_skips_refresh() {
        let service = Arc::new(MockTagService::new().with_tags([("x", 1)]));
        let store = store_with(service.clone());

        store.fetch(true).await.unwrap();
        service.fail_next_rebuild(Error::BackendUnavailable("connection reset".into()));

        let err = store.rebuild().await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert_eq!(store.registry().get("x"), Some(1));
        // One list call from the initial fetch, none from the failed rebuild.
        assert_eq!(service.list_call_count(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_success_refreshes() {
        let service = Arc::new(
            MockTagService::new()
                .with_tags([("stale", 9)])
                .with_rebuilt_tags([("fresh", 4)]),
        );
        let store = store_with(service.clone());

        store.fetch(true).await.unwrap();
        let registry = store.rebuild().await.unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("fresh"), Some(4));
    }

    #[tokio::test]
    async fn test_delete_refreshes_from_backend() {
        let service = Arc::new(MockTagService::new().with_tags([("a", 2), ("b", 5)]));
        let store = store_with(service.clone());

        store.fetch(true).await.unwrap();
        let registry = store.delete("a").await.unwrap();
        assert!(!registry.contains("a"));
        assert_eq!(registry.get("b"), Some(5));
    }

    #[tokio::test]
    async fn test_delete_failure_leaves_registry_untouched() {
        let service = Arc::new(MockTagService::new().with_tags([("a", 2)]));
        let store = store_with(service.clone());

        store.fetch(true).await.unwrap();
        service.fail_next_delete(Error::BackendRejected("tag is protected".into()));

        let err = store.delete("a").await.unwrap_err();
        assert!(matches!(err, Error::BackendRejected(_)));
        assert_eq!(store.registry().get("a"), Some(2));
    }

    #[tokio::test]
    async fn test_delete_rejects_empty_tag_before_backend() {
        let service = Arc::new(MockTagService::new());
        let store = store_with(service.clone());

        let err = store.delete("  ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rename_rejects_identical_names() {
        let service = Arc::new(MockTagService::new().with_tags([("a", 2)]));
        let store = store_with(service.clone());

        let err = store.rename("a", " a ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rename_refreshes_from_backend() {
        let service = Arc::new(MockTagService::new().with_tags([("old", 2)]));
        let store = store_with(service.clone());

        let registry = store.rename("old", "new").await.unwrap();
        assert_eq!(registry.get("new"), Some(2));
        assert!(!registry.contains("old"));
    }

    /// Service whose list responses resolve only when the test releases them,
    /// so resolution order can be controlled independently of issue order.
    struct GatedService {
        gates: Mutex<VecDeque<oneshot::Receiver<HashMap<String, i64>>>>,
    }

    impl GatedService {
        fn new(gates: Vec<oneshot::Receiver<HashMap<String, i64>>>) -> Self {
            Self {
                gates: Mutex::new(gates.into()),
            }
        }

        fn gates_remaining(&self) -> usize {
            self.gates.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl TagService for GatedService {
        async fn list_tags(
            &self,
            _parent: &str,
            _skip_cache: bool,
        ) -> Result<HashMap<String, i64>, Error> {
            let gate = self.gates.lock().unwrap().pop_front().expect("gate queued");
            gate.await
                .map_err(|_| Error::BackendUnavailable("gate dropped".into()))
        }

        async fn rebuild_tags(&self, _parent: &str) -> Result<(), Error> {
            Ok(())
        }

        async fn delete_tag(&self, _parent: &str, _tag: &str) -> Result<(), Error> {
            Ok(())
        }

        async fn rename_tag(&self, _parent: &str, _old: &str, _new: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    async fn wait_for_gate_taken(service: &Arc<GatedService>, remaining: usize) {
        while service.gates_remaining() != remaining {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_stale_response_discarded() {
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let service = Arc::new(GatedService::new(vec![first_rx, second_rx]));
        let store = Arc::new(TagStore::new(
            service.clone() as Arc<dyn TagService>,
            ALL_NOTES,
        ));

        let first = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.fetch(true).await }
        });
        wait_for_gate_taken(&service, 1).await;

        let second = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.fetch(true).await }
        });
        wait_for_gate_taken(&service, 0).await;

        // The newer request resolves first and is applied.
        second_tx
            .send(HashMap::from([("new".to_string(), 2)]))
            .unwrap();
        let applied = second.await.unwrap().unwrap();
        assert_eq!(applied.get("new"), Some(2));

        // The older request resolves late and must be discarded.
        first_tx
            .send(HashMap::from([("old".to_string(), 1)]))
            .unwrap();
        let err = first.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());

        let registry = store.registry();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("new"), Some(2));
    }

    #[tokio::test]
    async fn test_in_order_responses_both_apply() {
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let service = Arc::new(GatedService::new(vec![first_rx, second_rx]));
        let store = Arc::new(TagStore::new(
            service.clone() as Arc<dyn TagService>,
            ALL_NOTES,
        ));

        let first = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.fetch(true).await }
        });
        wait_for_gate_taken(&service, 1).await;

        let second = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.fetch(true).await }
        });
        wait_for_gate_taken(&service, 0).await;

        first_tx
            .send(HashMap::from([("old".to_string(), 1)]))
            .unwrap();
        first.await.unwrap().unwrap();

        second_tx
            .send(HashMap::from([("new".to_string(), 2)]))
            .unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(store.registry().get("new"), Some(2));
        assert!(!store.registry().contains("old"));
    }
}
