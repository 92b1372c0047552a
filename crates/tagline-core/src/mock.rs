//! Mock tag backend for deterministic testing.
//!
//! A stateful fake: it keeps an in-memory "backend truth" tag set that
//! list/delete/rename operate on, plus per-operation failure queues and a
//! call log for asserting how consumers drive the service.
//!
//! ```rust
//! use tagline_core::mock::MockTagService;
//!
//! let service = MockTagService::new()
//!     .with_tags([("work", 3), ("ideas", 1)]);
//! service.fail_next_list(tagline_core::Error::BackendUnavailable("offline".into()));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::{Error, TagService};

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub op: &'static str,
    pub detail: String,
}

#[derive(Default)]
struct MockState {
    tags: HashMap<String, i64>,
    rebuilt: Option<HashMap<String, i64>>,
    list_failures: VecDeque<Error>,
    rebuild_failures: VecDeque<Error>,
    delete_failures: VecDeque<Error>,
    rename_failures: VecDeque<Error>,
}

/// Mock implementation of [`TagService`].
#[derive(Default)]
pub struct MockTagService {
    state: Mutex<MockState>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockTagService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend tag set.
    pub fn with_tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        {
            let mut state = self.state.lock().unwrap();
            state.tags = tags.into_iter().map(|(n, c)| (n.into(), c)).collect();
        }
        self
    }

    /// Tag set a successful rebuild switches the backend to. Without this,
    /// rebuild is an acknowledged no-op.
    pub fn with_rebuilt_tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        {
            let mut state = self.state.lock().unwrap();
            state.rebuilt = Some(tags.into_iter().map(|(n, c)| (n.into(), c)).collect());
        }
        self
    }

    /// Replace the backend tag set mid-test.
    pub fn set_tags<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut state = self.state.lock().unwrap();
        state.tags = tags.into_iter().map(|(n, c)| (n.into(), c)).collect();
    }

    /// Queue a failure for the next `list_tags` call.
    pub fn fail_next_list(&self, err: Error) {
        self.state.lock().unwrap().list_failures.push_back(err);
    }

    /// Queue a failure for the next `rebuild_tags` call.
    pub fn fail_next_rebuild(&self, err: Error) {
        self.state.lock().unwrap().rebuild_failures.push_back(err);
    }

    /// Queue a failure for the next `delete_tag` call.
    pub fn fail_next_delete(&self, err: Error) {
        self.state.lock().unwrap().delete_failures.push_back(err);
    }

    /// Queue a failure for the next `rename_tag` call.
    pub fn fail_next_rename(&self, err: Error) {
        self.state.lock().unwrap().rename_failures.push_back(err);
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of `list_tags` calls recorded so far.
    pub fn list_call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == "list_tags")
            .count()
    }

    fn record(&self, op: &'static str, detail: String) {
        self.calls.lock().unwrap().push(MockCall { op, detail });
    }
}

#[async_trait::async_trait]
impl TagService for MockTagService {
    async fn list_tags(
        &self,
        parent: &str,
        skip_cache: bool,
    ) -> Result<HashMap<String, i64>, Error> {
        self.record(
            "list_tags",
            format!("parent={} skip_cache={}", parent, skip_cache),
        );
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.list_failures.pop_front() {
            return Err(err);
        }
        Ok(state.tags.clone())
    }

    async fn rebuild_tags(&self, parent: &str) -> Result<(), Error> {
        self.record("rebuild_tags", format!("parent={}", parent));
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.rebuild_failures.pop_front() {
            return Err(err);
        }
        if let Some(rebuilt) = state.rebuilt.clone() {
            state.tags = rebuilt;
        }
        Ok(())
    }

    async fn delete_tag(&self, parent: &str, tag: &str) -> Result<(), Error> {
        self.record("delete_tag", format!("parent={} tag={}", parent, tag));
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.delete_failures.pop_front() {
            return Err(err);
        }
        if state.tags.remove(tag).is_none() {
            return Err(Error::BackendRejected(format!("unknown tag \"{}\"", tag)));
        }
        Ok(())
    }

    async fn rename_tag(&self, parent: &str, old: &str, new: &str) -> Result<(), Error> {
        self.record(
            "rename_tag",
            format!("parent={} old={} new={}", parent, old, new),
        );
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.rename_failures.pop_front() {
            return Err(err);
        }
        let count = match state.tags.remove(old) {
            Some(count) => count,
            None => return Err(Error::BackendRejected(format!("unknown tag \"{}\"", old))),
        };
        *state.tags.entry(new.to_string()).or_insert(0) += count;
        Ok(())
    }
}
