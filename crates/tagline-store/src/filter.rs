//! Active tag filter for scoping the note listing.

use std::sync::Mutex;

/// Holds the at-most-one tag filter currently in effect for the note list.
///
/// The coordinator only replaces the value; toggle semantics (selecting the
/// active tag clears it) belong to the caller, see
/// [`TagSession::toggle_tag_filter`](crate::TagSession::toggle_tag_filter).
#[derive(Debug, Default)]
pub struct FilterCoordinator {
    tag: Mutex<Option<String>>,
}

impl FilterCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active filter. Setting the current value again is a no-op.
    pub fn set_tag_filter(&self, tag: Option<String>) {
        *self.tag.lock().unwrap() = tag;
    }

    /// The currently active tag filter, if any.
    pub fn tag_filter(&self) -> Option<String> {
        self.tag.lock().unwrap().clone()
    }

    /// Whether `tag` is the active filter.
    pub fn is_active(&self, tag: &str) -> bool {
        self.tag.lock().unwrap().as_deref() == Some(tag)
    }
}
