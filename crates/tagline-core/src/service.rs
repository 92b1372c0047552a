use std::collections::HashMap;

use crate::Error;

/// Parent scope covering every note in the current user's collection.
pub const ALL_NOTES: &str = "notes/-";

/// Backend collaborator for tag aggregation.
///
/// One implementor per transport (SQLite, HTTP). All operations are
/// non-blocking requests; an in-flight request cannot be aborted, only
/// have its result ignored by the caller.
#[async_trait::async_trait]
pub trait TagService: Send + Sync {
    /// Current tag usage for the given scope. `skip_cache` asks the backend
    /// to bypass any server-side cache it keeps.
    async fn list_tags(&self, parent: &str, skip_cache: bool)
        -> Result<HashMap<String, i64>, Error>;

    /// Re-derive tag usage from note content for the whole scope. Returns
    /// only an acknowledgment; a follow-up [`TagService::list_tags`] call is
    /// required to observe the result.
    async fn rebuild_tags(&self, parent: &str) -> Result<(), Error>;

    /// Remove all associations of `tag` from notes in scope. Whether note
    /// content is rewritten is the backend's concern.
    async fn delete_tag(&self, parent: &str, tag: &str) -> Result<(), Error>;

    /// Rename `old` to `new` across all notes in scope.
    async fn rename_tag(&self, parent: &str, old: &str, new: &str) -> Result<(), Error>;
}
