/// What a confirmation surface is being asked to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmRequest {
    RebuildAll,
    DeleteTag { tag: String },
    RenameTag { old: String, new: String },
}

/// User-facing confirmation collaborator for destructive operations.
///
/// A surface resolves each request exactly once: `true` on explicit
/// confirmation, `false` on cancel or dismiss. The operation must not run
/// on `false`.
#[async_trait::async_trait]
pub trait ConfirmationSurface: Send + Sync {
    async fn confirm(&self, request: ConfirmRequest) -> bool;
}

/// Surface that approves every request without interaction.
pub struct AutoConfirm;

#[async_trait::async_trait]
impl ConfirmationSurface for AutoConfirm {
    async fn confirm(&self, _request: ConfirmRequest) -> bool {
        true
    }
}
