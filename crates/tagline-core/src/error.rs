use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend rejected request: {0}")]
    BackendRejected(String),

    #[error("superseded by a newer request")]
    Cancelled,

    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// True for the internal discard signal raised when a response resolves
    /// after a newer one has already been applied. Never shown to the user.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
