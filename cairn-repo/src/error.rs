use crate::path::Path;

/// Everything a repository operation can fail with.
///
/// The WebDAV layer maps each variant to a status code,
/// `Internal` is the only one it does not expect.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resource not found")]
    NotFound,
    #[error("resource is locked")]
    Locked,
    #[error("repository is read-only")]
    ReadOnly,
    #[error("illegal operation: {0}")]
    IllegalOperation(String),
    #[error("destination exists and overwrite is not allowed")]
    Overwrite,
    #[error("operation failed on {} member(s)", .0.len())]
    FailedDependency(Vec<(Path, Error)>),
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("authorization denied")]
    AuthorizationDenied,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn illegal(reason: impl Into<String>) -> Self {
        Self::IllegalOperation(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
