use tower_lsp::lsp_types::Url;

use crate::cache::MAX_DOC;

/// Errors surfaced by the document cache, the semantic services and the metadata adapter.
///
/// Parse errors are not part of this enum: they are reported to the client as diagnostics.
#[non_exhaustive]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("document version is no longer current")]
    Stale,

    #[error("document not found: {0}")]
    NotFound(Url),

    #[error("document is already open: {0}")]
    DuplicateUri(Url),

    #[error("document of {len} bytes exceeds the limit of {MAX_DOC} bytes")]
    Oversize { len: usize },

    #[error("version {received} is not newer than the current version {current}")]
    VersionConflict { current: i32, received: i32 },

    #[error("invalid request: {0}")]
    Protocol(String),

    #[error("position out of range: {0}")]
    Position(String),

    #[error("metadata request failed: {0}")]
    Upstream(String),

    #[error("method not implemented")]
    NotImplemented,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task failed: {err}"))
    }
}

impl From<Error> for tower_lsp::jsonrpc::Error {
    fn from(err: Error) -> Self {
        use tower_lsp::jsonrpc::ErrorCode;

        let code = match &err {
            Error::NotFound(_)
            | Error::Protocol(_)
            | Error::Position(_)
            | Error::Oversize { .. }
            | Error::DuplicateUri(_)
            | Error::VersionConflict { .. } => ErrorCode::InvalidParams,
            // ContentModified
            Error::Stale => ErrorCode::ServerError(-32801),
            Error::NotImplemented => ErrorCode::MethodNotFound,
            Error::Upstream(_) | Error::Internal(_) => ErrorCode::InternalError,
        };
        Self {
            code,
            message: err.to_string().into(),
            data: None,
        }
    }
}
