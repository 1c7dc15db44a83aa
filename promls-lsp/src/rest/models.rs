//! Request bodies and the error response of the REST API

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_lsp::lsp_types::Position;

use crate::Error;

/// Body of `/diagnostics`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExprRequest {
    pub expr: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Body of every endpoint working at a position.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRequest {
    pub expr: String,
    pub position_line: u32,
    pub position_char: u32,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl PositionRequest {
    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(self.position_line, self.position_char)
    }
}

/// Error answered as plain text with the matching status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Protocol(_) | Error::Position(_) | Error::Oversize { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::Stale
            | Error::NotFound(_)
            | Error::DuplicateUri(_)
            | Error::VersionConflict { .. }
            | Error::Upstream(_)
            | Error::NotImplemented
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!("request failed: {}", self.message);
        }
        (self.status, self.message).into_response()
    }
}

/// JSON body extraction that turns rejections into [`ApiError`]s.
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(ApiError::from)
}
