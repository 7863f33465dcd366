use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::device_model::BuildError;
use crate::routing::ParameterError;

/// Application-facing error, the thing every HTTP handler actually returns.
///
/// Library-level errors (`shdr::ShdrError`, [`crate::buffer::BufferError`],
/// [`ParameterError`], [`BuildError`]) all convert into this via `From` —
/// this is the only error type that crosses the dispatcher boundary.
#[derive(Debug, Clone, Serialize)]
pub struct AgentError {
    pub message: String,
    #[serde(rename = "errorCode")]
    pub code: AgentErrorKind,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentErrorKind {
    OutOfRange,
    InvalidRequest,
    UnknownDevice,
    UnknownDataItem,
    NotFound,
    Internal,
}

impl AgentErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            AgentErrorKind::OutOfRange => StatusCode::NOT_FOUND,
            AgentErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            AgentErrorKind::UnknownDevice => StatusCode::NOT_FOUND,
            AgentErrorKind::UnknownDataItem => StatusCode::NOT_FOUND,
            AgentErrorKind::NotFound => StatusCode::NOT_FOUND,
            AgentErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for AgentError {}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: kind,
        }
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::OutOfRange, message)
    }

    pub fn unknown_device(name: impl std::fmt::Display) -> Self {
        Self::new(AgentErrorKind::UnknownDevice, format!("no such device: {name}"))
    }

    pub fn unknown_data_item(id: impl std::fmt::Display) -> Self {
        Self::new(
            AgentErrorKind::UnknownDataItem,
            format!("no such data item: {id}"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Internal, message)
    }

    pub fn no_matching_route(method: &str, path: &str) -> Self {
        Self::new(AgentErrorKind::NotFound, format!("no route for {method} {path}"))
    }
}

impl From<ParameterError> for AgentError {
    fn from(err: ParameterError) -> Self {
        Self::new(AgentErrorKind::InvalidRequest, err.to_string())
    }
}

impl From<BuildError> for AgentError {
    fn from(err: BuildError) -> Self {
        Self::new(AgentErrorKind::Internal, err.to_string())
    }
}

impl From<crate::buffer::BufferError> for AgentError {
    fn from(err: crate::buffer::BufferError) -> Self {
        match err {
            crate::buffer::BufferError::OutOfRange { .. } => {
                Self::new(AgentErrorKind::OutOfRange, err.to_string())
            }
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> axum::response::Response {
        let status = self.code.status();
        (status, Json(self)).into_response()
    }
}
