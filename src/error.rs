use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::model::RefError;
use crate::store::StoreError;

/// nginx's "client closed request"; there is no registered code for it
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Every failure the request layer can report to a client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed reference or reserved username
    #[error(transparent)]
    Reference(#[from] RefError),

    #[error("format \"{requested}\" conflicts with {other}")]
    FormatConflict { requested: String, other: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("{route} is not available in read-only mode")]
    Forbidden { route: String },

    #[error("dataset {0} has no history")]
    NoHistory(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A dataset demanded from local history is absent. Reported as a server
    /// fault for compatibility with existing clients.
    #[error("dataset {0} is not available locally")]
    LocalUnavailable(String),

    #[error("no route for {0}")]
    UnknownRoute(String),

    #[error("unknown command \"{0}\"")]
    UnknownCommand(String),

    #[error("command \"{command}\" exchanged a value of an unexpected type (expected {expected})")]
    DispatchType {
        command: String,
        expected: &'static str,
    },

    #[error("remote request failed: {0}")]
    Upstream(String),

    #[error("request canceled")]
    Canceled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("internal server error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Reference(_) | ApiError::FormatConflict { .. } | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NoHistory(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) | ApiError::UnknownRoute(_) | ApiError::UnknownCommand(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Canceled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::REQUEST_TIMEOUT),
            ApiError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ApiError::LocalUnavailable(_)
            | ApiError::DispatchType { .. }
            | ApiError::Upstream(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::NoHistory(reference) => ApiError::NoHistory(reference),
            StoreError::Invalid(message) => ApiError::BadRequest(message),
            StoreError::Upstream(message) => ApiError::Upstream(message),
            StoreError::Internal(err) => ApiError::Internal(err),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: &str) -> Self {
        Self {
            code: status.as_u16(),
            error: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            // Details stay in the log; the client only sees the safe message
            ApiError::Internal(err) => log::error!("internal error: {:#}", err),
            err if status.is_server_error() => log::error!("{}", err),
            err => log::debug!("rejecting request with {}: {}", status, err),
        }
        (status, Json(ErrorResponse::new(status, &self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(RefError::ReservedUsername("me".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Forbidden { route: "/publish".to_string() }.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NoHistory("peer/ds".to_string()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::NotFound("peer/ds".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Canceled.status().as_u16(), 499);
        assert_eq!(
            ApiError::LocalUnavailable("peer/ds".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_keep_their_class() {
        let no_history: ApiError = StoreError::NoHistory("peer/ds".to_string()).into();
        let not_found: ApiError = StoreError::NotFound("peer/ds".to_string()).into();
        assert_ne!(no_history.status(), not_found.status());
    }

    #[test]
    fn test_internal_error_message_is_generic() {
        let err = ApiError::Internal(anyhow::anyhow!("open /var/lib/secret.db: denied"));
        assert_eq!(err.to_string(), "internal server error");
    }
}
