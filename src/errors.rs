use axum::http::StatusCode;
use std::path::PathBuf;

/// Rejected input at the write boundary.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("phase name must not be empty")]
    EmptyPhaseName,
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
    #[error("unknown flag '{0}'")]
    UnknownFlag(String),
}

/// Local durable store failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored '{key}' is not valid JSON: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Remote content encoding failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("content is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("content is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("content is not a valid snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Remote store failures. All of them are recoverable from the point of
/// view of local reads and writes.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    #[error("remote rejected credentials")]
    Unauthorized,
    #[error("remote version changed since it was read")]
    Conflict,
    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote document is malformed: {0}")]
    Malformed(#[from] CodecError),
    #[error("could not create HTTP client: {0}")]
    Client(String),
}

/// Failures while connecting a remote: the client could not be built or
/// the credentials could not be saved.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RemoteError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::Conflict)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return RemoteError::Status {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                body: err.to_string(),
            };
        }
        RemoteError::Unreachable(err.to_string())
    }
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::internal(err)
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        Self::bad_gateway(err.to_string())
    }
}

impl From<ConnectError> for AppError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Remote(err) => Self::internal(err),
            ConnectError::Storage(err) => Self::from(err),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
