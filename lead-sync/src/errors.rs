use crm::CrmError;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while handling a sync request
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Not found")]
    NotFound,

    #[error("CRM API key is not configured")]
    MissingApiKey,

    #[error("CRM request failed: {0}")]
    Crm(#[from] CrmError),

    #[error("Failed to read request body: {0}")]
    RequestBody(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::Validation(_) => StatusCode::BAD_REQUEST,
            SyncError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            SyncError::NotFound => StatusCode::NOT_FOUND,
            SyncError::MissingApiKey => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::Crm(_) => StatusCode::BAD_GATEWAY,
            SyncError::RequestBody(_) => StatusCode::BAD_REQUEST,
            SyncError::Internal(_) | SyncError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used to tag metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Validation(_) | SyncError::RequestBody(_) => "validation",
            SyncError::MethodNotAllowed => "method_not_allowed",
            SyncError::NotFound => "not_found",
            SyncError::MissingApiKey => "config",
            SyncError::Crm(_) => "upstream",
            SyncError::Internal(_) | SyncError::Io(_) => "internal",
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let (status, details) = match self {
            SyncError::Crm(e) => (
                e.upstream_status().map(|s| s.as_u16()),
                e.upstream_body().map(String::from),
            ),
            _ => (None, None),
        };

        ErrorBody {
            success: false,
            error: self.to_string(),
            kind: self.kind(),
            status,
            details,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Internal(e.to_string())
    }
}

/// JSON body returned for failed requests
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub kind: &'static str,
    /// Status code returned by the CRM
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Raw response body returned by the CRM
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
