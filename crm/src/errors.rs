use reqwest::{Method, StatusCode};

#[derive(thiserror::Error, Debug)]
pub enum CrmError {
    #[error("request to CRM failed during {operation}: {source}")]
    Request {
        operation: &'static str,
        source: reqwest::Error,
    },

    /// The CRM answered with a non-2xx status. The raw body is kept so it
    /// can be passed back to the caller.
    #[error("CRM returned {status} for {method} {path}")]
    Upstream {
        method: Method,
        path: String,
        status: StatusCode,
        body: String,
    },

    #[error("could not decode CRM response for {operation}: {source}")]
    Decode {
        operation: &'static str,
        source: serde_json::Error,
    },

    #[error("invalid CRM URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("API key is not a valid header value")]
    InvalidApiKey,

    #[error("could not build HTTP client: {0}")]
    ClientBuild(reqwest::Error),
}

impl CrmError {
    /// Status code reported by the CRM, if the failure came from a response.
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            CrmError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body reported by the CRM, if any.
    pub fn upstream_body(&self) -> Option<&str> {
        match self {
            CrmError::Upstream { body, .. } => Some(body),
            _ => None,
        }
    }
}
