use crate::config::{Config, SyncConfig};
use crate::errors::SyncError;
use crate::lead::Lead;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT, SYNC_FAILURES};
use crate::sync::{LeadSync, SyncIssue, SyncOutcome};
use crm::types::{Contact, ContactId, TagId};
use crm::{Crm, CrmClient};
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ALLOW, HeaderMap, HeaderValue,
};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use shared::http::{into_boxed_response, json_response, make_error_response};
use shared::{counter, gauge, histogram};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Largest request body accepted by the sync endpoint
const MAX_BODY_BYTES: usize = 64 * 1024;

const ALLOWED_METHODS: &str = "POST, OPTIONS";

/// Body of a successful sync
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub contact_id: ContactId,
    pub created: bool,
    pub contact: Contact,
    pub assigned_tag_ids: Vec<TagId>,
    pub removed_tag_ids: Vec<TagId>,
    pub created_tag_ids: Vec<TagId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SyncIssue>,
}

impl From<SyncOutcome> for SyncResponse {
    fn from(outcome: SyncOutcome) -> Self {
        SyncResponse {
            success: true,
            contact_id: outcome.contact.id,
            created: outcome.created,
            contact: outcome.contact,
            assigned_tag_ids: outcome.assigned_tag_ids,
            removed_tag_ids: outcome.removed_tag_ids,
            created_tag_ids: outcome.created_tag_ids,
            errors: outcome.issues,
        }
    }
}

struct ServiceInner {
    path: String,
    cors_allow_origin: Option<HeaderValue>,
    sync_config: SyncConfig,
    // None when no API key is configured
    lead_sync: Option<LeadSync>,
}

/// Serves the lead sync endpoint.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<ServiceInner>,
}

impl SyncService {
    /// Builds the service with an HTTP client for the configured CRM.
    ///
    /// A missing API key is not an error here: the service starts, reports
    /// not ready, and answers sync requests with 500.
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let crm: Option<Arc<dyn Crm>> = match config.crm.resolve_api_key() {
            Some(api_key) => Some(Arc::new(CrmClient::new(&config.crm, &api_key)?)),
            None => {
                tracing::warn!(
                    env = %config.crm.api_key_env,
                    "CRM API key is not configured, sync requests will be rejected"
                );
                None
            }
        };

        Ok(Self::with_crm(config, crm))
    }

    pub fn with_crm(config: &Config, crm: Option<Arc<dyn Crm>>) -> Self {
        let cors_allow_origin = config
            .cors_allow_origin
            .as_deref()
            .and_then(|origin| HeaderValue::from_str(origin).ok());

        SyncService {
            inner: Arc::new(ServiceInner {
                path: config.path.trim_end_matches('/').to_string(),
                cors_allow_origin,
                sync_config: config.sync.clone(),
                lead_sync: crm.map(|crm| LeadSync::new(crm, config.sync.clone())),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lead_sync.is_some()
    }

    /// Handles a request. The body is only read once the path, method and
    /// API key checks have passed.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Bytes>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let start = Instant::now();
        gauge!(REQUESTS_INFLIGHT).increment(1.0);

        let response = match self.process(request).await {
            Ok(response) => response,
            Err(e) => self.error_response(e),
        };
        let response = self.finalize(response);

        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
        histogram!(REQUEST_DURATION, "status" => response.status().as_str().to_owned())
            .record(start.elapsed().as_secs_f64());

        response
    }

    async fn process<B>(&self, request: Request<B>) -> Result<Response<Bytes>, SyncError>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        if request.uri().path().trim_end_matches('/') != self.inner.path {
            return Err(SyncError::NotFound);
        }

        match *request.method() {
            Method::POST => {}
            Method::OPTIONS => {
                let mut response = Response::new(Bytes::new());
                *response.status_mut() = StatusCode::NO_CONTENT;
                return Ok(response);
            }
            _ => return Err(SyncError::MethodNotAllowed),
        }

        // Checked before the body so that no CRM call can happen without a key
        let lead_sync = self
            .inner
            .lead_sync
            .as_ref()
            .ok_or(SyncError::MissingApiKey)?;

        let body = Limited::new(request.into_body(), MAX_BODY_BYTES)
            .collect()
            .await
            .map_err(|e| SyncError::RequestBody(e.to_string()))?
            .to_bytes();

        let lead = Lead::from_body(&body, &self.inner.sync_config)?;
        tracing::debug!(email = %lead.email, tags = ?lead.tag_names, "Syncing lead");

        let outcome = lead_sync.sync(&lead).await?;
        Ok(json_response(
            StatusCode::OK,
            &SyncResponse::from(outcome),
        )?)
    }

    fn error_response(&self, error: SyncError) -> Response<Bytes> {
        let status = error.status_code();
        counter!(SYNC_FAILURES, "kind" => error.kind()).increment(1);

        if status.is_server_error() {
            tracing::error!(error = %error, status = %status, "Sync request failed");
        } else {
            tracing::debug!(error = %error, status = %status, "Sync request rejected");
        }

        let mut response = json_response(status, &error.to_body())
            .unwrap_or_else(|_| make_error_response(status));
        if matches!(error, SyncError::MethodNotAllowed) {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        response
    }

    fn finalize(&self, mut response: Response<Bytes>) -> Response<Bytes> {
        if let Some(origin) = &self.inner.cors_allow_origin {
            add_cors_headers(response.headers_mut(), origin);
        }
        response
    }
}

fn add_cors_headers(headers: &mut HeaderMap, origin: &HeaderValue) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
}

impl Service<Request<Incoming>> for SyncService {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = SyncError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();

        Box::pin(async move { Ok(into_boxed_response(service.handle(req).await)) })
    }
}
