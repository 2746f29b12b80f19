use crate::config::{ApiKey, CrmConfig};
use crate::errors::CrmError;
use crate::metrics_defs::{CRM_REQUEST_DURATION, CRM_REQUESTS, CRM_TAG_PAGES};
use crate::types::{
    AssignTag, Contact, ContactId, ContactUpdate, NewContact, NewTag, Page, Tag, TagId,
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{counter, histogram};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use url::Url;

pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
pub const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";

/// Operations against the CRM used by the lead sync.
///
/// Implemented over HTTP by [`CrmClient`]. All methods map any non-2xx
/// response to [`CrmError::Upstream`].
#[async_trait]
pub trait Crm: Send + Sync {
    /// Returns every tag defined in the CRM.
    async fn list_tags(&self) -> Result<Vec<Tag>, CrmError>;

    async fn create_tag(&self, name: &str) -> Result<Tag, CrmError>;

    /// Finds the contact whose email matches `email`, ignoring case.
    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, CrmError>;

    async fn get_contact(&self, id: ContactId) -> Result<Contact, CrmError>;

    async fn create_contact(&self, contact: &NewContact) -> Result<Contact, CrmError>;

    /// Applies a merge-patch to the contact's fields.
    async fn update_contact(
        &self,
        id: ContactId,
        update: &ContactUpdate,
    ) -> Result<Contact, CrmError>;

    async fn assign_tag(&self, contact_id: ContactId, tag_id: TagId) -> Result<(), CrmError>;

    async fn remove_tag(&self, contact_id: ContactId, tag_id: TagId) -> Result<(), CrmError>;
}

#[derive(Clone)]
pub struct CrmClient {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl CrmClient {
    pub fn new(config: &CrmConfig, api_key: &ApiKey) -> Result<Self, CrmError> {
        let mut api_key_value =
            HeaderValue::from_str(api_key.expose()).map_err(|_| CrmError::InvalidApiKey)?;
        api_key_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key_value);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(CrmError::ClientBuild)?;

        Ok(CrmClient {
            client,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            // The API rejects page sizes outside of this range
            page_size: config.page_size.clamp(10, 100),
        })
    }

    fn url(&self, path: &str) -> Result<Url, CrmError> {
        Ok(Url::parse(&format!("{}{}", self.base_url, path))?)
    }

    /// Sends the request and turns non-2xx responses into `CrmError::Upstream`.
    async fn execute(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<Response, CrmError> {
        let request = builder
            .build()
            .map_err(|source| CrmError::Request { operation, source })?;
        let method = request.method().clone();
        let path = request.url().path().to_string();

        tracing::debug!(operation, method = %method, path = %path, "Sending CRM request");

        let start = Instant::now();
        let result = self.client.execute(request).await;
        histogram!(CRM_REQUEST_DURATION, "operation" => operation)
            .record(start.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(source) => {
                counter!(CRM_REQUESTS, "operation" => operation, "outcome" => "error")
                    .increment(1);
                tracing::error!(operation, error = %source, "CRM request failed");
                return Err(CrmError::Request { operation, source });
            }
        };

        let status = response.status();
        if status.is_success() {
            counter!(CRM_REQUESTS, "operation" => operation, "outcome" => "ok").increment(1);
            return Ok(response);
        }

        counter!(CRM_REQUESTS, "operation" => operation, "outcome" => "rejected").increment(1);
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            operation,
            status = %status,
            path = %path,
            body = %body,
            "CRM rejected request"
        );

        Err(CrmError::Upstream {
            method,
            path,
            status,
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, CrmError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|source| CrmError::Request { operation, source })?;
        serde_json::from_slice(&bytes).map_err(|source| CrmError::Decode { operation, source })
    }
}

#[async_trait]
impl Crm for CrmClient {
    async fn list_tags(&self) -> Result<Vec<Tag>, CrmError> {
        const OP: &str = "list_tags";

        let mut tags = Vec::new();
        let mut starting_after: Option<TagId> = None;
        let mut seen_cursors: HashSet<TagId> = HashSet::new();
        let mut page_fetches: u32 = 0;

        loop {
            let mut url = self.url("/tags")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &self.page_size.to_string());
                if let Some(id) = starting_after {
                    query.append_pair("startingAfter", &id.to_string());
                }
            }

            let response = self.execute(OP, self.client.get(url)).await?;
            let page: Page<Tag> = Self::decode(OP, response).await?;
            page_fetches += 1;

            let last_id = page.items.last().map(|t| t.id);

            // A page ending on a cursor already visited repeats earlier items
            if let Some(id) = last_id
                && !seen_cursors.insert(id)
            {
                tracing::warn!(cursor = id, "Tag pagination revisited a cursor, stopping");
                break;
            }
            tags.extend(page.items);

            match last_id {
                Some(id) if page.has_more => starting_after = Some(id),
                _ => break,
            }
        }

        histogram!(CRM_TAG_PAGES).record(f64::from(page_fetches));
        tracing::debug!(pages = page_fetches, tags = tags.len(), "Fetched tags");

        Ok(tags)
    }

    async fn create_tag(&self, name: &str) -> Result<Tag, CrmError> {
        const OP: &str = "create_tag";

        let url = self.url("/tags")?;
        let response = self
            .execute(OP, self.client.post(url).json(&NewTag { name }))
            .await?;
        Self::decode(OP, response).await
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, CrmError> {
        const OP: &str = "find_contact";

        let mut url = self.url("/contacts")?;
        url.query_pairs_mut().append_pair("email", email);

        let response = self.execute(OP, self.client.get(url)).await?;
        let page: Page<Contact> = Self::decode(OP, response).await?;

        Ok(page
            .items
            .into_iter()
            .find(|c| c.email.eq_ignore_ascii_case(email)))
    }

    async fn get_contact(&self, id: ContactId) -> Result<Contact, CrmError> {
        const OP: &str = "get_contact";

        let url = self.url(&format!("/contacts/{id}"))?;
        let response = self.execute(OP, self.client.get(url)).await?;
        Self::decode(OP, response).await
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<Contact, CrmError> {
        const OP: &str = "create_contact";

        let url = self.url("/contacts")?;
        let response = self.execute(OP, self.client.post(url).json(contact)).await?;
        Self::decode(OP, response).await
    }

    async fn update_contact(
        &self,
        id: ContactId,
        update: &ContactUpdate,
    ) -> Result<Contact, CrmError> {
        const OP: &str = "update_contact";

        let url = self.url(&format!("/contacts/{id}"))?;
        // `json()` keeps an explicitly set content type
        let builder = self
            .client
            .patch(url)
            .header(CONTENT_TYPE, MERGE_PATCH_CONTENT_TYPE)
            .json(update);
        let response = self.execute(OP, builder).await?;
        Self::decode(OP, response).await
    }

    async fn assign_tag(&self, contact_id: ContactId, tag_id: TagId) -> Result<(), CrmError> {
        const OP: &str = "assign_tag";

        let url = self.url(&format!("/contacts/{contact_id}/tags"))?;
        self.execute(OP, self.client.post(url).json(&AssignTag { tag_id }))
            .await?;
        Ok(())
    }

    async fn remove_tag(&self, contact_id: ContactId, tag_id: TagId) -> Result<(), CrmError> {
        const OP: &str = "remove_tag";

        let url = self.url(&format!("/contacts/{contact_id}/tags/{tag_id}"))?;
        self.execute(OP, self.client.delete(url)).await?;
        Ok(())
    }
}
