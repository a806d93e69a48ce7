//! Linode API v4 backend.
//!
//! Every list endpoint is paginated; [`LinodeBackend`] follows `page`/`pages`
//! until the last page. Non-2xx responses are decoded from Linode's
//! `{"errors": [{"reason", "field"}]}` envelope.

use crate::backend::Provisioner;
use crate::error::{Error, Result};
use crate::types::{
    Domain, DomainId, DomainRecord, DomainSpec, Instance, InstanceSpec, Page, RecordId,
    RecordPatch, RecordSpec,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use ureq::http::Response;

/// Production API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.linode.com/v4";

/// Largest page size the API accepts.
const PAGE_SIZE: u32 = 500;

/// Upper bound on a single API request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("landfall/", env!("CARGO_PKG_VERSION"));

/// Linode backend. Holds its own token.
pub struct LinodeBackend {
    agent: ureq::Agent,
    api_base: String,
    token: String,
}

impl LinodeBackend {
    /// Create a backend against the production API.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Create a backend with a custom API base (for testing).
    #[must_use]
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        Self {
            agent,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn page_url(&self, path: &str, page: u32) -> String {
        format!("{}?page={}&page_size={}", self.url(path), page, PAGE_SIZE)
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .agent
            .get(url)
            .header("Authorization", &self.authorization())
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .call()?;
        read_response(response)
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .agent
            .post(&self.url(path))
            .header("Authorization", &self.authorization())
            .header("User-Agent", USER_AGENT)
            .send_json(body)?;
        read_response(response)
    }

    fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .agent
            .put(&self.url(path))
            .header("Authorization", &self.authorization())
            .header("User-Agent", USER_AGENT)
            .send_json(body)?;
        read_response(response)
    }

    fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let current: Page<T> = self.get(&self.page_url(path, page))?;
            items.extend(current.data);
            if current.page >= current.pages {
                return Ok(items);
            }
            page = current.page + 1;
        }
    }
}

impl fmt::Debug for LinodeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinodeBackend")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Provisioner for LinodeBackend {
    fn list_instances(&self) -> Result<Vec<Instance>> {
        self.list_all("linode/instances")
    }

    fn create_instance(&self, spec: &InstanceSpec) -> Result<Instance> {
        self.post("linode/instances", spec)
    }

    fn list_domains(&self) -> Result<Vec<Domain>> {
        self.list_all("domains")
    }

    fn create_domain(&self, spec: &DomainSpec) -> Result<Domain> {
        self.post("domains", spec)
    }

    fn list_records(&self, domain_id: DomainId) -> Result<Vec<DomainRecord>> {
        self.list_all(&format!("domains/{domain_id}/records"))
    }

    fn create_record(&self, domain_id: DomainId, spec: &RecordSpec) -> Result<DomainRecord> {
        self.post(&format!("domains/{domain_id}/records"), spec)
    }

    fn update_record(
        &self,
        domain_id: DomainId,
        record_id: RecordId,
        patch: &RecordPatch,
    ) -> Result<DomainRecord> {
        self.put(&format!("domains/{domain_id}/records/{record_id}"), patch)
    }
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrors {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorEntry {
    reason: String,
    #[serde(default)]
    field: Option<String>,
}

impl ApiErrorEntry {
    fn describe(&self) -> String {
        match &self.field {
            Some(field) => format!("{field}: {}", self.reason),
            None => self.reason.clone(),
        }
    }
}

fn read_response<T: DeserializeOwned>(mut response: Response<ureq::Body>) -> Result<T> {
    let status = response.status();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| Error::http(e.to_string(), Some(status.as_u16())))?;

    if !status.is_success() {
        return Err(api_error(status.as_u16(), &body));
    }

    Ok(serde_json::from_str(&body)?)
}

fn api_error(status: u16, body: &str) -> Error {
    let reasons = match serde_json::from_str::<ApiErrors>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => {
            parsed.errors.iter().map(ApiErrorEntry::describe).collect()
        }
        _ if body.trim().is_empty() => Vec::new(),
        _ => vec![body.trim().to_string()],
    };
    Error::Api { status, reasons }
}
