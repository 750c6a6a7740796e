//! HTTP client abstraction for making requests to the portal backend

use log::{debug, warn};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, RequestBuilder, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use msafiri_session::CredentialStore;

use crate::error::Error;

/// Header naming the tenant a request is scoped to
pub const TENANT_HEADER: &str = "X-Tenant-ID";

/// Error body returned by the backend
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

impl ApiErrorBody {
    fn detail_text(self) -> Option<String> {
        match self.detail? {
            serde_json::Value::String(detail) if !detail.is_empty() => Some(detail),
            serde_json::Value::Null | serde_json::Value::String(_) => None,
            other => Some(other.to_string()),
        }
    }
}

/// Helper for building and executing HTTP requests
pub struct FetchBuilder<'a> {
    client: &'a Client,
    url: String,
    method: Method,
    headers: HeaderMap,
    query_params: Option<HashMap<String, String>>,
    body: Option<Vec<u8>>,
    credentials: Option<&'a CredentialStore>,
    skip_auth_error: bool,
}

impl<'a> FetchBuilder<'a> {
    /// Create a new FetchBuilder
    pub fn new(client: &'a Client, url: &str, method: Method) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self {
            client,
            url: url.to_string(),
            method,
            headers,
            query_params: None,
            body: None,
            credentials: None,
            skip_auth_error: false,
        }
    }

    /// Add a header to the request
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Authenticate with whatever credential `store` holds when the request is sent
    pub fn credentials(mut self, store: &'a CredentialStore) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Report a 401 as a plain API error instead of an expired session
    pub fn skip_auth_error(mut self) -> Self {
        self.skip_auth_error = true;
        self
    }

    /// Add query parameters to the request
    pub fn query(mut self, params: HashMap<String, String>) -> Self {
        self.query_params = Some(params);
        self
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, Error> {
        let json = serde_json::to_vec(body)?;
        self.body = Some(json);
        Ok(self)
    }

    /// Add a form-encoded body to the request
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.body = Some(encoded.into_bytes());
        self
    }

    fn is_login_endpoint(&self) -> bool {
        self.url.contains("/auth/login")
    }

    /// Build the request.
    ///
    /// The credential is read here, so a request always carries the token
    /// current at send time.
    fn build(&self) -> Result<RequestBuilder, Error> {
        let mut url = Url::parse(&self.url)?;

        if let Some(params) = &self.query_params {
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in params {
                query_pairs.append_pair(key, value);
            }
        }

        let mut headers = self.headers.clone();
        if !headers.contains_key(AUTHORIZATION) {
            let token = self.credentials.and_then(|store| store.token());
            if let Some(token) = token.filter(|t| !t.is_empty()) {
                if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                    headers.insert(AUTHORIZATION, value);
                }
            }
        }

        let mut req = self.client.request(self.method.clone(), url.as_str());
        req = req.headers(headers);

        if let Some(body) = &self.body {
            req = req.body(body.clone());
        }

        Ok(req)
    }

    async fn check(&self, response: Response) -> Result<Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let login = self.is_login_endpoint();
        if status == StatusCode::UNAUTHORIZED && !(self.skip_auth_error || login) {
            warn!("{} {} rejected the session credential", self.method, self.url);
            return Err(Error::SessionExpired);
        }

        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(ApiErrorBody::detail_text)
            .unwrap_or_else(|| {
                if status == StatusCode::UNAUTHORIZED {
                    "Invalid credentials".to_string()
                } else {
                    format!("HTTP {}", status)
                }
            });

        debug!("{} {} failed: {}", self.method, self.url, detail);
        Err(Error::Api {
            status: status.as_u16(),
            detail,
        })
    }

    /// Execute the request and parse the response as JSON
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let req = self.build()?;
        let response = self.check(req.send().await?).await?;
        let result = response.json::<T>().await?;
        Ok(result)
    }

    /// Execute the request, ignoring any response body
    pub async fn execute_empty(&self) -> Result<(), Error> {
        let req = self.build()?;
        self.check(req.send().await?).await?;
        Ok(())
    }
}

/// Tenant-aware client for the backend API.
///
/// Every request authenticates with the session's current credential.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
    store: CredentialStore,
    tenant_id: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, client: Client, store: CredentialStore) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            store,
            tenant_id: None,
        }
    }

    /// Scope every request to `tenant_id`
    pub fn with_tenant_id(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Absolute URL for an endpoint such as `/users/`
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Start a request against `endpoint`
    pub fn request(&self, method: Method, endpoint: &str) -> FetchBuilder<'_> {
        self.anonymous(method, endpoint).credentials(&self.store)
    }

    /// Start a request that carries no credential, as sign-in does
    pub fn anonymous(&self, method: Method, endpoint: &str) -> FetchBuilder<'_> {
        let builder = FetchBuilder::new(&self.client, &self.url(endpoint), method);

        match self.tenant_id {
            Some(ref tenant) => builder.header(TENANT_HEADER, tenant),
            None => builder,
        }
    }

    /// Create a GET request
    pub fn get(&self, endpoint: &str) -> FetchBuilder<'_> {
        self.request(Method::GET, endpoint)
    }

    /// Create a POST request
    pub fn post(&self, endpoint: &str) -> FetchBuilder<'_> {
        self.request(Method::POST, endpoint)
    }

    /// Create a PUT request
    pub fn put(&self, endpoint: &str) -> FetchBuilder<'_> {
        self.request(Method::PUT, endpoint)
    }

    /// Create a PATCH request
    pub fn patch(&self, endpoint: &str) -> FetchBuilder<'_> {
        self.request(Method::PATCH, endpoint)
    }

    /// Create a DELETE request
    pub fn delete(&self, endpoint: &str) -> FetchBuilder<'_> {
        self.request(Method::DELETE, endpoint)
    }
}
