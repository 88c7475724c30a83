//! Single-attempt request plumbing shared by both clients.
//!
//! [`Transport::send_once`] turns an [`ApiRequest`] into exactly one HTTP
//! exchange and classifies the outcome. Retrying and refreshing happen in
//! the layers above.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::ErrorResponse;
use crate::error::FetchError;
use crate::session::Session;

/// Description of one logical request, replayable across attempts.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as the JSON payload and set the content type.
    pub fn json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, serde_json::Error> {
        let encoded = serde_json::to_vec(body)?;
        Ok(self
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(encoded))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Resolve `path` against the API base URL.
///
/// Leading and trailing slashes are normalized so `songs` and `/songs`
/// resolve to the same URL. Absolute `http(s)` URLs pass through.
pub fn join_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path);
    }
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{base}/{path}"))
}

/// Outcome class of an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Unauthorized,
    Client,
    Server,
}

/// Every status maps to exactly one class. Non-success statuses below
/// 400 that reach the client count as client errors.
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::UNAUTHORIZED {
        StatusClass::Unauthorized
    } else if status.is_server_error() {
        StatusClass::Server
    } else {
        StatusClass::Client
    }
}

/// Whether a request carries the session credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CredentialMode {
    /// Bearer token attached; a 401 is handed back to the caller as
    /// [`Sent::Unauthorized`] instead of failing.
    Attach,
    /// No bearer token; a 401 is an ordinary client error.
    Omit,
}

/// A response that ended a single attempt without a classified failure.
#[derive(Debug)]
pub(crate) enum Sent {
    Success(Response),
    Unauthorized(Response),
}

#[derive(Debug)]
pub(crate) struct Transport {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<Session>,
}

impl Transport {
    pub(crate) fn new(http: reqwest::Client, base_url: Url, session: Arc<Session>) -> Self {
        Self {
            http,
            base_url,
            session,
        }
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Absolute URL of `request`.
    ///
    /// A path that cannot be joined is reported as `Network`; callers
    /// resolve before retrying so it is never sent twice.
    pub(crate) fn resolve(&self, request: &ApiRequest) -> Result<Url, FetchError> {
        join_url(&self.base_url, request.path()).map_err(|err| {
            FetchError::network(format!("invalid request path {}: {err}", request.path()))
        })
    }

    pub(crate) async fn send_once(
        &self,
        request: &ApiRequest,
        url: &Url,
        mode: CredentialMode,
        attempt: u32,
    ) -> Result<Sent, FetchError> {
        let mut builder = self
            .http
            .request(request.method().clone(), url.clone())
            .headers(request.headers().clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if mode == CredentialMode::Attach
            && let Some(token) = self.session.access_token()
        {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.clone());
        }

        tracing::debug!(
            method = %request.method(),
            path = request.path(),
            attempt,
            "sending request"
        );

        let response = builder
            .send()
            .await
            .map_err(|err| FetchError::network(err.to_string()))?;
        let status = response.status();

        match classify_status(status) {
            StatusClass::Success => Ok(Sent::Success(response)),
            StatusClass::Unauthorized if mode == CredentialMode::Attach => {
                tracing::debug!(path = request.path(), "credential rejected");
                Ok(Sent::Unauthorized(response))
            }
            StatusClass::Server => Err(FetchError::server(ErrorResponse::capture(response).await)),
            StatusClass::Unauthorized | StatusClass::Client => {
                Err(FetchError::client(ErrorResponse::capture(response).await))
            }
        }
    }
}

/// Decode a successful response body as JSON.
///
/// A body that does not match `T` is reported as a transport failure so
/// callers only ever see the closed error taxonomy.
pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
    let url = response.url().clone();
    response
        .json::<T>()
        .await
        .map_err(|err| FetchError::network(format!("failed to decode response from {url}: {err}")))
}
