//! HTTP client for the dexdesk REST API.
//!
//! `ApiClient::request` is the single transport entry point: method, path,
//! query parameters, optional JSON body and optional bearer token. The typed
//! endpoint methods below are thin wrappers over it. The client holds no
//! credentials of its own; callers pass the token for each call (see
//! [`super::AuthenticatedClient`]).

use std::time::Duration;

use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{
    Account, ChangePasswordRequest, Credentials, EmailRequest, LoginRequest, Page,
    RefreshRequest, RegisterRequest, ResetPasswordRequest, ResourceModel, UpdateAccountRequest,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// A single call to the backend.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    token: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            token: None,
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

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach a bearer token. An empty token sends no `Authorization` header,
    /// which the backend answers with 401.
    pub fn bearer(mut self, token: &str) -> Self {
        if !token.is_empty() {
            self.token = Some(token.to_string());
        }
        self
    }
}

/// API client for the dexdesk backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    initial_backoff_ms: u64,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            initial_backoff_ms: INITIAL_BACKOFF_MS,
        })
    }

    /// Override the initial rate-limit backoff
    pub fn with_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Decode a success body. Empty bodies decode as JSON `null` so `()` and
    /// `Option<_>` targets work; non-JSON text is offered as a JSON string.
    fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return serde_json::from_str("null")
                .or_else(|_| serde_json::from_value(Value::String(String::new())))
                .map_err(|e| ApiError::InvalidResponse(format!("empty body: {}", e)));
        }
        match serde_json::from_str(trimmed) {
            Ok(value) => Ok(value),
            Err(json_err) => serde_json::from_value(Value::String(trimmed.to_string()))
                .map_err(|_| ApiError::InvalidResponse(json_err.to_string())),
        }
    }

    /// Send a request, backing off and retrying on 429.
    pub async fn request<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        let url = self.url(&req.path);
        let mut retries = 0;
        let mut backoff_ms = self.initial_backoff_ms;

        loop {
            debug!(method = %req.method, path = %req.path, authenticated = req.token.is_some(), "API request");

            let mut builder = self
                .client
                .request(req.method.clone(), &url)
                .header(header::ACCEPT, "application/json");
            if !req.query.is_empty() {
                builder = builder.query(&req.query);
            }
            if let Some(ref token) = req.token {
                builder = builder.bearer_auth(token);
            }
            if let Some(ref body) = req.body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return Self::parse_body(&text);
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(path = %req.path, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    // ===== Auth =====

    pub async fn login(&self, email: &str, password: &str) -> Result<Credentials, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.request(ApiRequest::post("/auth/login").json(&body)?).await
    }

    /// Exchange a refresh token for a new access/refresh pair
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Credentials, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.request(ApiRequest::post("/auth/refresh-token").json(&body)?)
            .await
    }

    pub async fn register(&self, body: &RegisterRequest) -> Result<String, ApiError> {
        self.request(ApiRequest::post("/auth/register").json(body)?).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<String, ApiError> {
        let body = EmailRequest {
            email: email.to_string(),
        };
        self.request(ApiRequest::post("/auth/forgot-password").json(&body)?)
            .await
    }

    pub async fn reset_password(
        &self,
        reset_token: &str,
        body: &ResetPasswordRequest,
    ) -> Result<String, ApiError> {
        let path = format!("/auth/reset-password/{}", urlencoding::encode(reset_token));
        self.request(ApiRequest::post(path).json(body)?).await
    }

    pub async fn verify_email(&self, verify_token: &str) -> Result<String, ApiError> {
        let path = format!("/auth/email-verify/{}", urlencoding::encode(verify_token));
        self.request(ApiRequest::get(path)).await
    }

    pub async fn resend_verification_email(&self, email: &str) -> Result<String, ApiError> {
        let body = EmailRequest {
            email: email.to_string(),
        };
        self.request(ApiRequest::post("/auth/resend-verification-email").json(&body)?)
            .await
    }

    pub async fn change_password(
        &self,
        token: &str,
        body: &ChangePasswordRequest,
    ) -> Result<(), ApiError> {
        self.request(
            ApiRequest::put("/auth/change-password")
                .bearer(token)
                .json(body)?,
        )
        .await
    }

    // ===== Account =====

    /// Identity probe: who does this token belong to
    pub async fn me(&self, token: &str) -> Result<Account, ApiError> {
        self.request(ApiRequest::get("/users/me").bearer(token)).await
    }

    pub async fn update_me(&self, token: &str, body: &UpdateAccountRequest) -> Result<(), ApiError> {
        self.request(ApiRequest::put("/users/me").bearer(token).json(body)?)
            .await
    }

    // ===== Resources =====

    /// Fetch one page of a resource. `page` is zero-based; the backend counts from 1.
    pub async fn list<M: ResourceModel>(
        &self,
        token: &str,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> Result<Page<M>, ApiError> {
        let mut req = ApiRequest::get(format!("/{}", M::RESOURCE.path()))
            .bearer(token)
            .query("page", page + 1)
            .query("limit", limit);
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            req = req.query("search", search);
        }
        self.request(req).await
    }

    pub async fn get<M: ResourceModel>(&self, token: &str, id: i64) -> Result<M, ApiError> {
        let path = format!("/{}/{}", M::RESOURCE.path(), id);
        self.request(ApiRequest::get(path).bearer(token)).await
    }

    pub async fn create<M: ResourceModel>(&self, token: &str, input: &M::Input) -> Result<M, ApiError> {
        let path = format!("/{}", M::RESOURCE.path());
        self.request(ApiRequest::post(path).bearer(token).json(input)?)
            .await
    }

    pub async fn update<M: ResourceModel>(
        &self,
        token: &str,
        id: i64,
        input: &M::Input,
    ) -> Result<M, ApiError> {
        let path = format!("/{}/{}", M::RESOURCE.path(), id);
        self.request(ApiRequest::put(path).bearer(token).json(input)?)
            .await
    }

    pub async fn delete<M: ResourceModel>(&self, token: &str, id: i64) -> Result<(), ApiError> {
        let path = format!("/{}/{}", M::RESOURCE.path(), id);
        self.request(ApiRequest::delete(path).bearer(token)).await
    }

    pub async fn dropdown<M: ResourceModel>(
        &self,
        token: &str,
        keyword: Option<&str>,
    ) -> Result<Vec<M::Dropdown>, ApiError> {
        let mut req = ApiRequest::get(format!("/{}/dropdown", M::RESOURCE.path())).bearer(token);
        if let Some(keyword) = keyword.filter(|k| !k.is_empty()) {
            req = req.query("keyword", keyword);
        }
        self.request(req).await
    }
}
