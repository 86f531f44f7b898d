//! API client for communicating with the Medical Insight Engine REST API.
//!
//! This module provides the `ApiClient` struct for the authentication
//! surface: login, registration, token refresh, logout, and the current
//! user record. Authenticated calls carry a JWT bearer token issued by
//! the `/api/auth/login` endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use crate::models::User;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Token issuance response from login, register, or refresh.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

/// What came back from `/api/auth/register`. Some deployments issue a
/// token pair straight away; others return only the created account and
/// expect a follow-up login.
#[derive(Debug)]
pub enum RegisterResponse {
    Tokens(AuthResponse),
    Created(User),
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    username: &'a str,
    password: &'a str,
    full_name: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

/// API client for the Medical Insight Engine.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client against the given base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Drop the bearer token; subsequent requests go out unauthenticated
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            // Rate limited - signal to retry
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(&url)
                .headers(self.auth_headers()?)
                .send()
                .await
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    // Rate limited
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = %url, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .post(&url)
                .headers(self.auth_headers()?)
                .json(body)
                .send()
                .await
                .with_context(|| format!("Failed to send POST request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    // Rate limited
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = %url, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    // ===== Authentication Endpoints =====

    /// Authenticate and return the issued token pair plus user record.
    ///
    /// The endpoint is OAuth2 form-encoded; the `username` field carries
    /// the email address.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let url = self.url("/api/auth/login");

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .form(&[("username", email), ("password", password)])
            .send()
            .await
            .context("Failed to send login request")?;

        let response = Self::check_response(response).await?;

        response
            .json()
            .await
            .context("Failed to parse login response")
    }

    /// Create a new account
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> Result<RegisterResponse> {
        let url = self.url("/api/auth/register");
        let body = RegisterRequest {
            email,
            username,
            password,
            full_name,
        };

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(&body)
            .send()
            .await
            .context("Failed to send register request")?;

        let response = Self::check_response(response).await?;
        let text = response
            .text()
            .await
            .context("Failed to read register response body")?;

        Self::parse_register(&text)
    }

    /// Parse a register response body, accepting either a token pair or a
    /// bare user record.
    fn parse_register(text: &str) -> Result<RegisterResponse> {
        if let Ok(auth) = serde_json::from_str::<AuthResponse>(text) {
            return Ok(RegisterResponse::Tokens(auth));
        }

        if let Ok(user) = serde_json::from_str::<User>(text) {
            return Ok(RegisterResponse::Created(user));
        }

        Err(ApiError::InvalidResponse(format!(
            "Unrecognized register response: {}",
            &text[..text.len().min(200)]
        ))
        .into())
    }

    /// Exchange a refresh token for a new token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse> {
        self.post("/api/auth/refresh", &RefreshRequest { refresh_token })
            .await
    }

    /// Revoke the server-side session for the current token
    pub async fn logout(&self) -> Result<()> {
        let url = self.url("/api/auth/logout");

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .send()
            .await
            .context("Failed to send logout request")?;

        Self::check_response(response).await?;
        Ok(())
    }

    /// Fetch the server's view of the current user
    pub async fn me(&self) -> Result<User> {
        self.get("/api/auth/me").await
    }

    /// Change the account password. The server revokes all refresh tokens
    /// on success.
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<()> {
        let url = self.url("/api/auth/change-password");

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .query(&[
                ("current_password", current_password),
                ("new_password", new_password),
            ])
            .send()
            .await
            .context("Failed to send change-password request")?;

        Self::check_response(response).await?;
        Ok(())
    }

    /// Check service availability
    pub async fn health(&self) -> Result<HealthStatus> {
        self.get("/api/health").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response() {
        // Shape issued by the login endpoint
        let json = r#"{"access_token":"abc","user":{"email":"test@example.com"}}"#;
        let auth: AuthResponse = serde_json::from_str(json).expect("login response should parse");

        assert_eq!(auth.access_token, "abc");
        assert!(auth.refresh_token.is_none());
        let user = auth.user.expect("user record expected");
        assert_eq!(user.email, "test@example.com");
    }

    #[test]
    fn test_parse_login_response_with_refresh_token() {
        let json = r#"{
            "access_token": "abc",
            "refresh_token": "def",
            "token_type": "bearer",
            "user": {"id": 3, "email": "test@example.com", "full_name": "Test User"}
        }"#;
        let auth: AuthResponse = serde_json::from_str(json).expect("login response should parse");

        assert_eq!(auth.refresh_token.as_deref(), Some("def"));
        assert_eq!(auth.token_type.as_deref(), Some("bearer"));
    }

    #[test]
    fn test_auth_headers_with_token() {
        let mut client = ApiClient::new("http://localhost:8000").unwrap();
        client.set_token("abc".to_string());

        let headers = client.auth_headers().unwrap();
        let value = headers.get(header::AUTHORIZATION).unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer abc");
    }

    #[test]
    fn test_auth_headers_without_token() {
        let client = ApiClient::new("http://localhost:8000").unwrap();
        let headers = client.auth_headers().unwrap();
        assert!(headers.get(header::AUTHORIZATION).is_none());

        let mut client = client;
        client.set_token("abc".to_string());
        client.clear_token();
        assert!(client.auth_headers().unwrap().get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.url("/api/health"), "http://localhost:8000/api/health");

        let client = ApiClient::new("https://engine.example.org").unwrap();
        assert_eq!(client.url("/api/auth/me"), "https://engine.example.org/api/auth/me");
    }

    #[test]
    fn test_parse_register_token_pair() {
        let json = r#"{"access_token":"abc","user":{"email":"new@example.com"}}"#;
        match ApiClient::parse_register(json).unwrap() {
            RegisterResponse::Tokens(auth) => assert_eq!(auth.access_token, "abc"),
            other => panic!("expected Tokens, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_register_bare_user() {
        let json = r#"{"id": 12, "email": "new@example.com", "full_name": "New User"}"#;
        match ApiClient::parse_register(json).unwrap() {
            RegisterResponse::Created(user) => {
                assert_eq!(user.id, 12);
                assert_eq!(user.email, "new@example.com");
            }
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_register_garbage() {
        assert!(ApiClient::parse_register("<html>nope</html>").is_err());
    }
}
