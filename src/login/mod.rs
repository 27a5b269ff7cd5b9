//! Login redirect into the companion dashboard.
//!
//! The handler resolves the current user from the request. Without a user
//! the caller is sent to the login page, with the original path in
//! `redirect`. With a user, the companion API is asked for a signing secret
//! and dashboard URL, and the caller is redirected there with a signed
//! `auth_token`.
//!
//! ```no_run
//! use axum::Router;
//! use har_relay::login::login;
//! use serde_json::json;
//!
//! # fn example() -> Result<(), har_relay::config::ConfigError> {
//! let handler = login("my-api-key")
//!     .resolve_user(|req| {
//!         req.headers
//!             .get("x-user")
//!             .and_then(|v| v.to_str().ok())
//!             .map(|name| json!({ "name": name }))
//!     })
//!     .login_url("/signin")
//!     .build()?;
//!
//! let app: Router = Router::new().route("/docs", handler.into_route());
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::LoginError;

use crate::config::{CompanionConfig, ConfigError};
use axum::extract::Request;
use axum::http::{header, request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

type UserFn = Arc<dyn Fn(&request::Parts) -> Result<Option<Value>, serde_json::Error> + Send + Sync>;

/// Session details returned by the companion API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanionSession {
    pub jwt_secret: String,
    pub base_url: String,
}

/// Start configuring the login handler.
pub fn login(api_key: impl Into<String>) -> LoginBuilder {
    LoginBuilder {
        api_key: api_key.into(),
        resolver: None,
        login_url: None,
        companion: CompanionConfig::default(),
        client: None,
    }
}

/// Builder returned by [`login`].
pub struct LoginBuilder {
    api_key: String,
    resolver: Option<UserFn>,
    login_url: Option<String>,
    companion: CompanionConfig,
    client: Option<reqwest::Client>,
}

impl LoginBuilder {
    /// Required. Returns the signed-in user, or `None`.
    ///
    /// The user is serialized into the token claims. `null`, `false`, an
    /// empty string and `0` count as no user.
    pub fn resolve_user<U, F>(mut self, f: F) -> Self
    where
        U: Serialize + 'static,
        F: Fn(&request::Parts) -> Option<U> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(move |parts: &request::Parts| {
            f(parts).map(|user| serde_json::to_value(user)).transpose()
        }));
        self
    }

    /// Where users without a session are sent. Overrides `companion.login_url`.
    pub fn login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into());
        self
    }

    pub fn companion(mut self, config: CompanionConfig) -> Self {
        self.companion = config;
        self
    }

    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<LoginHandler, ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        let resolver = self.resolver.ok_or(ConfigError::MissingUserResolver)?;

        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(Duration::from_secs(self.companion.timeout_seconds))
                .build()
                .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
        };

        Ok(LoginHandler {
            inner: Arc::new(Inner {
                api_key: self.api_key,
                resolver,
                login_url: self.login_url.unwrap_or(self.companion.login_url.clone()),
                endpoint: self.companion.endpoint(),
                client,
            }),
        })
    }
}

struct Inner {
    api_key: String,
    resolver: UserFn,
    login_url: String,
    endpoint: String,
    client: reqwest::Client,
}

/// Redirects callers into the dashboard or to the login page.
#[derive(Clone)]
pub struct LoginHandler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LoginHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginHandler")
            .field("login_url", &self.inner.login_url)
            .field("endpoint", &self.inner.endpoint)
            .finish()
    }
}

impl LoginHandler {
    /// Answer with `302 Found` to wherever the caller should go next.
    pub async fn handle(&self, req: Request) -> Result<Response, LoginError> {
        let (parts, _) = req.into_parts();
        let location = self.redirect_location(&parts).await?;
        Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
    }

    /// Compute the redirect target for a request.
    pub async fn redirect_location(&self, parts: &request::Parts) -> Result<String, LoginError> {
        let user = (self.inner.resolver)(parts)
            .map_err(|e| LoginError::User(e.to_string()))?
            .filter(|user| !is_empty_user(user));

        let Some(user) = user else {
            let original = parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            tracing::debug!(path = original, "No user, redirecting to login");
            return Ok(append_query(&self.inner.login_url, "redirect", original));
        };

        let session = self.fetch_session().await?;
        let token = sign_token(user, &session.jwt_secret)?;
        Ok(append_query(&session.base_url, "auth_token", &token))
    }

    /// Ask the companion API for the signing secret and dashboard URL.
    pub async fn fetch_session(&self) -> Result<CompanionSession, LoginError> {
        let response = self
            .inner
            .client
            .get(&self.inner.endpoint)
            .basic_auth(&self.inner.api_key, Some(""))
            .send()
            .await
            .map_err(|e| LoginError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoginError::Upstream {
                status: status.as_u16(),
            });
        }

        response
            .json::<CompanionSession>()
            .await
            .map_err(|e| LoginError::InvalidResponse(e.to_string()))
    }

    /// A `GET` route that serves this handler.
    pub fn into_route<S>(self) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        get(move |req: Request| {
            let handler = self.clone();
            async move { handler.handle(req).await }
        })
    }
}

/// `null`, `false`, `""` and `0` stand for "no user", like an empty group key
/// does for the metrics middleware.
fn is_empty_user(user: &Value) -> bool {
    match user {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Sign `user` as HS256 claims, adding `iat` to object payloads that lack one.
fn sign_token(mut user: Value, secret: &str) -> Result<String, LoginError> {
    if let Value::Object(claims) = &mut user {
        claims
            .entry("iat")
            .or_insert_with(|| Value::from(chrono::Utc::now().timestamp()));
    }

    encode(
        &Header::default(),
        &user,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| LoginError::Token(e.to_string()))
}

fn append_query(base: &str, key: &str, value: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", base, separator, key, urlencoding::encode(value))
}
