//! Account-service client.
//!
//! Handles bearer-token login and loading/saving the user config (the
//! list of networks) on the account service that sits next to an enhanced
//! server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::network::NetworkConfig;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// User config as stored by the account service (or a local file).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfig {
    pub log: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_message: Option<String>,
    pub client_settings: serde_json::Map<String, Value>,
    pub networks: Vec<NetworkConfig>,
}

/// Successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub token: String,
    pub username: String,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
    username: Option<String>,
}

#[derive(Deserialize)]
struct VerifyResponse {
    username: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

#[derive(Clone)]
pub struct ZubrApi {
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for ZubrApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZubrApi").field("base_url", &self.base_url).finish()
    }
}

impl ZubrApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Login, ApiError> {
        let resp = self
            .http
            .post(self.url("/api/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        let resp = check(resp).await?;
        let body: LoginResponse = resp.json().await?;
        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Malformed("login response has no token".into()))?;
        Ok(Login {
            token,
            username: body.username.unwrap_or_else(|| username.to_string()),
        })
    }

    /// Returns the username the token belongs to.
    pub async fn verify_token(&self, token: &str) -> Result<String, ApiError> {
        let resp = self
            .http
            .post(self.url("/api/verify"))
            .bearer_auth(token)
            .send()
            .await?;
        let body: VerifyResponse = check(resp).await?.json().await?;
        body.username
            .ok_or_else(|| ApiError::Malformed("verify response has no username".into()))
    }

    pub async fn get_user_config(&self, token: &str) -> Result<UserConfig, ApiError> {
        let resp = self
            .http
            .get(self.url("/api/user/config"))
            .bearer_auth(token)
            .send()
            .await?;
        let mut body: Value = check(resp).await?.json().await?;
        // Either `{ "config": {...} }` or the config itself.
        let config = match body.get_mut("config") {
            Some(inner) if inner.is_object() => inner.take(),
            _ => body,
        };
        serde_json::from_value(config).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    pub async fn save_user_config(&self, token: &str, config: &UserConfig) -> Result<(), ApiError> {
        let resp = self
            .http
            .put(self.url("/api/user/config"))
            .bearer_auth(token)
            .json(config)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Map non-success responses to errors, preferring the service's own message.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if matches!(status.as_u16(), 401 | 403) {
        return Err(ApiError::Unauthorized);
    }
    let message = resp
        .json::<ErrorResponse>()
        .await
        .ok()
        .and_then(|e| e.error)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}
