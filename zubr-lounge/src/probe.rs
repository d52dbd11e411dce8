//! Server-family detection over HTTP.
//!
//! Enhanced servers expose `/api/info` next to their IRC port. The probe is
//! best-effort: timeouts, refused connections and odd JSON all classify the
//! host as plain IRC, and nothing here is ever reported as an error.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ProbeError;
use crate::network::{InstanceInfo, ServerType, ZubrRole};

/// Marker an enhanced server puts in its advertised name.
pub const ENHANCED_MARKER: &str = "Zubr";

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Account-service URL used for loopback hosts.
    pub home_url: String,
    pub secure_port: u16,
    pub plain_port: u16,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            home_url: "http://localhost:3000".to_string(),
            secure_port: 443,
            plain_port: 80,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Result of one probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub server_type: ServerType,
    pub instance: InstanceInfo,
    pub role: Option<ZubrRole>,
}

impl ProbeOutcome {
    fn plain() -> Self {
        Self {
            server_type: ServerType::Plain,
            instance: InstanceInfo::default(),
            role: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    signup_mode: Option<String>,
    #[serde(default)]
    source_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    role: Option<ZubrRole>,
}

#[derive(Clone)]
pub struct CapabilityProbe {
    http: reqwest::Client,
    config: ProbeConfig,
}

pub fn is_home_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

impl CapabilityProbe {
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            // Self-signed certificates are common on small instances.
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Base URLs to try, in order.
    pub fn candidates(&self, host: &str) -> Vec<String> {
        if is_home_host(host) {
            return vec![self.config.home_url.trim_end_matches('/').to_string()];
        }
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        vec![
            format!("https://{host}:{}", self.config.secure_port),
            format!("http://{host}:{}", self.config.plain_port),
        ]
    }

    /// Classify `host`, then fetch the user's role if it is enhanced.
    pub async fn classify(&self, host: &str, token: Option<&str>) -> ProbeOutcome {
        for base in self.candidates(host) {
            let info = match self.fetch_info(&base).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::debug!(%base, "Probe attempt failed: {e}");
                    continue;
                }
            };
            let Some(ref name) = info.name else { continue };
            if !name.contains(ENHANCED_MARKER) {
                continue;
            }

            tracing::info!(
                host,
                version = info.version.as_deref().unwrap_or("?"),
                "Detected Zubr server"
            );
            let role = match self.fetch_role(&base, token).await {
                Ok(role) => role,
                Err(e) => {
                    tracing::debug!(host, "Role fetch skipped: {e}");
                    None
                }
            };
            return ProbeOutcome {
                server_type: ServerType::Enhanced,
                instance: InstanceInfo {
                    name: info.name,
                    version: info.version,
                    signup_mode: info.signup_mode,
                    source_code: info.source_code,
                },
                role,
            };
        }
        tracing::info!(host, "Detected IRC server (no Zubr API response)");
        ProbeOutcome::plain()
    }

    async fn fetch_info(&self, base: &str) -> Result<InfoResponse, ProbeError> {
        let resp = self.http.get(format!("{base}/api/info")).send().await?;
        if !resp.status().is_success() {
            return Err(ProbeError::Status(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }

    async fn fetch_role(&self, base: &str, token: Option<&str>) -> Result<Option<ZubrRole>, ProbeError> {
        let token = token.ok_or(ProbeError::NoToken)?;
        let resp = self
            .http
            .get(format!("{base}/api/user/me"))
            .bearer_auth(token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProbeError::Status(resp.status().as_u16()));
        }
        let me: MeResponse = resp.json().await?;
        Ok(me.role)
    }
}
