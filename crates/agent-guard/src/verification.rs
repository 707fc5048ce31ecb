//! Bot Verification
//!
//! Challenge-response tokens gate the ask endpoints. The server asks a
//! [`BotVerifier`] once per request; the agent only ever sees requests that
//! already passed.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{GuardError, Result};

/// Cloudflare Turnstile verification endpoint
pub const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Checks a client-supplied challenge token
#[async_trait]
pub trait BotVerifier: Send + Sync {
    /// `Ok(false)` means the token was missing or rejected; `Err` means the
    /// check itself could not be performed.
    async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> Result<bool>;

    fn name(&self) -> &str;
}

/// Verifier that accepts every request
pub struct DisabledVerifier;

impl DisabledVerifier {
    pub fn new() -> Self {
        tracing::warn!("Bot verification is disabled; every request is accepted");
        Self
    }
}

impl Default for DisabledVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BotVerifier for DisabledVerifier {
    async fn verify(&self, _token: Option<&str>, _remote_ip: Option<&str>) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Siteverify response body
#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Cloudflare Turnstile verifier
pub struct TurnstileVerifier {
    client: reqwest::Client,
    secret: String,
    endpoint: String,
}

impl TurnstileVerifier {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(GuardError::Config("Turnstile secret must not be empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .map_err(|e| GuardError::Config(e.to_string()))?;

        Ok(Self {
            client,
            secret,
            endpoint: TURNSTILE_VERIFY_URL.into(),
        })
    }

    /// Point at a different siteverify-compatible endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl BotVerifier for TurnstileVerifier {
    async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> Result<bool> {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            tracing::debug!("Request carried no verification token");
            return Ok(false);
        };

        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| GuardError::Verification(e.to_string()))?
            .error_for_status()
            .map_err(|e| GuardError::Verification(e.to_string()))?;

        let body: SiteverifyResponse = response
            .json()
            .await
            .map_err(|e| GuardError::Verification(format!("unreadable response: {e}")))?;

        if !body.success {
            tracing::info!(errors = ?body.error_codes, "Verification token rejected");
        }
        Ok(body.success)
    }

    fn name(&self) -> &str {
        "turnstile"
    }
}
