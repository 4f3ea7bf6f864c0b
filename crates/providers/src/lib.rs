//! Generation adapters.
//!
//! Blocking reqwest clients (no Tokio runtime required) implementing the
//! engine's [`Generator`] seam:
//!
//! - [`HostedClient`] — hosted cloud inference API (Gemini-style
//!   `generateContent`), authenticated with an API key.
//! - [`LocalClient`] — any OpenAI-compatible endpoint
//!   (`/v1/chat/completions`): Ollama, LM Studio, llama.cpp server.
//!
//! There is deliberately no retry or backoff here: a failed call marks the
//! target cell failed and the user regenerates by hand.

pub mod hosted;
pub mod local;

pub use hosted::HostedClient;
pub use local::LocalClient;

use std::time::Duration;

use promptgrid_config::settings::{Provider, Settings};
use promptgrid_engine::executor::{GenerateError, Generator};

pub(crate) const USER_AGENT: &str = concat!("pgrid/", env!("CARGO_PKG_VERSION"));
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type for provider operations.
#[derive(Debug)]
pub enum ProviderError {
    /// Network error (connect failure, timeout)
    Network(String),
    /// HTTP error with status code and the upstream message
    Http(u16, String),
    /// Response was not the JSON shape we expect
    Parse(String),
    /// The call succeeded but produced no text
    Empty,
    /// No API key configured; carries the environment variable to set
    MissingKey(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Network(msg) => write!(f, "Network error: {}", msg),
            ProviderError::Http(code, msg) => write!(f, "HTTP {}: {}", code, msg),
            ProviderError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ProviderError::Empty => write!(f, "Provider returned an empty response"),
            ProviderError::MissingKey(env_var) => write!(
                f,
                "No API key found — store one with `pgrid key set` or set {}",
                env_var
            ),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for GenerateError {
    fn from(err: ProviderError) -> Self {
        GenerateError::new(err.to_string())
    }
}

pub(crate) fn http_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("failed to build HTTP client")
}

/// Build the active adapter from settings.
///
/// Settings are read here, at call time — a mid-flight settings change
/// affects the next run, not one already built.
pub fn from_settings(
    settings: &Settings,
) -> Result<Box<dyn Generator + Send + Sync>, ProviderError> {
    match settings.provider {
        Provider::Hosted => Ok(Box::new(HostedClient::from_settings(settings)?)),
        Provider::Local => Ok(Box::new(LocalClient::from_settings(settings))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_message_names_env_var() {
        let err = ProviderError::MissingKey("PROMPTGRID_HOSTED_KEY".into());
        let msg = err.to_string();
        assert!(msg.contains("PROMPTGRID_HOSTED_KEY"));
        assert!(msg.contains("pgrid key set"));
    }

    #[test]
    fn test_http_error_display() {
        let err = ProviderError::Http(502, "bad gateway".into());
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
    }
}
