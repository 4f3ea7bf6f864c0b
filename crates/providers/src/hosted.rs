//! Hosted cloud inference API (Gemini-style `generateContent`).

use promptgrid_config::keys;
use promptgrid_config::settings::Settings;
use promptgrid_engine::executor::{GenerateError, Generator};

use crate::{http_client, ProviderError};

const HOSTED_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Client for the hosted inference API.
pub struct HostedClient {
    http: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl HostedClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, HOSTED_API_BASE.to_string())
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: String,
    ) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Resolve the API key (keychain, then environment) and build a client
    /// for the configured model.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let lookup = keys::get_api_key(keys::HOSTED_PROVIDER);
        let key = lookup
            .key
            .ok_or_else(|| ProviderError::MissingKey(keys::env_var_name(keys::HOSTED_PROVIDER)))?;
        Ok(Self::new(key, settings.effective_hosted_model()))
    }

    /// One generation call: system instruction + user content in, first
    /// candidate's text out.
    pub fn generate_content(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = serde_json::json!({
            "system_instruction": { "parts": [{ "text": system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": user_prompt }] }],
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(ProviderError::Http(status, extract_error(&text, status)));
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ProviderError::Parse(e.to_string()))?;

        let content = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("");

        // An empty text response is an error, not a blank cell.
        if content.is_empty() {
            return Err(ProviderError::Empty);
        }

        Ok(content.to_string())
    }
}

/// Pull the API's error message out of the response body, falling back to
/// the raw text.
fn extract_error(body: &str, status: u16) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| {
            if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body.to_string()
            }
        })
}

impl Generator for HostedClient {
    fn generate(&self, prompt: &str, input: &str) -> Result<String, GenerateError> {
        self.generate_content(prompt, input).map_err(Into::into)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
