//! Local OpenAI-compatible endpoint (Ollama, LM Studio, llama.cpp server).

use promptgrid_config::settings::Settings;
use promptgrid_engine::executor::{GenerateError, Generator};

use crate::{http_client, ProviderError};

/// Client for a local `/v1/chat/completions` endpoint.
pub struct LocalClient {
    http: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

impl LocalClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: http_client(),
            base_url,
            model: model.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.effective_local_endpoint(),
            settings.effective_local_model(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One non-streaming chat completion: system prompt + user message in,
    /// first choice's message content out.
    pub fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "stream": false,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(ProviderError::Http(status, text));
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ProviderError::Parse(e.to_string()))?;

        // Missing content is treated as empty, and empty is an error:
        // a blank cell with status "succeeded" would read as a silent drop.
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");

        if content.is_empty() {
            return Err(ProviderError::Empty);
        }

        Ok(content.to_string())
    }

    /// Cheap reachability check for the doctor command.
    pub fn ping(&self) -> Result<(), ProviderError> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Http(status, body));
        }

        Ok(())
    }
}

impl Generator for LocalClient {
    fn generate(&self, prompt: &str, input: &str) -> Result<String, GenerateError> {
        self.chat(prompt, input).map_err(Into::into)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn completion_response(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    #[test]
    fn test_chat_extracts_first_choice_content() {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .json_body_includes(
                    r#"{
                        "model": "test-model",
                        "stream": false,
                        "messages": [
                            { "role": "system", "content": "Summarize the text" },
                            { "role": "user", "content": "Long text..." }
                        ]
                    }"#,
                );
            then.status(200)
                .header("content-type", "application/json")
                .json_body(completion_response("Short summary"));
        });

        let client = LocalClient::new(server.base_url(), "test-model");
        let out = client.chat("Summarize the text", "Long text...").unwrap();

        mock.assert();
        assert_eq!(out, "Short summary");
    }

    #[test]
    fn test_non_2xx_error_includes_body_text() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500).body("model failed to load");
        });

        let client = LocalClient::new(server.base_url(), "test-model");
        let err = client.chat("prompt", "input").unwrap_err();

        match err {
            ProviderError::Http(500, body) => assert!(body.contains("model failed to load")),
            other => panic!("expected Http(500, ..), got {:?}", other),
        }
    }

    #[test]
    fn test_missing_content_is_empty_error() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({ "choices": [] }));
        });

        let client = LocalClient::new(server.base_url(), "test-model");
        let err = client.chat("prompt", "input").unwrap_err();
        assert!(matches!(err, ProviderError::Empty));
    }

    #[test]
    fn test_empty_content_is_empty_error() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(completion_response(""));
        });

        let client = LocalClient::new(server.base_url(), "test-model");
        let err = client.chat("prompt", "input").unwrap_err();
        assert!(matches!(err, ProviderError::Empty));
    }

    #[test]
    fn test_non_json_success_body_is_parse_error() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).body("not json");
        });

        let client = LocalClient::new(server.base_url(), "test-model");
        let err = client.chat("prompt", "input").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn test_trailing_slash_trimmed_from_base_url() {
        let client = LocalClient::new("http://localhost:11434/", "m");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_ping_ok_and_unreachable() {
        let server = MockServer::start();

        let models = server.mock(|when, then| {
            when.method(GET).path("/v1/models");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({ "data": [] }));
        });

        let client = LocalClient::new(server.base_url(), "m");
        client.ping().unwrap();
        models.assert();

        // Connection refused on a port nothing listens on
        let dead = LocalClient::new("http://127.0.0.1:1", "m");
        assert!(matches!(dead.ping(), Err(ProviderError::Network(_))));
    }

    #[test]
    fn test_generate_maps_provider_error_to_generate_error() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(404).body("no such model");
        });

        let client = LocalClient::new(server.base_url(), "test-model");
        let err = client.generate("prompt", "input").unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));
        assert!(err.to_string().contains("no such model"));
    }
}
