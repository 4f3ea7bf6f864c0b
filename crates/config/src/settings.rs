// Application settings
// Loaded from ~/.config/promptgrid/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default endpoint for the local provider (Ollama / any OpenAI-compatible
/// server).
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:11434";

/// Generation provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Local OpenAI-compatible endpoint (default; no API key required)
    #[default]
    Local,
    /// Hosted cloud inference API
    Hosted,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::Hosted => "hosted",
        }
    }

    /// Returns true if this provider authenticates with an API key
    pub fn needs_api_key(&self) -> bool {
        matches!(self, Provider::Hosted)
    }

    /// Returns the default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Local => "llama3:8b",
            Provider::Hosted => "gemini-2.0-flash",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Selected generation provider
    pub provider: Provider,

    /// Model identifier for the hosted provider (empty = provider default)
    #[serde(rename = "hosted.model")]
    pub hosted_model: String,

    /// Base URL of the local endpoint
    #[serde(rename = "local.endpoint")]
    pub local_endpoint: Option<String>,

    /// Model identifier for the local provider (empty = provider default)
    #[serde(rename = "local.model")]
    pub local_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::Local,
            hosted_model: String::new(), // Empty = use provider default
            local_endpoint: None,
            local_model: String::new(),
        }
    }
}

impl Settings {
    /// Get the effective hosted model (user-specified or provider default)
    pub fn effective_hosted_model(&self) -> &str {
        if self.hosted_model.is_empty() {
            Provider::Hosted.default_model()
        } else {
            &self.hosted_model
        }
    }

    /// Get the effective local model (user-specified or provider default)
    pub fn effective_local_model(&self) -> &str {
        if self.local_model.is_empty() {
            Provider::Local.default_model()
        } else {
            &self.local_model
        }
    }

    /// Get the effective endpoint for the local provider
    pub fn effective_local_endpoint(&self) -> &str {
        self.local_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or(DEFAULT_LOCAL_ENDPOINT)
    }

    /// The model the active provider will use
    pub fn effective_model(&self) -> &str {
        match self.provider {
            Provider::Local => self.effective_local_model(),
            Provider::Hosted => self.effective_hosted_model(),
        }
    }

    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("promptgrid");
        config_dir.join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }

        Self::load_from(&path)
    }

    /// Load settings from a specific file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => {
                // Strip comments (lines starting with //)
                let cleaned: String = contents
                    .lines()
                    .filter(|line| !line.trim().starts_with("//"))
                    .collect::<Vec<_>>()
                    .join("\n");

                match serde_json::from_str(&cleaned) {
                    Ok(settings) => settings,
                    Err(e) => {
                        eprintln!("Error parsing {}: {}", path.display(), e);
                        eprintln!("Using default settings");
                        Self::default()
                    }
                }
            }
            Err(e) => {
                eprintln!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save current settings to disk as one whole-file replace
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    /// Save settings to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // Generation provider: "local" or "hosted"
    // API keys are stored in the system keychain, not in this file
    "provider": "local",

    // Hosted provider model
    "hosted.model": "",

    // Local OpenAI-compatible endpoint and model
    "local.endpoint": null,
    "local.model": ""
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            eprintln!("Error writing default settings.json: {}", e);
        }
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.provider, Provider::Local);
        assert_eq!(settings.effective_local_endpoint(), DEFAULT_LOCAL_ENDPOINT);
        assert_eq!(settings.effective_local_model(), "llama3:8b");
        assert_eq!(settings.effective_hosted_model(), "gemini-2.0-flash");
    }

    #[test]
    fn test_effective_model_follows_provider() {
        let mut settings = Settings::default();
        settings.local_model = "qwen2:7b".into();
        assert_eq!(settings.effective_model(), "qwen2:7b");

        settings.provider = Provider::Hosted;
        assert_eq!(settings.effective_model(), "gemini-2.0-flash");
    }

    #[test]
    fn test_blank_endpoint_falls_back_to_default() {
        let mut settings = Settings::default();
        settings.local_endpoint = Some("   ".into());
        assert_eq!(settings.effective_local_endpoint(), DEFAULT_LOCAL_ENDPOINT);

        settings.local_endpoint = Some("http://10.0.0.5:8080".into());
        assert_eq!(settings.effective_local_endpoint(), "http://10.0.0.5:8080");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.provider = Provider::Hosted;
        settings.hosted_model = "gemini-2.5-pro".into();
        settings.local_endpoint = Some("http://localhost:1234".into());
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded.provider, Provider::Hosted);
        assert_eq!(loaded.hosted_model, "gemini-2.5-pro");
        assert_eq!(loaded.local_endpoint.as_deref(), Some("http://localhost:1234"));
    }

    #[test]
    fn test_load_tolerates_comment_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            "{\n// provider choice\n\"provider\": \"hosted\"\n}\n",
        )
        .unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded.provider, Provider::Hosted);
    }

    #[test]
    fn test_load_bad_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded.provider, Provider::Local);
    }
}
