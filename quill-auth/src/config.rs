use config::{Config, ConfigError, File};
use serde::Deserialize;

use crate::storage::DEFAULT_STORAGE_KEY;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

fn default_api_host() -> String {
    "https://api.quill.build".to_string()
}

fn default_login_url() -> String {
    "https://api.quill.build/auth/login".to_string()
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("QUILL_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let settings = Config::builder()
            .add_source(File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("QUILL").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_host.is_empty() {
            return Err("api_host is required".to_string());
        }
        if !self.api_host.starts_with("http") {
            return Err("api_host must be a valid HTTP(S) URL".to_string());
        }
        if self.storage_key.is_empty() {
            return Err("storage_key must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Settings {
        Settings {
            api_host: default_api_host(),
            login_url: default_login_url(),
            storage_key: default_storage_key(),
            callback_url: None,
        }
    }

    #[test]
    fn default_settings_validate() {
        assert!(defaults().validate().is_ok());
    }

    #[test]
    fn non_http_api_host_is_rejected() {
        let settings = Settings {
            api_host: "ftp://example.com".to_string(),
            ..defaults()
        };
        assert!(settings.validate().is_err());
    }
}
