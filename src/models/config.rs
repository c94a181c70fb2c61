//! Configuration model loaded from external sources.

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

#[derive(Clone, Debug, Deserialize, Validate)]
/// Basic configuration shared across handlers.
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub address: String,
    pub port: u16,
    /// Origin allowed to call the upload endpoint from a browser.
    #[validate(url)]
    pub allowed_origin: String,
    /// Address receiving a notification for every upload and payment.
    #[validate(email)]
    pub operator_email: String,
    /// Domains whose addresses never receive confirmation emails.
    #[serde(default = "default_placeholder_domains")]
    pub placeholder_domains: Vec<String>,
    #[validate(nested)]
    pub mail: MailConfig,
    #[validate(nested)]
    pub stripe: StripeConfig,
    #[validate(nested)]
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct MailConfig {
    #[validate(email)]
    pub from: String,
    #[validate(length(min = 1))]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct StripeConfig {
    #[validate(length(min = 1))]
    pub webhook_secret: String,
    /// Maximum age of a signed event in seconds; `0` disables the check.
    #[serde(default = "default_tolerance")]
    pub tolerance_secs: u64,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct UploadConfig {
    #[validate(range(min = 1))]
    pub max_files: usize,
    #[validate(range(min = 1))]
    pub max_file_size: usize,
    #[validate(range(min = 1))]
    pub max_request_size: usize,
    /// Substrings a file's content type must contain. Empty accepts any type.
    #[serde(default = "default_content_types")]
    pub allowed_content_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_file_size: 10 * 1024 * 1024,
            max_request_size: 110 * 1024 * 1024,
            allowed_content_types: default_content_types(),
        }
    }
}

fn default_content_types() -> Vec<String> {
    ["csv", "spreadsheet", "excel"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_placeholder_domains() -> Vec<String> {
    vec!["example.com".to_string()]
}

fn default_smtp_port() -> u16 {
    465
}

fn default_tolerance() -> u64 {
    300
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid settings: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl ServerConfig {
    /// Load `config/default`, the optional `config/<app_env>` profile and
    /// `APP_`-prefixed environment variables (`APP_MAIL__PASSWORD`, ...).
    pub fn load(app_env: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{app_env}")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("placeholder_domains")
                    .with_list_parse_key("upload.allowed_content_types")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_settings(settings)
    }

    /// Deserialize and validate already-assembled settings.
    pub fn from_settings(settings: Config) -> Result<Self, ConfigError> {
        let server_config = settings.try_deserialize::<ServerConfig>()?;
        server_config.validate()?;
        Ok(server_config)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1".into(),
        port: 8080,
        allowed_origin: "https://yukibuy.com".into(),
        operator_email: "contact@yukibuy.com".into(),
        placeholder_domains: default_placeholder_domains(),
        mail: MailConfig {
            from: "audit@yukibuy.com".into(),
            smtp_host: "smtp.example.net".into(),
            smtp_port: 465,
            username: "audit@yukibuy.com".into(),
            password: "secret".into(),
        },
        stripe: StripeConfig {
            webhook_secret: "whsec_test".into(),
            tolerance_secs: 300,
        },
        upload: UploadConfig::default(),
    }
}
