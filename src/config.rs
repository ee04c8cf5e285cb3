use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::email::EmailConfig;
use crate::principal::{ContentOwner, PROTECTED_ROLE};
use crate::tokens::{KeyedHasher, WeakSecret};

/// Upper bound for `cooldown_seconds` and `flash_ttl_seconds` (one year).
pub const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 60 * 60;

/// User-facing texts shown by the deletion form and success banner.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Messages {
    pub title: String,
    pub description: String,
    pub button_text: String,
    pub success_message: String,
    pub primary_color: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            title: "Delete Account & Data".to_string(),
            description: "For your security, we will send a confirmation link to your email. \
                          The link expires in 1 hour."
                .to_string(),
            button_text: "Send Deletion Email".to_string(),
            success_message:
                "Your account and all associated data have been permanently deleted.".to_string(),
            primary_color: "#dc2626".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: PathBuf,
    /// Port the server listens on
    pub port: u16,
    /// Public base URL used to build confirmation and redirect links
    pub base_url: String,
    /// Site name used in email subjects
    pub site_name: String,
    /// Server-held key for token digests and anti-forgery tokens
    pub secret_key: String,
    /// Roles allowed to request deletion of their own account
    pub allowed_roles: Vec<String>,
    /// Email the operator when an account is deleted
    pub notify_operator: bool,
    /// Operator address for deletion notices
    pub operator_email: Option<String>,
    /// Minimum time between token issuances, also the token lifetime
    pub cooldown_seconds: u64,
    /// Lifetime of the post-deletion success flag
    pub flash_ttl_seconds: u64,
    /// Account that inherits surviving content; unset leaves it unattributed
    pub reassign_content_to: Option<i64>,
    pub messages: Messages,
    /// SMTP settings; without them no email can be sent
    pub smtp: Option<EmailConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("remove-my-data");
        Self {
            database_path: data_dir.join("remove-my-data.db"),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            site_name: "My Site".to_string(),
            secret_key: String::new(),
            allowed_roles: vec!["subscriber".to_string()],
            notify_operator: true,
            operator_email: None,
            cooldown_seconds: 3600,
            flash_ttl_seconds: 120,
            reassign_content_to: None,
            messages: Messages::default(),
            smtp: None,
        }
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        if let Ok(db_path) = std::env::var("RMD_DATABASE_PATH") {
            config.database_path = PathBuf::from(db_path);
        }
        if let Ok(port) = std::env::var("RMD_PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RMD_PORT", port))?;
        }
        if let Ok(base_url) = std::env::var("RMD_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(secret) = std::env::var("RMD_SECRET_KEY") {
            config.secret_key = secret;
        }
        if let Ok(email) = std::env::var("RMD_OPERATOR_EMAIL") {
            config.operator_email = Some(email);
        }

        config.allowed_roles = sanitize_roles(&config.allowed_roles);
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        config.validate()?;

        Ok(config)
    }

    /// Rejects time windows that are zero or too long to add to a timestamp.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let windows = [
            ("cooldown_seconds", self.cooldown_seconds),
            ("flash_ttl_seconds", self.flash_ttl_seconds),
        ];
        for (name, seconds) in windows {
            if seconds == 0 || seconds > MAX_WINDOW_SECONDS {
                return Err(ConfigError::InvalidValue(name, seconds.to_string()));
            }
        }
        Ok(())
    }

    /// Default config file path: ~/.config/remove-my-data/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("remove-my-data")
            .join("config.yaml")
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn flash_ttl(&self) -> Duration {
        Duration::from_secs(self.flash_ttl_seconds)
    }

    pub fn reassign_target(&self) -> ContentOwner {
        ContentOwner::from(self.reassign_content_to)
    }

    /// Builds the keyed hasher from `secret_key`.
    pub fn hasher(&self) -> Result<KeyedHasher, ConfigError> {
        KeyedHasher::new(self.secret_key.as_bytes()).map_err(ConfigError::WeakSecret)
    }
}

/// Normalizes role names and drops the protected role.
pub fn sanitize_roles(roles: &[String]) -> Vec<String> {
    let mut clean: Vec<String> = Vec::new();
    for role in roles {
        let role = role.trim().to_lowercase();
        if role.is_empty() || role == PROTECTED_ROLE || clean.contains(&role) {
            continue;
        }
        clean.push(role);
    }
    clean
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
    WeakSecret(WeakSecret),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
            ConfigError::WeakSecret(e) => write!(f, "Invalid secret_key: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
