//! Configuration management
//!
//! This module handles loading and parsing configuration for the Agora server.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Authentication and session configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of the site, always trusted for CORS
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Origins allowed to make credentialed cross-origin requests
    #[serde(default = "default_trusted_origins")]
    pub trusted_origins: Vec<String>,
    /// Directory with the front-end assets served for non-API paths
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// Take the client IP from X-Forwarded-For / X-Real-IP; only safe behind a proxy that sets them
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            trusted_origins: default_trusted_origins(),
            public_dir: default_public_dir(),
            trust_proxy_headers: false,
        }
    }
}

impl ServerConfig {
    /// All origins trusted for CORS, including the base URL, without duplicates
    pub fn all_trusted_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = Vec::new();
        for origin in self.trusted_origins.iter().chain(std::iter::once(&self.base_url)) {
            let origin = origin.trim().trim_end_matches('/');
            if !origin.is_empty() && !origins.iter().any(|o| o == origin) {
                origins.push(origin.to_string());
            }
        }
        origins
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4321
}

fn default_base_url() -> String {
    "http://localhost:4321".to_string()
}

fn default_trusted_origins() -> Vec<String> {
    vec![
        "http://localhost:4321".to_string(),
        "http://localhost:4322".to_string(),
    ]
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/agora.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL / MariaDB
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// A session used after this many hours since its last refresh gets its expiry extended
    #[serde(default = "default_session_update_age_hours")]
    pub session_update_age_hours: i64,
    /// Minimum password length for registration
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            session_update_age_hours: default_session_update_age_hours(),
            min_password_length: default_min_password_length(),
            cookie_name: default_cookie_name(),
        }
    }
}

impl AuthConfig {
    /// Session lifetime in seconds, used for the cookie Max-Age
    pub fn session_max_age_secs(&self) -> i64 {
        self.session_days * 24 * 60 * 60
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_session_update_age_hours() -> i64 {
    24
}

fn default_min_password_length() -> usize {
    8
}

fn default_cookie_name() -> String {
    "agora_session".to_string()
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload directory path
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 5MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(mime_type))
    }

    /// Get file extension for a MIME type
    pub fn get_extension(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        }
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - AGORA_SERVER_HOST
    /// - AGORA_SERVER_PORT
    /// - AGORA_SERVER_BASE_URL
    /// - AGORA_SERVER_TRUSTED_ORIGINS (comma separated)
    /// - AGORA_SERVER_PUBLIC_DIR
    /// - AGORA_SERVER_TRUST_PROXY_HEADERS
    /// - AGORA_DATABASE_DRIVER
    /// - AGORA_DATABASE_URL (falls back to DATABASE_URL)
    /// - AGORA_CACHE_TTL_SECONDS
    /// - AGORA_AUTH_SESSION_DAYS
    /// - AGORA_UPLOAD_PATH
    ///
    /// The result is validated before it is returned.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("AGORA_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("AGORA_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(base_url) = std::env::var("AGORA_SERVER_BASE_URL") {
            self.server.base_url = base_url;
        }
        if let Ok(origins) = std::env::var("AGORA_SERVER_TRUSTED_ORIGINS") {
            self.server.trusted_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Ok(dir) = std::env::var("AGORA_SERVER_PUBLIC_DIR") {
            self.server.public_dir = PathBuf::from(dir);
        }
        if let Ok(trust) = std::env::var("AGORA_SERVER_TRUST_PROXY_HEADERS") {
            if let Ok(trust) = trust.parse::<bool>() {
                self.server.trust_proxy_headers = trust;
            }
        }

        // Database configuration
        if let Ok(driver) = std::env::var("AGORA_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" | "mariadb" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        let url = std::env::var("AGORA_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL"));
        if let Ok(url) = url {
            if url.starts_with("mysql://") || url.starts_with("mariadb://") {
                self.database.driver = DatabaseDriver::Mysql;
            }
            self.database.url = url;
        }

        // Cache configuration
        if let Ok(ttl) = std::env::var("AGORA_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        // Auth configuration
        if let Ok(days) = std::env::var("AGORA_AUTH_SESSION_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.auth.session_days = days;
            }
        }

        // Upload configuration
        if let Ok(path) = std::env::var("AGORA_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }
    }

    /// Check values that would make the server misbehave at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError("server.port must not be 0".to_string()));
        }
        if self.auth.session_days < 1 {
            return Err(ConfigError::ValidationError(
                "auth.session_days must be at least 1".to_string(),
            ));
        }
        if self.auth.cookie_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.cookie_name must not be empty".to_string(),
            ));
        }
        if self.upload.allowed_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "upload.allowed_types must list at least one MIME type".to_string(),
            ));
        }
        Ok(())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_VARS: &[&str] = &[
    "AGORA_SERVER_HOST",
    "AGORA_SERVER_PORT",
    "AGORA_SERVER_BASE_URL",
    "AGORA_SERVER_TRUSTED_ORIGINS",
    "AGORA_SERVER_PUBLIC_DIR",
    "AGORA_SERVER_TRUST_PROXY_HEADERS",
    "AGORA_DATABASE_DRIVER",
    "AGORA_DATABASE_URL",
    "DATABASE_URL",
    "AGORA_CACHE_TTL_SECONDS",
    "AGORA_AUTH_SESSION_DAYS",
    "AGORA_UPLOAD_PATH",
];

#[cfg(test)]
fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}
