//! Configuration management
//!
//! Layered: YAML file, then `CHAT_GATEWAY_` environment overrides, then
//! optional dotenv files loaded into the process environment. Secrets may be
//! given indirectly as `env:VAR_NAME` so the YAML never holds the raw value.

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Minimum entropy for the shared signing secret, in bytes
pub const MIN_SECRET_BYTES: usize = 32;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Token issuance/verification configuration
    pub auth: AuthConfig,
    /// CORS allow-list configuration
    pub cors: CorsConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Session store configuration
    pub store: StoreConfig,
    /// Retry configuration for store calls
    pub retry: RetryConfig,
    /// Completion provider configuration
    pub provider: ProviderConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Token issuance and verification configuration.
///
/// The same secret/issuer/audience triple is consumed by both the issuing
/// and the verifying side; `Gateway::run` performs an issue→verify
/// round-trip at startup so a desynchronized secret is a fatal startup
/// error rather than a runtime surprise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HMAC signing secret (supports `env:VAR_NAME` indirection).
    /// Must be at least 32 bytes. There is no default and no auto-generation:
    /// a missing secret fails closed at startup.
    pub secret: Option<String>,
    /// `iss` claim written and required
    pub issuer: String,
    /// `aud` claim written and required
    pub audience: String,
    /// The single identity allowed to mint tokens and read/write sessions
    pub authorized_identity: String,
    /// Bearer token lifetime (minutes, not hours)
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,
    /// Paths that bypass bearer auth
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/auth/token".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            issuer: "chat-gateway".to_string(),
            audience: "chat-backend".to_string(),
            authorized_identity: String::new(),
            token_ttl: Duration::from_secs(600),
            public_paths: default_public_paths(),
        }
    }
}

impl AuthConfig {
    /// Resolve the signing secret, expanding `env:VAR_NAME` indirection.
    ///
    /// # Errors
    ///
    /// Fails closed if the secret is absent, the referenced environment
    /// variable is unset, or the value is shorter than [`MIN_SECRET_BYTES`].
    pub fn resolve_secret(&self) -> Result<String> {
        let raw = self
            .secret
            .as_ref()
            .ok_or_else(|| Error::Config("auth.secret is required".to_string()))?;

        let resolved = if let Some(var_name) = raw.strip_prefix("env:") {
            env::var(var_name).map_err(|_| {
                Error::Config(format!("auth.secret references unset variable {var_name}"))
            })?
        } else {
            raw.clone()
        };

        if resolved.len() < MIN_SECRET_BYTES {
            return Err(Error::Config(format!(
                "auth.secret must be at least {MIN_SECRET_BYTES} bytes, got {}",
                resolved.len()
            )));
        }

        Ok(resolved)
    }
}

/// CORS configuration.
///
/// Origins are matched exactly against a static allow-list. Wildcards are
/// only honored when `allow_wildcard` is explicitly set (development mode);
/// a `*` entry without it is a startup error.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Explicit allowed origins (scheme + host + port)
    pub allowed_origins: Vec<String>,
    /// Permit a `*` entry (development only)
    pub allow_wildcard: bool,
}

/// Rate limiting configuration.
///
/// Counters are in-memory and approximate; they reset when the process
/// restarts. Keyed per client (forwarded-for or peer address).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Maximum requests per window per client
    pub max_requests: u32,
    /// Window over which `max_requests` applies
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store backend selection
    pub backend: StoreBackend,
    /// Base URL of the remote conversation store (remote backend only)
    pub url: Option<String>,
    /// Per-call timeout for store operations
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Default page size for session listings
    pub default_list_limit: usize,
}

/// Which store adapter to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store (tests, self-contained deployments)
    #[default]
    Memory,
    /// HTTP adapter to the external conversation store
    Remote,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            timeout: Duration::from_secs(5),
            default_list_limit: 50,
        }
    }
}

/// Retry configuration for retryable store failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum attempts (including the first)
    pub max_attempts: u32,
    /// Initial backoff duration
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Chat-completions endpoint URL
    pub url: String,
    /// Model identifier forwarded to the provider
    pub model: String,
    /// API key (supports `env:VAR_NAME` indirection; optional)
    pub api_key: Option<String>,
    /// Per-call timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:11434/v1/chat/completions".to_string(),
            model: "default".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl ProviderConfig {
    /// Resolve the API key, expanding `env:VAR_NAME` indirection
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| {
            if let Some(var_name) = key.strip_prefix("env:") {
                env::var(var_name).unwrap_or_else(|_| key.clone())
            } else {
                key.clone()
            }
        })
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (CHAT_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("CHAT_GATEWAY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before `env:` resolution)
        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Validate the configuration for serving.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for any invariant violation: missing/short
    /// secret, empty authorized identity, empty issuer/audience, wildcard
    /// origins outside development mode, or a remote store without a URL.
    pub fn validate(&self) -> Result<()> {
        self.auth.resolve_secret()?;

        if self.auth.authorized_identity.trim().is_empty() {
            return Err(Error::Config(
                "auth.authorized_identity is required".to_string(),
            ));
        }
        if self.auth.issuer.is_empty() || self.auth.audience.is_empty() {
            return Err(Error::Config(
                "auth.issuer and auth.audience are required".to_string(),
            ));
        }
        if self.auth.token_ttl < Duration::from_secs(30)
            || self.auth.token_ttl > Duration::from_secs(3600)
        {
            return Err(Error::Config(
                "auth.token_ttl must be between 30s and 1h".to_string(),
            ));
        }

        if self.cors.allowed_origins.is_empty() && !self.cors.allow_wildcard {
            return Err(Error::Config(
                "cors.allowed_origins must list at least one origin".to_string(),
            ));
        }
        if !self.cors.allow_wildcard
            && self.cors.allowed_origins.iter().any(|o| o.contains('*'))
        {
            return Err(Error::Config(
                "wildcard origins require cors.allow_wildcard (development only)".to_string(),
            ));
        }

        if self.rate_limit.enabled && self.rate_limit.max_requests == 0 {
            return Err(Error::Config(
                "rate_limit.max_requests must be greater than zero".to_string(),
            ));
        }

        if self.store.backend == StoreBackend::Remote && self.store.url.is_none() {
            return Err(Error::Config(
                "store.url is required for the remote backend".to_string(),
            ));
        }

        Ok(())
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
