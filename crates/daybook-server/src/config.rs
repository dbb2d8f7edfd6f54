//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. Without an `OPENAI_API_KEY` the
//! server runs on placeholder generators.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use rand::RngCore;

use daybook_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_REQUESTS_PER_MINUTE, DEFAULT_SESSION_TTL_DAYS,
    DEFAULT_WEEKLY_ENTRY_LIMIT, MAX_IMAGE_SIZE,
};

/// Which image host receives generated illustrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageHostKind {
    /// Files under `IMAGE_STORAGE_PATH`, served back by this process.
    Local,
    /// Cloudinary, using the `CLOUDINARY_*` credentials.
    Cloudinary,
}

#[derive(Clone, PartialEq, Eq)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for CloudinaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite file holding users, entries and profiles.
    /// Env: `DATABASE_PATH`
    /// Default: `./daybook.db`
    pub database_path: PathBuf,

    /// HMAC secret for session JWTs.
    /// Env: `JWT_SECRET`
    /// Default: random per process (sessions do not survive a restart).
    pub jwt_secret: Vec<u8>,

    /// Env: `SESSION_TTL_DAYS`
    pub session_ttl_days: i64,

    /// Set the `Secure` attribute on the session cookie.
    /// Env: `SECURE_COOKIES` (true/false)
    pub secure_cookies: bool,

    /// Env: `OPENAI_API_KEY`
    pub openai_api_key: Option<String>,

    /// Env: `OPENAI_BASE_URL`
    pub openai_base_url: String,

    /// Env: `OPENAI_CHAT_MODEL`
    pub chat_model: String,

    /// Env: `OPENAI_IMAGE_MODEL`
    pub image_model: String,

    /// Timeout applied to generative and image-host HTTP calls.
    /// Env: `GENERATION_TIMEOUT_SECS`
    pub generation_timeout: Duration,

    /// Substitute deterministic placeholder output for generative calls.
    /// Env: `USE_PLACEHOLDER_AI` (true/false)
    pub use_placeholder_ai: bool,

    /// Derive an author-style rewrite for every new entry.
    /// Env: `STYLIZE_ENTRIES` (true/false)
    pub stylize_entries: bool,

    /// Env: `IMAGE_HOST` (`local` | `cloudinary`)
    pub image_host: ImageHostKind,

    /// Env: `IMAGE_STORAGE_PATH`
    pub image_storage_path: PathBuf,

    /// Base URL under which locally hosted images are reachable.
    /// Env: `PUBLIC_BASE_URL`
    pub public_base_url: String,

    /// Env: `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET`
    pub cloudinary: Option<CloudinaryCredentials>,

    /// Largest image the local host stores.
    pub max_image_size: usize,

    /// Shared counter store. `None` selects the in-process store.
    /// Env: `REDIS_URL`
    pub redis_url: Option<String>,

    /// Env: `RATE_LIMIT_PER_MINUTE`
    pub requests_per_minute: u64,

    /// Env: `WEEKLY_ENTRY_LIMIT`
    pub weekly_entry_limit: u64,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"<redacted>")
            .field("session_ttl_days", &self.session_ttl_days)
            .field("secure_cookies", &self.secure_cookies)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("openai_base_url", &self.openai_base_url)
            .field("chat_model", &self.chat_model)
            .field("image_model", &self.image_model)
            .field("generation_timeout", &self.generation_timeout)
            .field("use_placeholder_ai", &self.use_placeholder_ai)
            .field("stylize_entries", &self.stylize_entries)
            .field("image_host", &self.image_host)
            .field("image_storage_path", &self.image_storage_path)
            .field("public_base_url", &self.public_base_url)
            .field("cloudinary", &self.cloudinary)
            .field("max_image_size", &self.max_image_size)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<redacted>"))
            .field("requests_per_minute", &self.requests_per_minute)
            .field("weekly_entry_limit", &self.weekly_entry_limit)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./daybook.db"),
            jwt_secret: random_secret(),
            session_ttl_days: DEFAULT_SESSION_TTL_DAYS,
            secure_cookies: false,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            image_model: "dall-e-3".to_string(),
            generation_timeout: Duration::from_secs(120),
            use_placeholder_ai: false,
            stylize_entries: true,
            image_host: ImageHostKind::Local,
            image_storage_path: PathBuf::from("./images"),
            public_base_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            cloudinary: None,
            max_image_size: MAX_IMAGE_SIZE,
            redis_url: None,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            weekly_entry_limit: DEFAULT_WEEKLY_ENTRY_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = get("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = get("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        match get("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => config.jwt_secret = secret.into_bytes(),
            None => tracing::warn!(
                "JWT_SECRET not set, using a random secret; sessions end on restart"
            ),
        }

        parse_into(&get, "SESSION_TTL_DAYS", &mut config.session_ttl_days);
        parse_flag(&get, "SECURE_COOKIES", &mut config.secure_cookies);

        config.openai_api_key = get("OPENAI_API_KEY").filter(|k| !k.is_empty());
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("OPENAI_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Some(model) = get("OPENAI_IMAGE_MODEL") {
            config.image_model = model;
        }

        let mut timeout_secs = config.generation_timeout.as_secs();
        parse_into(&get, "GENERATION_TIMEOUT_SECS", &mut timeout_secs);
        config.generation_timeout = Duration::from_secs(timeout_secs.max(1));

        parse_flag(&get, "USE_PLACEHOLDER_AI", &mut config.use_placeholder_ai);
        parse_flag(&get, "STYLIZE_ENTRIES", &mut config.stylize_entries);

        if let Some(kind) = get("IMAGE_HOST") {
            match kind.trim().to_ascii_lowercase().as_str() {
                "local" => config.image_host = ImageHostKind::Local,
                "cloudinary" => config.image_host = ImageHostKind::Cloudinary,
                other => tracing::warn!(value = %other, "Unknown IMAGE_HOST, using local"),
            }
        }

        if let Some(path) = get("IMAGE_STORAGE_PATH") {
            config.image_storage_path = PathBuf::from(path);
        }
        if let Some(url) = get("PUBLIC_BASE_URL") {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }

        if let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
            get("CLOUDINARY_CLOUD_NAME"),
            get("CLOUDINARY_API_KEY"),
            get("CLOUDINARY_API_SECRET"),
        ) {
            config.cloudinary = Some(CloudinaryCredentials {
                cloud_name,
                api_key,
                api_secret,
            });
        }
        if config.image_host == ImageHostKind::Cloudinary && config.cloudinary.is_none() {
            tracing::warn!("IMAGE_HOST=cloudinary without CLOUDINARY_* credentials, using local");
            config.image_host = ImageHostKind::Local;
        }

        parse_into(&get, "MAX_IMAGE_BYTES", &mut config.max_image_size);

        config.redis_url = get("REDIS_URL").filter(|u| !u.is_empty());
        parse_into(&get, "RATE_LIMIT_PER_MINUTE", &mut config.requests_per_minute);
        parse_into(&get, "WEEKLY_ENTRY_LIMIT", &mut config.weekly_entry_limit);

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Placeholder generators are used in test mode and whenever no API key
    /// is available.
    pub fn placeholder_generators(&self) -> bool {
        self.use_placeholder_ai || self.openai_api_key.is_none()
    }
}

fn parse_into<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = get(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(key, value = %raw, "Invalid value, using default"),
        }
    }
}

fn parse_flag(get: &impl Fn(&str) -> Option<String>, key: &str, target: &mut bool) {
    if let Some(val) = get(key) {
        *target = val != "false" && val != "0";
    }
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.weekly_entry_limit, 5);
        assert_eq!(config.jwt_secret.len(), 32);
        assert!(config.placeholder_generators());
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("OPENAI_API_KEY", "sk-test"),
            ("RATE_LIMIT_PER_MINUTE", "10"),
            ("WEEKLY_ENTRY_LIMIT", "2"),
            ("USE_PLACEHOLDER_AI", "0"),
            ("PUBLIC_BASE_URL", "https://diary.example/"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.jwt_secret, b"s3cret".to_vec());
        assert_eq!(config.requests_per_minute, 10);
        assert_eq!(config.weekly_entry_limit, 2);
        assert_eq!(config.public_base_url, "https://diary.example");
        assert!(!config.placeholder_generators());
    }

    #[test]
    fn test_invalid_numbers_keep_defaults() {
        let config = config_from(&[("RATE_LIMIT_PER_MINUTE", "lots"), ("HTTP_ADDR", "nope")]);
        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
    }

    #[test]
    fn test_cloudinary_without_credentials_falls_back_to_local() {
        let config = config_from(&[("IMAGE_HOST", "cloudinary")]);
        assert_eq!(config.image_host, ImageHostKind::Local);

        let config = config_from(&[
            ("IMAGE_HOST", "cloudinary"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_API_SECRET", "secret"),
        ]);
        assert_eq!(config.image_host, ImageHostKind::Cloudinary);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_from(&[("JWT_SECRET", "top-secret"), ("OPENAI_API_KEY", "sk-live")]);
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(!rendered.contains("sk-live"));
    }
}
