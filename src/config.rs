use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 6126;

/// Sampling temperature for title normalization requests.
pub const NORMALIZE_TEMPERATURE: f32 = 0.2;

/// Content type sent with every storage upload.
pub const UPLOAD_CONTENT_TYPE: &str = "application/epub+zip";

/// Filename stem used when sanitization strips everything.
pub const FALLBACK_FILENAME: &str = "book";

/// Extension used when the catalogue and the caller give nothing usable.
pub const FALLBACK_EXTENSION: &str = "bin";

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Environment variables parsed into typed values (booleans, numbers).
const TYPED_ENV_KEYS: &[&str] = &[
    "keep_books",
    "login_remix",
    "auth",
    "fix_epub_title",
    "port",
    "upstream_timeout_secs",
];

/// Environment variables taken verbatim, so `api_keys=12345` stays text.
const STRING_ENV_KEYS: &[&str] = &[
    "api_keys",
    "open_router_api_key",
    "open_router_url",
    "completion_model",
    "storage_url",
    "credentials_file",
    "download_dir",
    "library_url",
    "host",
];

/// Which credential pair is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `remix_userid` / `remix_userkey` cookie pair.
    Remix,
    /// `email` / `password` login.
    Email,
}

impl AuthMode {
    /// JSON field names expected by `POST /credentials`, in validation order.
    pub fn field_names(self) -> [&'static str; 2] {
        match self {
            AuthMode::Remix => ["remix_userid", "remix_userkey"],
            AuthMode::Email => ["email", "password"],
        }
    }
}

/// Top-level configuration for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Keep downloaded files on disk after serving them.
    pub keep_books: bool,
    /// Log in with remix id/key instead of email/password.
    pub login_remix: bool,
    /// Require `X-API-Key` on protected routes.
    pub auth: bool,
    /// Comma-separated API-key allow-list.
    pub api_keys: String,
    pub open_router_api_key: String,
    pub open_router_url: String,
    pub completion_model: String,
    /// Base URL for uploads; uploads are skipped when unset.
    pub storage_url: Option<String>,
    pub credentials_file: PathBuf,
    pub download_dir: PathBuf,
    /// Catalogue base URL.
    pub library_url: String,
    pub fix_epub_title: bool,
    pub host: String,
    pub port: u16,
    /// Timeout applied to every outbound HTTP request.
    pub upstream_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            keep_books: false,
            login_remix: true,
            auth: false,
            api_keys: String::new(),
            open_router_api_key: String::new(),
            open_router_url: String::new(),
            completion_model: "openai/gpt-oss-20b:free".to_string(),
            storage_url: None,
            credentials_file: PathBuf::from("credentials.txt"),
            download_dir: PathBuf::from("download"),
            library_url: "https://z-library.sk".to_string(),
            fix_epub_title: true,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            upstream_timeout_secs: 120,
        }
    }
}

impl GatewayConfig {
    /// Load `.env` from the working directory (or a parent) into the
    /// environment, then read the configuration from it. Variables already
    /// set in the environment win over `.env`.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("invalid .env file: {}", e))),
        }
        Self::from_env()
    }

    /// Load defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default())).merge(
            Env::raw().filter(|key| {
                TYPED_ENV_KEYS
                    .iter()
                    .any(|k| key.as_str().eq_ignore_ascii_case(k))
            }),
        );

        for (key, value) in std::env::vars_os() {
            let (Some(key), Some(value)) = (key.to_str(), value.to_str()) else {
                continue;
            };
            if let Some(name) = STRING_ENV_KEYS.iter().find(|k| key.eq_ignore_ascii_case(k)) {
                figment = figment.merge(Serialized::default(name, value));
            }
        }
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment
            .extract()
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))
    }

    pub fn auth_mode(&self) -> AuthMode {
        if self.login_remix {
            AuthMode::Remix
        } else {
            AuthMode::Email
        }
    }

    /// Parsed allow-list with blank entries removed.
    pub fn api_key_list(&self) -> Vec<String> {
        self.api_keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Storage base URL, ignoring a blank value.
    pub fn storage_base(&self) -> Option<&str> {
        self.storage_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
