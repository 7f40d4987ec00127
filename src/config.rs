//! Configuration manager for litcircle.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_ACCESS_TOKEN_TTL: u64 = 60 * 60; // 1 hour.
const DEFAULT_REFRESH_TOKEN_TTL: u64 = 60 * 60 * 24 * 14; // 14 days.

fn default_public_paths() -> Vec<String> {
    ["/", "/api/auth/", "/api/status", "/metrics", "/static/", "/public/"]
        .map(String::from)
        .to_vec()
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Listen port. Defaults to 8080.
    pub port: Option<u16>,
    /// Origins allowed by CORS preflight. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to JsonWebToken lifetimes.
    #[serde(default, skip_serializing)]
    pub token: Token,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to the external identity provider.
    #[serde(skip_serializing)]
    pub oauth: Option<OAuthProvider>,
    /// Path prefixes served without a bearer token.
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
    /// Expose `POST /api/auth/dev-login`. Development only.
    #[serde(default)]
    pub dev_login: bool,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Json Web Token lifetimes. The signing secret comes from the
/// `TOKEN_SECRET` environment variable, never from this file.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Access token lifetime in seconds.
    pub access_token_ttl: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_token_ttl: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
        }
    }
}

/// External OAuth provider endpoints and credentials.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct OAuthProvider {
    /// Provider name, used on the callback path
    /// (`/api/auth/{provider}/callback`).
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Authorization-code exchange endpoint.
    pub token_endpoint: String,
    /// Profile endpoint, called with the provider access token.
    pub profile_endpoint: String,
    /// Bound on each outbound call, in seconds. Defaults to 10.
    pub timeout: Option<u64>,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = url::Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                // set app version.
                config.version = VERSION.to_owned();

                // normalize URLs.
                config.url = self.normalize_url(&config.url)?;

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            version: VERSION.to_owned(),
            public_paths: default_public_paths(),
            ..Default::default()
        }
    }
}
