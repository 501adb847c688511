//! Client configuration, loadable from files, the environment, or `.env`
//! files.

use std::{
    collections::BTreeMap,
    env, fs, io,
    path::Path,
    time::Duration,
};

use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://app.nocodb.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_FACTOR: f64 = 0.5;

/// An error encountered while loading or resolving a configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The config file could not be read.
    #[error("Failed to load config file")]
    Io(#[from] io::Error),
    /// The config file was not valid YAML.
    #[error("Invalid YAML configuration")]
    InvalidYaml(#[from] serde_yaml::Error),
    /// The config file was not valid TOML.
    #[error("Invalid TOML configuration")]
    InvalidToml(#[from] toml::de::Error),
    /// The config file was not valid JSON.
    #[error("Invalid JSON configuration")]
    InvalidJson(#[from] serde_json::Error),
    /// The config file had an extension other than yaml/yml/toml/json.
    #[error("Unsupported config file format: '{0}'")]
    UnsupportedFormat(String),
    /// The `.env` file could not be read or parsed.
    #[error("Invalid .env file")]
    InvalidDotenv(#[from] dotenvy::Error),
    /// No API token was configured.
    #[error("No API token found")]
    NoApiToken,
    /// The API token was empty or not ASCII.
    #[error("API token contains invalid characters")]
    InvalidApiToken,
    /// The base URL did not parse.
    #[error("Invalid base URL")]
    InvalidBaseUrl(#[from] http::uri::InvalidUri),
    /// A config value failed to parse.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue {
        /// The offending config key or environment variable.
        key: String,
        /// The value that failed to parse.
        value: String,
    },
}

/// A fully resolved configuration for interacting with a NocoDB instance.
#[derive(Clone)]
pub struct Config {
    /// The base URL of the NocoDB instance.
    pub base_url: http::Uri,
    /// The API token to use for authentication.
    pub api_token: String,
    /// The per-request timeout. `None` disables the timeout.
    pub timeout: Option<Duration>,
    /// How many times a rate-limited or server-failed request is retried.
    pub max_retries: u32,
    /// The base, in seconds, of the exponential backoff between retries.
    pub backoff_factor: f64,
    /// Idle connections kept around per host by the transport.
    pub pool_max_idle_per_host: Option<usize>,
    /// The user-agent used on requests.
    pub user_agent: String,
    /// Additional headers attached to every request.
    pub extra_headers: BTreeMap<String, String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("api_token", &"********")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff_factor", &self.backoff_factor)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("user_agent", &self.user_agent)
            .field("extra_headers", &self.extra_headers)
            .finish()
    }
}

/// The raw shape of a config file, before defaults and validation.
#[derive(Debug, Default, Clone, Deserialize)]
struct RawConfig {
    base_url: Option<String>,
    api_token: Option<String>,
    timeout: Option<f64>,
    max_retries: Option<u32>,
    backoff_factor: Option<f64>,
    pool_max_idle_per_host: Option<usize>,
    #[serde(default)]
    extra_headers: BTreeMap<String, String>,
}

impl Config {
    /// Create a configuration with the given base URL and API token, using
    /// defaults for everything else.
    pub fn new(base_url: &str, api_token: impl Into<String>) -> Result<Self, Error> {
        Self::from_raw(RawConfig {
            base_url: Some(base_url.to_owned()),
            api_token: Some(api_token.into()),
            ..Default::default()
        })
    }

    /// Load the configuration from the environment.
    ///
    /// The following variables are read:
    ///
    /// | Environment Variable      | Config Value     |
    /// |---------------------------|------------------|
    /// | `NOCODB_BASE_URL`         | `base_url`       |
    /// | `NOCODB_API_TOKEN`        | `api_token`      |
    /// | `NOCODB_TIMEOUT`          | `timeout`        |
    /// | `NOCODB_MAX_RETRIES`      | `max_retries`    |
    /// | `NOCODB_BACKOFF_FACTOR`   | `backoff_factor` |
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load the configuration from a `.env` file, using the same variable
    /// names as [Config::from_env].
    ///
    /// The process environment is left untouched; variables already set in
    /// the environment take precedence over the file, matching the behavior
    /// of dotenv loaders elsewhere.
    pub fn from_dotenv(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut file_vars = BTreeMap::new();
        for item in dotenvy::from_path_iter(path.as_ref())? {
            let (key, value) = item?;
            file_vars.insert(key, value);
        }

        Self::from_lookup(|key| env::var(key).ok().or_else(|| file_vars.get(key).cloned()))
    }

    /// Load the configuration from a YAML, TOML, or JSON file, selected by
    /// extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = read_config_file(path)?;
        Self::from_raw(raw)
    }

    /// Load the configuration from the given file if there is one, with
    /// `NOCODB_BASE_URL` and `NOCODB_API_TOKEN` environment variables
    /// overriding the corresponding file values.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut raw = match path {
            Some(p) => read_config_file(p)?,
            None => Default::default(),
        };

        if let Ok(url) = env::var("NOCODB_BASE_URL") {
            raw.base_url = Some(url);
        }

        if let Ok(token) = env::var("NOCODB_API_TOKEN") {
            raw.api_token = Some(token);
        }

        Self::from_raw(raw)
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let raw = RawConfig {
            base_url: get("NOCODB_BASE_URL"),
            api_token: get("NOCODB_API_TOKEN"),
            timeout: parse_var("NOCODB_TIMEOUT", get("NOCODB_TIMEOUT"))?,
            max_retries: parse_var("NOCODB_MAX_RETRIES", get("NOCODB_MAX_RETRIES"))?,
            backoff_factor: parse_var("NOCODB_BACKOFF_FACTOR", get("NOCODB_BACKOFF_FACTOR"))?,
            ..Default::default()
        };

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, Error> {
        let base_url = raw
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .parse()?;

        let Some(api_token) = raw.api_token else {
            return Err(Error::NoApiToken);
        };

        if api_token.is_empty() || !api_token.is_ascii() {
            return Err(Error::InvalidApiToken);
        }

        let timeout = match raw.timeout {
            Some(secs) => Some(Duration::try_from_secs_f64(secs).map_err(|_| {
                Error::InvalidValue {
                    key: "timeout".to_string(),
                    value: secs.to_string(),
                }
            })?),
            None => Some(DEFAULT_TIMEOUT),
        };

        Ok(Self {
            base_url,
            api_token,
            timeout,
            max_retries: raw.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            backoff_factor: raw.backoff_factor.unwrap_or(DEFAULT_BACKOFF_FACTOR),
            pool_max_idle_per_host: raw.pool_max_idle_per_host,
            user_agent: format!("nocodb-client/{}", env!("CARGO_PKG_VERSION")),
            extra_headers: raw.extra_headers,
        })
    }
}

fn read_config_file(path: &Path) -> Result<RawConfig, Error> {
    let contents = fs::read_to_string(path)?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)?,
        "toml" => toml::from_str(&contents)?,
        "json" => serde_json::from_str(&contents)?,
        other => return Err(Error::UnsupportedFormat(other.to_string())),
    };

    debug!(path = %path.display(), "loaded config file");

    Ok(raw)
}

fn parse_var<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, Error> {
    match value {
        Some(v) => v.parse().map(Some).map_err(|_| Error::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
        None => Ok(None),
    }
}
