use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Environment variable holding the remote store URL (a secret)
pub const REMOTE_URL_ENV: &str = "KUNDLI_REMOTE_URL";

/// Environment variable holding the LLM credential (a secret)
pub const LLM_API_KEY_ENV: &str = "KUNDLI_LLM_API_KEY";

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KundliConfig {
    /// Path of the local SQLite file
    pub database: Option<String>,
    /// Credential for the LLM advisor; absent disables chat
    pub llm_api_key: Option<String>,
    /// Remote document store; absent means SQLite only
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// `wss://`, `https://` or `mem://`
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_database")]
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub query_timeout_ms: Option<u64>,
}

fn default_namespace() -> String {
    "kundli".to_string()
}

fn default_database() -> String {
    "astrology_app".to_string()
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespace: default_namespace(),
            database: default_database(),
            username: None,
            password: None,
            connect_timeout_ms: None,
            query_timeout_ms: None,
        }
    }

    /// Remote connections must use TLS; `mem://` runs in-process.
    pub fn validate(&self) -> Result<()> {
        let scheme = self
            .url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| Error::Config(format!("remote url has no scheme: {}", self.url)))?;

        match scheme.as_str() {
            "wss" | "https" | "mem" => {}
            "ws" | "http" => {
                return Err(Error::Config(format!(
                    "remote url must use TLS (wss:// or https://), got {}://",
                    scheme
                )));
            }
            other => return Err(Error::Config(format!("unsupported remote scheme: {}://", other))),
        }

        if self.username.is_some() != self.password.is_some() {
            return Err(Error::Config(
                "remote username and password must be set together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.unwrap_or(DEFAULT_QUERY_TIMEOUT_MS))
    }
}

impl KundliConfig {
    /// Overlay the secrets from the environment, when set and non-empty.
    pub fn apply_env(&mut self) {
        self.apply_secrets(
            std::env::var(REMOTE_URL_ENV).ok(),
            std::env::var(LLM_API_KEY_ENV).ok(),
        );
    }

    fn apply_secrets(&mut self, remote_url: Option<String>, llm_api_key: Option<String>) {
        if let Some(url) = remote_url.filter(|u| !u.trim().is_empty()) {
            match self.remote.as_mut() {
                Some(remote) => remote.url = url,
                None => self.remote = Some(RemoteConfig::new(url)),
            }
        }
        if let Some(key) = llm_api_key.filter(|k| !k.trim().is_empty()) {
            self.llm_api_key = Some(key);
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_database_path_in(Path::new(".")))
    }

    pub fn chat_enabled(&self) -> bool {
        self.llm_api_key.is_some()
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("kundli.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".kundli").join("kundli.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<KundliConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: KundliConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &KundliConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
