use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow, bail};
use reqwest::{Proxy, Url};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::errors::GenerationError;

pub const DEFAULT_QUEUE_BASE: &str = "https://queue.fal.run";
pub const DEFAULT_STORAGE_BASE: &str = "https://rest.alpha.fal.ai";
pub const DEFAULT_OUTPUT_ROOT: &str = "outputs";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FalConfig {
    pub api_key: Option<String>,
    pub queue_base: Option<String>,
    pub storage_base: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub use_proxy: bool,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn get_proxy_url(&self) -> Option<Url> {
        let (Some(protocol), Some(host)) = (&self.protocol, &self.host) else {
            return None;
        };
        let mut url = Url::parse(&format!("{protocol}://{host}")).ok()?;
        if let Some(port) = self.port {
            url.set_port(Some(port)).ok()?;
        }
        if let Some(username) = &self.username {
            url.set_username(username).ok()?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password)).ok()?;
        }
        Some(url)
    }

    pub fn get_proxy(&self) -> Option<Proxy> {
        if !self.use_proxy {
            return None;
        }
        self.get_proxy_url().and_then(|url| Proxy::all(url).ok())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    pub poll_interval_ms: Option<u64>,
}

/// Persisted settings in `~/.config/falgen/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub fal: FalConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

fn config_dir() -> anyhow::Result<PathBuf> {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".config").join("falgen"))
        .ok_or(anyhow!("Failed to get config directory."))
}

pub fn config_file_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

impl Configuration {
    pub async fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_file_path()?).await
    }

    pub async fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        self.save_to(&config_file_path()?).await
    }

    pub async fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string(self).context("Failed to serialize configuration")?;
        fs::write(path, content).await?;
        Ok(())
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.fal.api_key = Some(api_key);
    }

    pub fn clear_api_key(&mut self) {
        self.fal.api_key = None;
    }

    pub fn set_proxy(&mut self, url: &Url, username: Option<String>, password: Option<String>) {
        self.proxy.protocol = Some(url.scheme().to_string());
        self.proxy.host = url.host_str().map(ToString::to_string);
        self.proxy.port = url.port();
        self.proxy.username = username;
        self.proxy.password = password;
    }

    pub fn clear_proxy(&mut self) {
        self.proxy = ProxyConfig::default();
    }

    pub fn set_use_proxy(&mut self, use_proxy: bool) {
        self.proxy.use_proxy = use_proxy;
    }

    pub fn set_output_root(&mut self, root: PathBuf) {
        self.output.root = Some(root);
    }

    pub fn clear_output_root(&mut self) {
        self.output.root = None;
    }

    pub fn set_poll_interval(&mut self, millis: u64) {
        self.queue.poll_interval_ms = Some(millis);
    }

    pub fn clear_poll_interval(&mut self) {
        self.queue.poll_interval_ms = None;
    }
}

/// Loads a `.env` file without overriding variables already in the process
/// environment. A missing file is not an error.
pub fn load_env_file(path: &Path) -> anyhow::Result<()> {
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no env file");
        return Ok(());
    }
    dotenvy::from_path(path)
        .with_context(|| format!("Failed to load env file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded env file");
    Ok(())
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub queue_base: Url,
    pub storage_base: Url,
    pub output_root: PathBuf,
    pub poll_interval: Duration,
    pub proxy: ProxyConfig,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_base(name: &str, raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim_end_matches('/'))
        .with_context(|| format!("{name} is not a valid URL: {raw}"))?;
    if url.cannot_be_a_base() {
        bail!("{name} cannot be used as a base URL: {raw}");
    }
    Ok(url)
}

impl Settings {
    /// Resolves settings from the environment lookup and the config file.
    /// Environment values win over the file.
    pub fn resolve<F>(file: &Configuration, env: F) -> Result<Self, GenerationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = non_empty(env("FAL_KEY"))
            .or_else(|| non_empty(env("FAL_API_KEY")))
            .or_else(|| non_empty(file.fal.api_key.clone()))
            .ok_or_else(|| {
                GenerationError::Configuration(
                    "FAL_KEY is not set; export it or add it to the project .env file".to_string(),
                )
            })?;

        let queue_base = non_empty(env("FAL_QUEUE_BASE"))
            .or_else(|| non_empty(file.fal.queue_base.clone()))
            .unwrap_or_else(|| DEFAULT_QUEUE_BASE.to_string());
        let storage_base = non_empty(env("FAL_STORAGE_BASE"))
            .or_else(|| non_empty(file.fal.storage_base.clone()))
            .unwrap_or_else(|| DEFAULT_STORAGE_BASE.to_string());
        let output_root = non_empty(env("FALGEN_OUTPUT_DIR"))
            .map(PathBuf::from)
            .or_else(|| file.output.root.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT));
        let poll_interval = Duration::from_millis(
            file.queue
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
                .max(100),
        );

        let configuration_error =
            |e: anyhow::Error| GenerationError::Configuration(format!("{e:#}"));
        Ok(Self {
            api_key,
            queue_base: parse_base("FAL_QUEUE_BASE", &queue_base).map_err(configuration_error)?,
            storage_base: parse_base("FAL_STORAGE_BASE", &storage_base)
                .map_err(configuration_error)?,
            output_root,
            poll_interval,
            proxy: file.proxy.clone(),
        })
    }
}
