//! Configuration loading.
//!
//! Settings come from a TOML file and are then overridden by environment
//! variables, once, at startup. The resulting [`Config`] is passed down
//! explicitly; nothing reads the environment after [`load_config`].
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `TCONN_DB_PATH` | `db.path` |
//! | `TCONN_BIND` | `server.bind` |
//! | `TCONN_ADMIN_TOKEN` | `server.admin_token` |
//! | `EMBEDDING_PROVIDER` | `embedding.provider` |
//! | `EMBEDDING_MODEL` | `embedding.model` |
//! | `EMBEDDING_TIMEOUT_SECS` | `embedding.timeout_secs` |
//! | `EMBEDDING_LOCAL_URL` | `embedding.local.base_url` |
//! | `EMBEDDING_CLOUD_ACCOUNT_ID` | `embedding.cloud.account_id` |
//! | `EMBEDDING_CLOUD_API_TOKEN` | `embedding.cloud.api_token` |
//! | `TRANSCRIPTION_URL` | `transcription.url` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use testimony_connections_core::rules::DiscoveryOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token for admin routes. Unset means admin routes are open.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            admin_token: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Which embedding backend to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Disabled,
    Local,
    Cloud,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Disabled => "disabled",
            ProviderKind::Local => "local",
            ProviderKind::Cloud => "cloud",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "disabled" | "" => Ok(ProviderKind::Disabled),
            "local" => Ok(ProviderKind::Local),
            "cloud" => Ok(ProviderKind::Cloud),
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, local, or cloud.",
                other
            ),
        }
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub local: LocalProviderConfig,
    #[serde(default)]
    pub cloud: CloudProviderConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Disabled,
            model: None,
            timeout_secs: default_timeout_secs(),
            local: LocalProviderConfig::default(),
            cloud: CloudProviderConfig::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != ProviderKind::Disabled
    }
}

fn default_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LocalProviderConfig {
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CloudProviderConfig {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_cloud_base_url")]
    pub base_url: String,
}

impl Default for CloudProviderConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            api_token: None,
            base_url: default_cloud_base_url(),
        }
    }
}

fn default_cloud_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f64,
    #[serde(default = "default_nearby_window_days")]
    pub nearby_window_days: i64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            semantic_threshold: default_semantic_threshold(),
            nearby_window_days: default_nearby_window_days(),
        }
    }
}

impl DiscoveryConfig {
    pub fn options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            semantic_threshold: self.semantic_threshold,
            nearby_window_days: self.nearby_window_days,
        }
    }
}

fn default_semantic_threshold() -> f64 {
    0.70
}
fn default_nearby_window_days() -> i64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_transcription_timeout_secs")]
    pub timeout_secs: u64,
    /// Language hint passed to the service (e.g. `"rw"`); auto-detect when unset.
    #[serde(default)]
    pub language: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_transcription_timeout_secs(),
            language: None,
        }
    }
}

impl TranscriptionConfig {
    pub fn is_enabled(&self) -> bool {
        self.url.as_deref().map(|u| !u.trim().is_empty()).unwrap_or(false)
    }
}

fn default_transcription_timeout_secs() -> u64 {
    600
}

/// Read, override from the process environment, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply environment overrides using `lookup` (the process env in production).
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("TCONN_DB_PATH") {
        config.db.path = PathBuf::from(v);
    }
    if let Some(v) = get("TCONN_BIND") {
        config.server.bind = v;
    }
    if let Some(v) = get("TCONN_ADMIN_TOKEN") {
        config.server.admin_token = Some(v);
    }
    if let Some(v) = get("EMBEDDING_PROVIDER") {
        config.embedding.provider = v.parse()?;
    }
    if let Some(v) = get("EMBEDDING_MODEL") {
        config.embedding.model = Some(v);
    }
    if let Some(v) = get("EMBEDDING_TIMEOUT_SECS") {
        config.embedding.timeout_secs = v
            .trim()
            .parse()
            .with_context(|| format!("EMBEDDING_TIMEOUT_SECS is not a number: '{}'", v))?;
    }
    if let Some(v) = get("EMBEDDING_LOCAL_URL") {
        config.embedding.local.base_url = Some(v);
    }
    if let Some(v) = get("EMBEDDING_CLOUD_ACCOUNT_ID") {
        config.embedding.cloud.account_id = Some(v);
    }
    if let Some(v) = get("EMBEDDING_CLOUD_API_TOKEN") {
        config.embedding.cloud.api_token = Some(v);
    }
    if let Some(v) = get("TRANSCRIPTION_URL") {
        config.transcription.url = Some(v);
    }
    Ok(())
}

/// Structural checks. Provider credentials are checked when the embedding
/// client is built, so a missing token fails there with a typed error.
pub fn validate(config: &Config) -> Result<()> {
    if config.embedding.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    if !(0.0..=1.0).contains(&config.discovery.semantic_threshold) {
        bail!("discovery.semantic_threshold must be in [0.0, 1.0]");
    }
    if config.discovery.nearby_window_days < 1 {
        bail!("discovery.nearby_window_days must be >= 1");
    }
    Ok(())
}
