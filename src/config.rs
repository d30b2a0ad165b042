// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "FEED_TRANSLATOR_CONFIG";
pub const ENV_DATA_ROOT: &str = "FEED_TRANSLATOR_DATA_ROOT";
pub const ENV_BIND: &str = "FEED_TRANSLATOR_BIND";
pub const DEFAULT_CONFIG_PATH: &str = "config/feed_translator.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_root: PathBuf,
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub fetch: FetchConfig,
    pub translators: TranslatorsConfig,
    pub sources: Vec<SourceEntry>,
    pub derived: Vec<DerivedEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            server: ServerConfig::default(),
            queue: QueueConfig::default(),
            fetch: FetchConfig::default(),
            translators: TranslatorsConfig::default(),
            sources: Vec::new(),
            derived: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub workers: usize,
    /// Total attempts per run, first one included.
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub cascade_delay_secs: u64,
    pub results_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            retry_delay_secs: 0,
            cascade_delay_secs: 1,
            results_capacity: 256,
        }
    }
}

impl QueueConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn cascade_delay(&self) -> Duration {
        Duration::from_secs(self.cascade_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("feed-translator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TranslatorsConfig {
    pub openai: Option<OpenAiConfig>,
    pub deepl: Option<DeepLConfig>,
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_deepl_endpoint() -> String {
    "https://api-free.deepl.com".to_string()
}
fn default_engine_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    /// "ENV" means: read from OPENAI_API_KEY
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepLConfig {
    /// "ENV" means: read from DEEPL_API_KEY
    pub api_key: String,
    #[serde(default = "default_deepl_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

fn default_update_frequency() -> u32 {
    30
}
fn default_engine() -> String {
    "copy".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SourceEntry {
    pub sid: String,
    pub url: String,
    /// Minutes.
    #[serde(default = "default_update_frequency")]
    pub update_frequency: u32,
    #[serde(default = "default_engine")]
    pub translator: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DerivedEntry {
    pub sid: String,
    /// `sid` of a configured source.
    pub source: String,
    pub language: String,
    #[serde(default = "default_true")]
    pub translate_title: bool,
    #[serde(default)]
    pub translate_content: bool,
}

impl AppConfig {
    /// Parse TOML, resolve "ENV" secrets and validate. No env overrides.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing config toml")?;
        cfg.resolve_secrets()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load config using env var + fallbacks:
    /// 1) $FEED_TRANSLATOR_CONFIG
    /// 2) config/feed_translator.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from(&fallback);
        }
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_root.join("feeds.json")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var(ENV_DATA_ROOT) {
            if !root.trim().is_empty() {
                self.data_root = PathBuf::from(root);
            }
        }
        if let Ok(bind) = std::env::var(ENV_BIND) {
            if !bind.trim().is_empty() {
                self.server.bind = bind;
            }
        }
    }

    fn resolve_secrets(&mut self) -> Result<()> {
        if let Some(openai) = self.translators.openai.as_mut() {
            openai.api_key = resolve_key(&openai.api_key, "OPENAI_API_KEY")?;
        }
        if let Some(deepl) = self.translators.deepl.as_mut() {
            deepl.api_key = resolve_key(&deepl.api_key, "DEEPL_API_KEY")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue.workers == 0 {
            bail!("queue.workers must be at least 1");
        }
        if self.queue.max_attempts == 0 {
            bail!("queue.max_attempts must be at least 1");
        }

        // Raw and derived documents share one directory, so ids must be unique across both.
        let mut seen = HashSet::new();
        for s in &self.sources {
            check_sid(&s.sid)?;
            if !seen.insert(s.sid.as_str()) {
                bail!("duplicate feed sid: {}", s.sid);
            }
            if s.update_frequency == 0 {
                bail!("source {}: update_frequency must be at least 1 minute", s.sid);
            }
            if s.url.trim().is_empty() {
                bail!("source {}: url is empty", s.sid);
            }
        }
        let source_ids: HashSet<&str> = self.sources.iter().map(|s| s.sid.as_str()).collect();
        for d in &self.derived {
            check_sid(&d.sid)?;
            if !seen.insert(d.sid.as_str()) {
                bail!("duplicate feed sid: {}", d.sid);
            }
            if !source_ids.contains(d.source.as_str()) {
                bail!("derived feed {} references unknown source {}", d.sid, d.source);
            }
            if d.language.trim().is_empty() {
                bail!("derived feed {}: language is empty", d.sid);
            }
        }
        Ok(())
    }
}

fn resolve_key(raw: &str, env_name: &str) -> Result<String> {
    if raw.trim().eq_ignore_ascii_case("env") {
        return std::env::var(env_name).map_err(|_| anyhow!("Missing {env_name} env var"));
    }
    Ok(raw.to_string())
}

fn check_sid(sid: &str) -> Result<()> {
    let ok = !sid.is_empty()
        && sid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !sid.starts_with('.');
    if !ok {
        bail!("invalid feed sid {sid:?}: use [A-Za-z0-9_.-] and do not start with '.'");
    }
    Ok(())
}
