use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{Target, TargetOrder};
use crate::probe::RetryPolicy;
use crate::scheduler::SchedulerConfig;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Number of minute buckets kept in memory and shown.
    #[serde(default = "default_oldest_history")]
    pub oldest_history: usize,
    /// Where segments and index.htm live. Defaults to the config file's directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            oldest_history: default_oldest_history(),
            data_dir: None,
        }
    }
}

fn default_oldest_history() -> usize {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Cells at or above this latency are highlighted.
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: i32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: default_slow_threshold_ms(),
        }
    }
}

fn default_slow_threshold_ms() -> i32 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_check_url")]
    pub check_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
    #[serde(default = "default_round_interval_secs")]
    pub round_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum spacing between the starts of consecutive attempts.
    #[serde(default = "default_attempt_pacing_secs")]
    pub attempt_pacing_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            check_url: default_check_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            response_timeout_secs: default_response_timeout_secs(),
            round_interval_secs: default_round_interval_secs(),
            max_attempts: default_max_attempts(),
            attempt_pacing_secs: default_attempt_pacing_secs(),
        }
    }
}

fn default_check_url() -> String {
    "http://connectivitycheck.gstatic.com/generate_204".into()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_response_timeout_secs() -> u64 {
    10
}

fn default_round_interval_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_pacing_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    /// Proxy URL the probe is routed through.
    pub url: String,
}

impl AppConfig {
    /// Loads `CONFIG_FILE`, else `config.toml` beside the executable, else in the working directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("read {}: {}", path.display(), e))?;
        let mut config = Self::load_from_str(&s)?;
        if config.history.data_dir.is_none() {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            config.history.data_dir = Some(dir);
        }
        Ok(config)
    }

    /// Parse, normalize and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let mut config: AppConfig = toml::from_str(s)?;
        for (i, site) in config.sites.iter_mut().enumerate() {
            site.name = site.name.trim().to_string();
            site.url = expand_ss_locator(site.url.trim())
                .map_err(|e| anyhow::anyhow!("sites[{}].url: {}", i, e))?;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.history.oldest_history > 0,
            "history.oldest_history must be > 0, got {}",
            self.history.oldest_history
        );
        anyhow::ensure!(
            self.render.slow_threshold_ms > 0,
            "render.slow_threshold_ms must be > 0, got {}",
            self.render.slow_threshold_ms
        );
        anyhow::ensure!(
            !self.probe.check_url.trim().is_empty(),
            "probe.check_url must be non-empty"
        );
        anyhow::ensure!(
            self.probe.connect_timeout_secs > 0,
            "probe.connect_timeout_secs must be > 0, got {}",
            self.probe.connect_timeout_secs
        );
        anyhow::ensure!(
            self.probe.response_timeout_secs > 0,
            "probe.response_timeout_secs must be > 0, got {}",
            self.probe.response_timeout_secs
        );
        anyhow::ensure!(
            self.probe.round_interval_secs > 0,
            "probe.round_interval_secs must be > 0, got {}",
            self.probe.round_interval_secs
        );
        anyhow::ensure!(
            self.probe.max_attempts > 0,
            "probe.max_attempts must be > 0, got {}",
            self.probe.max_attempts
        );
        anyhow::ensure!(
            self.probe.attempt_pacing_secs > 0,
            "probe.attempt_pacing_secs must be > 0, got {}",
            self.probe.attempt_pacing_secs
        );
        anyhow::ensure!(!self.sites.is_empty(), "at least one [[sites]] entry is required");

        let mut seen = HashSet::with_capacity(self.sites.len());
        for (i, site) in self.sites.iter().enumerate() {
            anyhow::ensure!(!site.name.is_empty(), "sites[{}].name must be specified", i);
            anyhow::ensure!(
                !site.name.contains(',') && !site.name.contains('\n'),
                "sites[{}].name must not contain commas or newlines, got {:?}",
                i,
                site.name
            );
            anyhow::ensure!(
                seen.insert(site.name.as_str()),
                "sites[{}].name must be unique, {:?} is repeated",
                i,
                site.name
            );
            anyhow::ensure!(!site.url.is_empty(), "sites[{}].url must be specified", i);
        }
        Ok(())
    }

    pub fn targets(&self) -> Vec<Target> {
        self.sites
            .iter()
            .map(|s| Target {
                name: s.name.clone(),
                locator: s.url.clone(),
            })
            .collect()
    }

    pub fn target_order(&self) -> TargetOrder {
        TargetOrder::new(self.sites.iter().map(|s| s.name.clone()))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.history
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            round_interval: Duration::from_secs(self.probe.round_interval_secs),
            retry: RetryPolicy {
                max_attempts: self.probe.max_attempts,
                pacing: Duration::from_secs(self.probe.attempt_pacing_secs),
            },
        }
    }
}

/// Expands the all-base64 shadowsocks form `ss://<base64 of method:pass@host:port>`
/// into `ss://method:pass@host:port`. Any other locator is returned as is.
pub fn expand_ss_locator(url: &str) -> anyhow::Result<String> {
    let Some(encoded) = url.strip_prefix("ss://") else {
        return Ok(url.to_string());
    };
    if encoded.contains('@') {
        return Ok(url.to_string());
    }
    let bytes = STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')))
        .map_err(|e| anyhow::anyhow!("invalid base64 in ss locator: {}", e))?;
    let decoded = String::from_utf8(bytes)
        .map_err(|_| anyhow::anyhow!("ss locator does not decode to text"))?;
    anyhow::ensure!(
        decoded.contains('@'),
        "decoded ss locator has no method:password@host:port part"
    );
    // The decoded text carries the password; keep it out of the log.
    tracing::info!("expanded base64 ss locator");
    Ok(format!("ss://{}", decoded.trim()))
}

fn config_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("CONFIG_FILE") {
        return Ok(PathBuf::from(path));
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let beside_exe = dir.join(CONFIG_FILE_NAME);
        if beside_exe.is_file() {
            return Ok(beside_exe);
        }
    }
    Ok(std::env::current_dir()?.join(CONFIG_FILE_NAME))
}
