// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const ENV_CONFIG_PATH: &str = "AGGREGATOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/aggregator.toml";

/// One upstream RSS feed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

/// Runtime configuration: TOML file first, then environment overrides.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub processing_interval_secs: u64,
    /// Per-source fetch cap.
    pub batch_size: usize,
    pub cache_retention_secs: u64,
    pub sweep_interval_secs: u64,
    pub source_timeout_secs: u64,
    pub dispatch_concurrency: usize,
    pub shutdown_grace_secs: u64,
    pub bind_addr: String,
    pub feeds: Vec<FeedConfig>,
    pub rules_path: Option<PathBuf>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub telegram_bot_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            processing_interval_secs: 30,
            batch_size: 10,
            cache_retention_secs: 24 * 3600,
            sweep_interval_secs: 3600,
            source_timeout_secs: 20,
            dispatch_concurrency: 8,
            shutdown_grace_secs: 5,
            bind_addr: "0.0.0.0:8080".to_string(),
            feeds: Vec::new(),
            rules_path: None,
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            telegram_bot_token: None,
        }
    }
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $AGGREGATOR_CONFIG_PATH
    /// 2) config/aggregator.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        Ok(base.with_env_overrides(|k| std::env::var(k).ok()))
    }

    /// Apply overrides from `get`. Unparseable values keep the previous value.
    pub fn with_env_overrides<F>(mut self, get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn num<T: std::str::FromStr>(raw: Option<String>, cur: T) -> T {
            raw.and_then(|s| s.trim().parse().ok()).unwrap_or(cur)
        }
        fn text(raw: Option<String>) -> Option<String> {
            raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }

        self.processing_interval_secs =
            num(get("PROCESSING_INTERVAL_SECS"), self.processing_interval_secs);
        self.batch_size = num(get("BATCH_SIZE"), self.batch_size);
        self.cache_retention_secs = num(get("CACHE_RETENTION_SECS"), self.cache_retention_secs);
        self.sweep_interval_secs = num(get("SWEEP_INTERVAL_SECS"), self.sweep_interval_secs);
        self.source_timeout_secs = num(get("SOURCE_TIMEOUT_SECS"), self.source_timeout_secs);
        self.dispatch_concurrency = num(get("DISPATCH_CONCURRENCY"), self.dispatch_concurrency);
        self.shutdown_grace_secs = num(get("SHUTDOWN_GRACE_SECS"), self.shutdown_grace_secs);

        if let Some(v) = text(get("BIND_ADDR")) {
            self.bind_addr = v;
        }
        if let Some(v) = text(get("RULES_PATH")) {
            self.rules_path = Some(PathBuf::from(v));
        }
        if let Some(v) = text(get("OPENAI_API_KEY")) {
            self.openai_api_key = Some(v);
        }
        if let Some(v) = text(get("OPENAI_MODEL")) {
            self.openai_model = v;
        }
        if let Some(v) = text(get("TELEGRAM_BOT_TOKEN")) {
            self.telegram_bot_token = Some(v);
        }
        // FEEDS="name=url,name2=url2"
        if let Some(v) = text(get("FEEDS")) {
            self.feeds = parse_feed_list(&v);
        }
        self
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::from_secs(self.processing_interval_secs.max(1))
    }

    pub fn cache_retention(&self) -> Duration {
        Duration::from_secs(self.cache_retention_secs.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_feed_list(s: &str) -> Vec<FeedConfig> {
    s.split(',')
        .filter_map(|pair| {
            let (name, url) = pair.split_once('=')?;
            let (name, url) = (name.trim(), url.trim());
            (!name.is_empty() && !url.is_empty()).then(|| FeedConfig {
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn toml_fills_missing_keys_with_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
batch_size = 25
[[feeds]]
name = "wire"
url = "https://wire.test/rss"
"#,
        )
        .unwrap();
        assert_eq!(cfg.batch_size, 25);
        assert_eq!(cfg.processing_interval_secs, 30);
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.cache_retention(), Duration::from_secs(86_400));
    }

    #[test]
    fn env_overrides_apply_and_bad_values_fall_back() {
        let env: HashMap<&str, &str> = [
            ("PROCESSING_INTERVAL_SECS", "0"),
            ("BATCH_SIZE", "not-a-number"),
            ("OPENAI_API_KEY", "  sk-test  "),
            ("TELEGRAM_BOT_TOKEN", ""),
            ("FEEDS", "a=https://a.test/rss, bad ,b=https://b.test/rss"),
        ]
        .into_iter()
        .collect();
        let cfg = AppConfig::default().with_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.processing_interval_secs, 0);
        assert_eq!(cfg.processing_interval(), Duration::from_secs(1));
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.telegram_bot_token, None);
        assert_eq!(cfg.feeds.len(), 2);
        assert_eq!(cfg.feeds[1].name, "b");
    }
}
