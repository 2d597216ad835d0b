use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use dotenvy::dotenv;
use std::env;
use url::Url;

/// Service configuration loaded from environment variables.
///
/// Documented keys:
/// - `MIRROR_BASE_URLS` (required): comma-separated sites to crawl for a
///   full mirror. Sites may not be fully cross-linked, so several bases
///   can be given to catch everything.
/// - `MIRROR_STORAGE_ROOT` (required): directory that owns `mirrors/`.
/// - `MIRROR_DATABASE_URL`: sqlite URL for the catalog.
/// - `MIRROR_RESOURCE_DOMAINS`: comma-separated extra domains (CDNs)
///   allowed during the crawl.
/// - `MIRROR_COOKIES`: `k=v;k2=v2` cookie header sent on every request.
/// - `MIRROR_USER_AGENT`, `MIRROR_WGET_BIN`
/// - `MIRROR_DEBOUNCE_SECS`, `MIRROR_STALE_AFTER_MINS`,
///   `MIRROR_RETENTION_MONTHS`, `MIRROR_SWEEP_BATCH_LIMIT`
/// - `MIRROR_NO_CHECK_CERT`: skip certificate checks (local dev).
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub base_urls: Vec<Url>,
    pub storage_root: PathBuf,
    pub database_url: String,
    pub user_agent: String,
    pub resource_domains: Vec<String>,
    pub cookie_header: String,
    pub reject_patterns: Vec<String>,
    pub wget_binary: String,
    pub debounce: Duration,
    pub stale_after: Duration,
    pub retention_months: u32,
    pub sweep_batch_limit: usize,
    pub no_check_certificate: bool,
}

impl MirrorConfig {
    /// Configuration with stock defaults for everything but the two
    /// required settings.
    pub fn new(base_urls: Vec<Url>, storage_root: impl Into<PathBuf>) -> Self {
        let user_agent = match base_urls.first() {
            Some(url) => format!("StaticMirror; {url}"),
            None => "StaticMirror".to_string(),
        };
        Self {
            base_urls,
            storage_root: storage_root.into(),
            database_url: "sqlite:mirror.db?mode=rwc".to_string(),
            user_agent,
            resource_domains: Vec::new(),
            cookie_header: "static_mirror=1".to_string(),
            reject_patterns: vec![r".+\/feed\/?$".to_string(), r".+\/wp-json\/?(.+)?$".to_string()],
            wget_binary: "wget".to_string(),
            debounce: Duration::seconds(60),
            stale_after: Duration::minutes(60),
            retention_months: 61,
            sweep_batch_limit: 100,
            no_check_certificate: false,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let base_urls = env::var("MIRROR_BASE_URLS")
            .context("MIRROR_BASE_URLS must be set")?
            .split(',')
            .map(|s| Url::parse(s.trim()).with_context(|| format!("invalid base URL: {s}")))
            .collect::<Result<Vec<_>>>()?;

        let storage_root =
            PathBuf::from(env::var("MIRROR_STORAGE_ROOT").context("MIRROR_STORAGE_ROOT must be set")?);

        let mut config = Self::new(base_urls, storage_root);

        if let Ok(url) = env::var("MIRROR_DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(agent) = env::var("MIRROR_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Ok(domains) = env::var("MIRROR_RESOURCE_DOMAINS") {
            config.resource_domains = domains
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(cookies) = env::var("MIRROR_COOKIES") {
            config.cookie_header = cookies;
        }
        if let Ok(bin) = env::var("MIRROR_WGET_BIN") {
            config.wget_binary = bin;
        }
        if let Ok(secs) = env::var("MIRROR_DEBOUNCE_SECS") {
            config.debounce =
                Duration::seconds(secs.parse().context("MIRROR_DEBOUNCE_SECS must be a number")?);
        }
        if let Ok(mins) = env::var("MIRROR_STALE_AFTER_MINS") {
            config.stale_after =
                Duration::minutes(mins.parse().context("MIRROR_STALE_AFTER_MINS must be a number")?);
        }
        if let Ok(months) = env::var("MIRROR_RETENTION_MONTHS") {
            config.retention_months = months
                .parse()
                .context("MIRROR_RETENTION_MONTHS must be a number")?;
        }
        if let Ok(limit) = env::var("MIRROR_SWEEP_BATCH_LIMIT") {
            config.sweep_batch_limit = limit
                .parse()
                .context("MIRROR_SWEEP_BATCH_LIMIT must be a number")?;
        }
        config.no_check_certificate = env::var("MIRROR_NO_CHECK_CERT")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(config)
    }

    /// Directory the mirrors are stored under.
    pub fn mirrors_dir(&self) -> PathBuf {
        self.storage_root.join("mirrors")
    }
}
