/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

use crate::account::Credential;
use crate::iri;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Canonical scheme and host of the federation service API.
    #[serde(alias = "api_url")]
    pub base_url: String,
    /// Public host of this instance. Falls back to the host of `base_url`.
    pub host_name: Option<String>,
    /// The federation service actor (`<base>/` by default).
    pub service_iri: Option<String>,
    /// The local application actor every activity is copied to.
    pub app_iri: Option<String>,
    pub app_credential: Option<Credential>,
    /// IRIs of the `#mod` and `#sysop` tag objects.
    pub moderation_tags: ModerationTags,

    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,

    pub max_items: u32,
    pub early_stop_threshold: u32,
    pub max_thread_depth: usize,

    pub voting_enabled: bool,
    pub downvoting_enabled: bool,
    pub public_voting: bool,

    pub http_attempts: u32,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModerationTags {
    #[serde(alias = "mod")]
    pub moderator: Option<String>,
    #[serde(alias = "sysop")]
    pub operator: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            host_name: None,
            service_iri: None,
            app_iri: None,
            app_credential: None,
            moderation_tags: ModerationTags::default(),
            cache_enabled: true,
            cache_ttl_secs: 600,
            max_items: 50,
            early_stop_threshold: 5,
            max_thread_depth: 32,
            voting_enabled: true,
            downvoting_enabled: true,
            public_voting: false,
            http_attempts: 3,
            http_timeout_secs: 20,
        }
    }
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: SyncConfig = serde_json::from_str(raw).context("parse sync config json")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Reads `LINKFED_*` variables. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut cfg = SyncConfig::default();
        cfg.base_url = env::var("LINKFED_BASE_URL").context("LINKFED_BASE_URL not set")?;
        cfg.host_name = env_opt("LINKFED_HOST_NAME");
        cfg.service_iri = env_opt("LINKFED_SERVICE_IRI");
        cfg.app_iri = env_opt("LINKFED_APP_IRI");
        if let Some(token) = env_opt("LINKFED_APP_TOKEN") {
            cfg.app_credential = Some(Credential::Bearer(token));
        }
        cfg.moderation_tags.moderator = env_opt("LINKFED_MOD_TAG");
        cfg.moderation_tags.operator = env_opt("LINKFED_SYSOP_TAG");
        if let Some(v) = env_parse("LINKFED_CACHE_ENABLED")? {
            cfg.cache_enabled = v;
        }
        if let Some(v) = env_parse("LINKFED_CACHE_TTL_SECS")? {
            cfg.cache_ttl_secs = v;
        }
        if let Some(v) = env_parse("LINKFED_MAX_ITEMS")? {
            cfg.max_items = v;
        }
        if let Some(v) = env_parse("LINKFED_EARLY_STOP_THRESHOLD")? {
            cfg.early_stop_threshold = v;
        }
        if let Some(v) = env_parse("LINKFED_DOWNVOTING")? {
            cfg.downvoting_enabled = v;
        }
        if let Some(v) = env_parse("LINKFED_HTTP_ATTEMPTS")? {
            cfg.http_attempts = v;
        }
        if let Some(v) = env_parse("LINKFED_HTTP_TIMEOUT_SECS")? {
            cfg.http_timeout_secs = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(anyhow!("base_url is empty"));
        }
        let url = Url::parse(base).with_context(|| format!("invalid base_url: {base}"))?;
        if url.host_str().is_none() {
            return Err(anyhow!("base_url has no host: {base}"));
        }
        if self.max_items == 0 {
            return Err(anyhow!("max_items must be positive"));
        }
        Ok(())
    }

    /// `base_url` without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    pub fn host(&self) -> String {
        self.host_name
            .clone()
            .filter(|h| !h.trim().is_empty())
            .or_else(|| iri::host_of(self.base()))
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    pub fn service(&self) -> String {
        self.service_iri
            .clone()
            .unwrap_or_else(|| format!("{}/", self.base()))
    }

    pub fn app(&self) -> Option<&str> {
        self.app_iri.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn is_local_iri(&self, iri: &str) -> bool {
        iri::host_of(iri)
            .map(|h| h == self.host() || Some(h) == iri::host_of(self.base()))
            .unwrap_or(false)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("invalid {name}={v}: {e}")),
    }
}

/// Installs the fmt subscriber with an `info` default. Safe to call twice.
pub fn init_tracing() {
    let filter = match "info".parse() {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(_) => tracing_subscriber::EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt().with_env_filter(filter).try_init().ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_and_aliases() {
        let cfg = SyncConfig::from_json(
            r#"{"api_url": "https://fed.example/", "moderation_tags": {"mod": "https://fed.example/t/mod"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.base(), "https://fed.example");
        assert_eq!(cfg.host(), "fed.example");
        assert_eq!(cfg.service(), "https://fed.example/");
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(600));
        assert_eq!(cfg.max_items, 50);
        assert_eq!(cfg.early_stop_threshold, 5);
        assert_eq!(
            cfg.moderation_tags.moderator.as_deref(),
            Some("https://fed.example/t/mod")
        );
    }

    #[test]
    fn rejects_missing_base() {
        assert!(SyncConfig::from_json("{}").is_err());
        assert!(SyncConfig::from_json(r#"{"base_url": "not a url"}"#).is_err());
    }

    #[test]
    fn bearer_credential_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"base_url": "https://fed.example", "app_iri": "https://fed.example/actors/app",
                "app_credential": {{"bearer": "s3cret"}}, "cache_enabled": false}}"#
        )
        .unwrap();
        let cfg = SyncConfig::from_file(f.path()).unwrap();
        assert!(!cfg.cache_enabled);
        assert_eq!(cfg.app(), Some("https://fed.example/actors/app"));
        assert!(matches!(cfg.app_credential, Some(Credential::Bearer(ref t)) if t == "s3cret"));
    }

    #[test]
    fn local_iris() {
        let mut cfg = SyncConfig::new("https://api.fed.example");
        cfg.host_name = Some("Fed.Example".to_string());
        assert!(cfg.is_local_iri("https://fed.example/actors/a"));
        assert!(cfg.is_local_iri("https://api.fed.example/actors/a"));
        assert!(!cfg.is_local_iri("https://other.example/actors/a"));
    }
}
