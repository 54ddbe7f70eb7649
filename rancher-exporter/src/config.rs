//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through the environment variable
//! Rancher sets for its agents (`CATTLE_URL`, ...). The resulting
//! [`ExporterConfig`] is validated once at startup and never changes.

use crate::client::Credentials;
use crate::exporter::ScrapeSettings;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use reqwest::Url;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9173";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Paths served by the exporter itself that the metrics path may not shadow.
const RESERVED_PATHS: &[&str] = &["/", "/health"];

#[derive(Parser, Debug)]
#[command(name = "rancher-exporter")]
#[command(
    author,
    version,
    about = "Prometheus exporter for Rancher service, stack and host state"
)]
pub struct Cli {
    /// Base URL of the Rancher API, e.g. http://rancher:8080/v2-beta
    #[arg(long, env = "CATTLE_URL")]
    pub cattle_url: Option<String>,

    /// API access key
    #[arg(long, env = "CATTLE_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// API secret key
    #[arg(long, env = "CATTLE_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Hide system services, stacks and hosts
    #[arg(
        long,
        env = "HIDE_SYS",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub hide_sys: bool,

    /// Address to expose metrics on
    #[arg(long, env = "LISTEN_ADDRESS", default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen_address: String,

    /// Path under which metrics are exposed
    #[arg(long, env = "METRICS_PATH", default_value = DEFAULT_METRICS_PATH)]
    pub metrics_path: String,

    /// Timeout for each Rancher API request, in seconds
    #[arg(long, env = "API_TIMEOUT_SECS", default_value = "10")]
    pub api_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no Rancher API URL configured (set CATTLE_URL or --cattle-url)")]
    MissingBaseUrl,

    #[error("invalid Rancher API URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid listen address {0:?}")]
    InvalidListenAddress(String),

    #[error("invalid metrics path {path:?}: {reason}")]
    InvalidMetricsPath { path: String, reason: &'static str },

    #[error("API timeout must be at least one second")]
    InvalidTimeout,
}

/// Validated exporter configuration.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub base_url: String,
    pub credentials: Option<Credentials>,
    pub hide_system: bool,
    pub listen_address: SocketAddr,
    pub metrics_path: String,
    pub api_timeout: Duration,
}

impl ExporterConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let base_url = validate_base_url(cli.cattle_url.as_deref())?;
        let listen_address = parse_listen_address(&cli.listen_address)?;
        let metrics_path = validate_metrics_path(&cli.metrics_path)?;

        if cli.api_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        let credentials = cli
            .access_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|access_key| Credentials {
                access_key: access_key.to_string(),
                secret_key: cli.secret_key.clone().unwrap_or_default(),
            });

        Ok(Self {
            base_url,
            credentials,
            hide_system: cli.hide_sys,
            listen_address,
            metrics_path,
            api_timeout: Duration::from_secs(cli.api_timeout_secs),
        })
    }

    pub fn scrape_settings(&self) -> ScrapeSettings {
        ScrapeSettings {
            base_url: self.base_url.clone(),
            hide_system: self.hide_system,
        }
    }
}

fn validate_base_url(raw: Option<&str>) -> Result<String, ConfigError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ConfigError::MissingBaseUrl);
    }

    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {:?}", url.scheme()),
        });
    }

    Ok(raw.to_string())
}

/// Parse a listen address. A bare `:port` binds every interface.
fn parse_listen_address(raw: &str) -> Result<SocketAddr, ConfigError> {
    let raw = raw.trim();
    let candidate = if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    };

    candidate
        .parse()
        .map_err(|_| ConfigError::InvalidListenAddress(raw.to_string()))
}

fn validate_metrics_path(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason| ConfigError::InvalidMetricsPath {
        path: raw.to_string(),
        reason,
    };

    if !raw.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if RESERVED_PATHS.contains(&raw) {
        return Err(invalid("path is already served by the exporter"));
    }
    if raw.contains(['{', '}', '*']) {
        return Err(invalid("path may not contain route parameters"));
    }

    Ok(raw.to_string())
}
