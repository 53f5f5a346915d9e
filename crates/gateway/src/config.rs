//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind (default: 0.0.0.0).
    pub host: String,

    /// HTTP server port (default: 5000).
    pub port: u16,

    /// Extra URL prefix for both API surfaces (default: empty).
    pub extension: String,

    /// Base URL of the ICAT server, e.g. `https://icat.example.com`.
    pub icat_url: String,

    /// Whether to verify the ICAT server certificate (default: true).
    pub icat_check_cert: bool,

    /// Authentication mechanism used for pool sessions (default: simple).
    pub mechanism: String,

    /// Username for pool sessions.
    pub username: String,

    /// Password for pool sessions.
    pub password: String,

    /// Sessions authenticated eagerly at startup (default: 2).
    pub client_pool_init_size: usize,

    /// Upper bound on concurrently borrowed sessions (default: 8).
    pub client_pool_max_size: usize,

    /// Entries kept in the login cache (default: 8).
    pub client_cache_size: u64,

    /// How long a borrow waits for a free session (default: 5s).
    pub pool_borrow_timeout: Duration,

    /// Wall-clock deadline per HTTP request (default: 30s).
    pub request_timeout: Duration,

    /// Timeout on individual catalogue calls (default: 10s).
    pub catalogue_timeout: Duration,

    /// Sessions below this many remaining minutes are refreshed on borrow
    /// (default: 5).
    pub session_refresh_threshold_mins: f64,

    /// Interval of the background session maintenance task (default: 300s).
    pub pool_maintenance_interval: Duration,

    /// Path to the Search API field mapping file
    /// (default: ./search_api_mapping.json).
    pub search_api_mapping_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let extension = env::var("EXTENSION").unwrap_or_default();

        let icat_url = env::var("ICAT_URL").context("ICAT_URL environment variable is required")?;

        let icat_check_cert = env::var("ICAT_CHECK_CERT")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .context("ICAT_CHECK_CERT must be true or false")?;

        let mechanism = env::var("ICAT_MECHANISM").unwrap_or_else(|_| "simple".to_string());

        let username =
            env::var("ICAT_USERNAME").context("ICAT_USERNAME environment variable is required")?;

        let password =
            env::var("ICAT_PASSWORD").context("ICAT_PASSWORD environment variable is required")?;

        let client_pool_init_size = env::var("CLIENT_POOL_INIT_SIZE")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .context("CLIENT_POOL_INIT_SIZE must be a valid usize")?;

        let client_pool_max_size = env::var("CLIENT_POOL_MAX_SIZE")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .context("CLIENT_POOL_MAX_SIZE must be a valid usize")?;

        anyhow::ensure!(
            client_pool_max_size >= 1,
            "CLIENT_POOL_MAX_SIZE must be at least 1"
        );
        anyhow::ensure!(
            client_pool_init_size <= client_pool_max_size,
            "CLIENT_POOL_INIT_SIZE must not exceed CLIENT_POOL_MAX_SIZE"
        );

        let client_cache_size = env::var("CLIENT_CACHE_SIZE")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .context("CLIENT_CACHE_SIZE must be a valid u64")?;

        let pool_borrow_timeout = parse_secs("POOL_BORROW_TIMEOUT_SECS", 5)?;
        let request_timeout = parse_secs("REQUEST_TIMEOUT_SECS", 30)?;
        let catalogue_timeout = parse_secs("CATALOGUE_TIMEOUT_SECS", 10)?;

        let session_refresh_threshold_mins = env::var("SESSION_REFRESH_THRESHOLD_MINS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .context("SESSION_REFRESH_THRESHOLD_MINS must be a number")?;

        let pool_maintenance_interval = parse_secs("POOL_MAINTENANCE_INTERVAL_SECS", 300)?;

        let search_api_mapping_path = env::var("SEARCH_API_MAPPING_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./search_api_mapping.json"));

        Ok(Self {
            host,
            port,
            extension,
            icat_url,
            icat_check_cert,
            mechanism,
            username,
            password,
            client_pool_init_size,
            client_pool_max_size,
            client_cache_size,
            pool_borrow_timeout,
            request_timeout,
            catalogue_timeout,
            session_refresh_threshold_mins,
            pool_maintenance_interval,
            search_api_mapping_path,
        })
    }
}

fn parse_secs(key: &'static str, default: u64) -> Result<Duration> {
    let secs = env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("{key} must be a number of seconds"))?;
    Ok(Duration::from_secs(secs))
}
