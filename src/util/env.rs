//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in the binary (or rely on lazy Once).
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

pub const DEFAULT_API_BASE: &str = "https://custard-calendar.chris-kaschner.workers.dev";
pub const DEFAULT_DATA_DIR: &str = "data/backfill";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Common bootstrap for the CLI: initialize dotenv and log the resolved
/// remote/data locations so every run records where it read and wrote.
pub fn bootstrap_cli(bin_name: &str, api_base: &str, data_dir: &std::path::Path) {
    init_env();
    info!(
        target = "bootstrap",
        bin = bin_name,
        api_base,
        data_dir = %data_dir.display(),
        "resolved configuration"
    );
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Remote API base URL: explicit flag, then CUSTARD_API_BASE, then the public worker.
pub fn api_base(flag: Option<&str>) -> String {
    flag.map(str::to_string)
        .or_else(|| env_opt("CUSTARD_API_BASE"))
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Data directory: explicit flag, then CUSTARD_DATA_DIR, then `data/backfill`.
pub fn data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env_opt("CUSTARD_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Per-request timeout in seconds: explicit flag, then CUSTARD_HTTP_TIMEOUT_SECS.
pub fn timeout_secs(flag: Option<u64>) -> u64 {
    flag.unwrap_or_else(|| env_parse("CUSTARD_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS))
}
