use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::env;

/// Largest aggregation window, one year.
pub const MAX_STATS_WINDOW_HOURS: i64 = 8760;

const DEFAULT_SKIP_PATHS: &str =
    "/css/,/js/,/images/,/favicon.ico,/health,/actuator/health,/swagger-ui,/api-docs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: Option<String>,
    pub store_backend: StoreBackend,
    pub bind_addr: String,
    pub audit_enabled: bool,
    pub audit_skip_paths: Vec<String>,
    pub audit_value_max_chars: usize,
    pub audit_stats_window_hours: i64,
    pub audit_default_page_size: i64,
    pub trust_identity_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            store_backend: StoreBackend::Memory,
            bind_addr: "0.0.0.0:3000".to_string(),
            audit_enabled: true,
            audit_skip_paths: parse_list(DEFAULT_SKIP_PATHS),
            audit_value_max_chars: 5000,
            audit_stats_window_hours: 24,
            audit_default_page_size: 20,
            trust_identity_headers: false,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let store_backend = match env::var("AUDIT_STORE") {
            Ok(value) => parse_store_backend(&value)?,
            Err(_) if database_url.is_some() => StoreBackend::Postgres,
            Err(_) => StoreBackend::Memory,
        };
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(anyhow!("AUDIT_STORE=postgres requires DATABASE_URL"));
        }

        let bind_addr = env::var("BIND_ADDR").unwrap_or(defaults.bind_addr);

        let audit_enabled = env::var("AUDIT_ENABLED")
            .ok()
            .and_then(|value| parse_bool(&value))
            .unwrap_or(defaults.audit_enabled);

        let audit_skip_paths = env::var("AUDIT_SKIP_PATHS")
            .map(|value| parse_list(&value))
            .unwrap_or(defaults.audit_skip_paths);

        let audit_value_max_chars = env::var("AUDIT_VALUE_MAX_CHARS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .unwrap_or(defaults.audit_value_max_chars);

        let audit_stats_window_hours = parse_stats_window(
            env::var("AUDIT_STATS_WINDOW_HOURS").ok().as_deref(),
            defaults.audit_stats_window_hours,
        );

        let audit_default_page_size = env::var("AUDIT_DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(defaults.audit_default_page_size);

        let trust_identity_headers = env::var("TRUST_IDENTITY_HEADERS")
            .ok()
            .and_then(|value| parse_bool(&value))
            .unwrap_or(defaults.trust_identity_headers);

        Ok(Config {
            database_url,
            store_backend,
            bind_addr,
            audit_enabled,
            audit_skip_paths,
            audit_value_max_chars,
            audit_stats_window_hours,
            audit_default_page_size,
            trust_identity_headers,
        })
    }

    /// Whether the request boundary should skip `path` entirely.
    pub fn is_audit_skipped(&self, path: &str) -> bool {
        self.audit_skip_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Hides credentials in a database URL before it is logged.
pub fn mask_database_url(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((_, host)) => format!("***@{}", host),
        None => "<set>".into(),
    }
}

fn parse_store_backend(value: &str) -> anyhow::Result<StoreBackend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
        "memory" | "in-memory" => Ok(StoreBackend::Memory),
        other => Err(anyhow!("Invalid AUDIT_STORE value: {}", other)),
    }
}

/// Unparseable values fall back to `default`; the rest are clamped to
/// `1..=MAX_STATS_WINDOW_HOURS`.
fn parse_stats_window(value: Option<&str>, default: i64) -> i64 {
    value
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|hours| hours.clamp(1, MAX_STATS_WINDOW_HOURS))
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
