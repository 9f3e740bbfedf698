use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
const DEFAULT_FIRST_YEAR: i32 = 2024;
const DEFAULT_LAST_YEAR: i32 = 2030;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub remote_url: Option<String>,
    pub remote_api_key: Option<SecretString>,
    pub remote_table: String,
    pub save_debounce_ms: u64,
    pub database_file_name: String,
    pub local_storage_key: String,
    pub first_year: i32,
    pub last_year: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub remote_url: Option<String>,
    pub remote_table: String,
    pub has_remote_api_key: bool,
    pub save_debounce_ms: u64,
    pub database_file_name: String,
    pub local_storage_key: String,
    pub first_year: i32,
    pub last_year: i32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let first_year = parse_i32("DASHBOARD_FIRST_YEAR", DEFAULT_FIRST_YEAR);
        let last_year = parse_i32("DASHBOARD_LAST_YEAR", DEFAULT_LAST_YEAR).max(first_year);
        Self {
            remote_url: env::var("DASHBOARD_REMOTE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            remote_api_key: env::var("DASHBOARD_REMOTE_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            remote_table: env::var("DASHBOARD_REMOTE_TABLE")
                .unwrap_or_else(|_| "dashboards".to_string()),
            save_debounce_ms: parse_u64("DASHBOARD_SAVE_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS).max(1),
            database_file_name: env::var("DATABASE_FILE_NAME")
                .unwrap_or_else(|_| "dashboard-local.db".to_string()),
            local_storage_key: env::var("DASHBOARD_LOCAL_STORAGE_KEY")
                .unwrap_or_else(|_| "camerite_dashboard_data".to_string()),
            first_year,
            last_year,
        }
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.first_year..=self.last_year
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            remote_url: self.remote_url.clone(),
            remote_table: self.remote_table.clone(),
            has_remote_api_key: self.remote_api_key.is_some(),
            save_debounce_ms: self.save_debounce_ms,
            database_file_name: self.database_file_name.clone(),
            local_storage_key: self.local_storage_key.clone(),
            first_year: self.first_year,
            last_year: self.last_year,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_api_key: None,
            remote_table: "dashboards".into(),
            save_debounce_ms: DEFAULT_DEBOUNCE_MS,
            database_file_name: "dashboard-local.db".into(),
            local_storage_key: "camerite_dashboard_data".into(),
            first_year: DEFAULT_FIRST_YEAR,
            last_year: DEFAULT_LAST_YEAR,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_i32(key: &str, default: i32) -> i32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(default)
}
